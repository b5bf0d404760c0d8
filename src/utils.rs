//! Small helpers shared across the bot: retries and duration formatting.

use std::fmt::Display;
use std::time::Duration;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::warn;

/// Retry a transport operation with exponential backoff and jitter.
///
/// Gives up after [`crate::config::CONNECT_MAX_RETRIES`] retries and returns
/// the last error.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn retry_transport_operation<F, Fut, T, E>(operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Display,
{
    use crate::config::{CONNECT_INITIAL_BACKOFF_MS, CONNECT_MAX_BACKOFF_MS, CONNECT_MAX_RETRIES};

    let retry_strategy = ExponentialBackoff::from_millis(CONNECT_INITIAL_BACKOFF_MS)
        .max_delay(Duration::from_millis(CONNECT_MAX_BACKOFF_MS))
        .map(jitter)
        .take(CONNECT_MAX_RETRIES);

    Retry::spawn(retry_strategy, operation).await.map_err(|e| {
        warn!(
            "Transport operation failed after {} retries: {}",
            CONNECT_MAX_RETRIES, e
        );
        e
    })
}

/// Format a duration as `1d 2h 3m 4s`, omitting leading zero units.
#[must_use]
pub fn format_uptime(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    if days > 0 {
        format!("{days}d {hours}h {minutes}m {seconds}s")
    } else if hours > 0 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_millis(900)), "0s");
        assert_eq!(format_uptime(Duration::from_secs(59)), "59s");
        assert_eq!(format_uptime(Duration::from_secs(61)), "1m 1s");
        assert_eq!(format_uptime(Duration::from_secs(3_600)), "1h 0m 0s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_eventual_success() {
        let calls = AtomicUsize::new(0);
        let result: Result<&str, String> = retry_transport_operation(|| async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err("refused".to_string())
            } else {
                Ok("connected")
            }
        })
        .await;

        assert_eq!(result.as_deref(), Ok("connected"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up() {
        let calls = AtomicUsize::new(0);
        let result: Result<(), String> = retry_transport_operation(|| async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err("refused".to_string())
        })
        .await;

        assert!(result.is_err());
        assert_eq!(
            calls.load(Ordering::SeqCst),
            crate::config::CONNECT_MAX_RETRIES + 1
        );
    }
}
