//! Process wiring
//!
//! Builds the session, router, heartbeat and dispatcher, then runs them until
//! interrupted.

use crate::access_list::AccessList;
use crate::bot::{CommandRouter, Dispatcher, HeartbeatMonitor};
use crate::config::Settings;
use crate::image_api::HttpImageSource;
use crate::transport::dgg::DggSession;
use crate::transport::ChatTransport;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Run the bot until interrupted or until the heartbeat monitor gives up.
///
/// # Errors
///
/// Returns an error if the access list cannot be loaded, if the chat session
/// cannot be opened, if a reconnect fails, or if the interrupt handler cannot
/// be installed.
pub async fn run_bot(settings: Arc<Settings>, config_path: &Path) -> Result<()> {
    let access = AccessList::load(config_path).context("Failed to load access list")?;

    let (events_tx, events_rx) = mpsc::channel(settings.event_buffer);
    let session = DggSession::new(settings.chat_url.as_str(), access.login_key(), events_tx)
        .context("Failed to build chat session")?;
    let transport: Arc<dyn ChatTransport> = Arc::new(session);
    transport
        .open()
        .await
        .context("Failed to open chat session")?;

    let images = Arc::new(HttpImageSource::new(
        settings.image_endpoint.as_str(),
        settings.image_api_timeout(),
    ));
    let router = Arc::new(CommandRouter::new(access, images, &settings));
    let monitor = HeartbeatMonitor::new(Arc::clone(&transport), settings.heartbeat_interval());
    let dispatcher = Dispatcher::new(router, monitor.state(), Arc::clone(&transport));

    let shutdown = CancellationToken::new();
    let mut heartbeat = tokio::spawn(monitor.run(shutdown.clone()));

    info!("Bot is running...");

    let result = tokio::select! {
        () = dispatcher.run(events_rx, shutdown.clone()) => Ok(()),
        joined = &mut heartbeat => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e).context("Heartbeat monitor failed"),
            Err(e) => Err(e).context("Heartbeat task panicked"),
        },
        signal = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            signal.context("Failed to listen for interrupt")
        }
    };

    shutdown.cancel();
    if let Err(e) = transport.close().await {
        warn!("Failed to close chat session: {}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_access_list_is_an_error() -> Result<()> {
        let dir = TempDir::new()?;
        let missing = dir.path().join("absent.json");

        let err = run_bot(Arc::new(Settings::default()), &missing)
            .await
            .err()
            .context("run_bot should fail without an access list")?;
        assert!(err.to_string().contains("Failed to load access list"));
        Ok(())
    }
}
