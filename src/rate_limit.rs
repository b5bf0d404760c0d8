//! Cooldown gates for outbound replies
//!
//! A [`RateGate`] guards a shared channel (the public chat, or private
//! notices to admins) with a cooldown plus duplicate-payload suppression.
//! A [`PrivateGate`] keeps an independent cooldown per recipient so one
//! user's private notice does not block another's.

use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Longest per-recipient cooldown the gate will keep entries for
pub const MAX_PRIVATE_COOLDOWN: Duration = Duration::from_secs(7 * 86_400);

/// Cooldown + dedup guard for a single channel
#[derive(Debug, Clone)]
pub struct RateGate {
    cooldown: Duration,
    last_fired_at: Option<Instant>,
    last_payload: Option<String>,
}

impl RateGate {
    /// Create a gate that has never fired
    #[must_use]
    pub const fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            last_fired_at: None,
            last_payload: None,
        }
    }

    /// Whether the cooldown since the last admitted send is still running
    #[must_use]
    pub fn is_cooling(&self, now: Instant) -> bool {
        self.last_fired_at
            .is_some_and(|at| now.saturating_duration_since(at) < self.cooldown)
    }

    /// Whether `payload` repeats the last admitted payload
    #[must_use]
    pub fn is_repeat(&self, payload: &str) -> bool {
        self.last_payload.as_deref() == Some(payload)
    }

    /// Admit `payload` if the cooldown has elapsed and it differs from the
    /// previous payload. An admitted payload is recorded immediately.
    pub fn try_admit(&mut self, payload: &str, now: Instant) -> bool {
        if self.is_cooling(now) || self.is_repeat(payload) {
            return false;
        }
        self.last_fired_at = Some(now);
        self.last_payload = Some(payload.to_string());
        true
    }

    /// Admit `payload` on dedup alone. Records the payload but leaves the
    /// cooldown clock untouched.
    pub fn try_admit_unique(&mut self, payload: &str) -> bool {
        if self.is_repeat(payload) {
            return false;
        }
        self.last_payload = Some(payload.to_string());
        true
    }

    /// Current cooldown
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Change the cooldown; applies to the next check
    pub fn set_cooldown(&mut self, cooldown: Duration) {
        self.cooldown = cooldown;
    }

    /// Last admitted payload, if any
    #[must_use]
    pub fn last_payload(&self) -> Option<&str> {
        self.last_payload.as_deref()
    }
}

/// Per-recipient cooldown for private notices
///
/// Only elapsed time is tracked; payloads differ per recipient by
/// construction. Entries expire from the cache once their cooldown is over.
#[derive(Clone)]
pub struct PrivateGate {
    /// Lowercased identity -> time of the last admitted notice
    cache: Cache<String, Instant>,
    cooldown: Duration,
    /// Counter for refused notices (for logging throttling)
    silenced_count: Arc<AtomicU64>,
}

impl PrivateGate {
    /// Create a gate with the given cooldown and capacity.
    ///
    /// Cooldowns above [`MAX_PRIVATE_COOLDOWN`] are clamped.
    #[must_use]
    pub fn new(cooldown: Duration, max_capacity: u64) -> Self {
        if cooldown > MAX_PRIVATE_COOLDOWN {
            warn!(
                "Private cooldown of {}s clamped to {}s",
                cooldown.as_secs(),
                MAX_PRIVATE_COOLDOWN.as_secs()
            );
        }
        let cooldown = cooldown.min(MAX_PRIVATE_COOLDOWN);
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(cooldown.max(Duration::from_secs(1)))
            .build();

        Self {
            cache,
            cooldown,
            silenced_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Whether `identity` is still inside its cooldown
    pub async fn is_cooling(&self, identity: &str, now: Instant) -> bool {
        let key = identity.to_lowercase();
        self.cache
            .get(&key)
            .await
            .is_some_and(|at| now.saturating_duration_since(at) < self.cooldown)
    }

    /// Admit a notice for `identity` if its cooldown has elapsed.
    ///
    /// Check and update happen as one atomic cache operation.
    pub async fn try_admit(&self, identity: &str, now: Instant) -> bool {
        let key = identity.to_lowercase();
        let cooldown = self.cooldown;
        let result = self
            .cache
            .entry_by_ref(key.as_str())
            .and_compute_with(|entry| {
                let open = entry
                    .is_none_or(|e| now.saturating_duration_since(*e.value()) >= cooldown);
                std::future::ready(if open { Op::Put(now) } else { Op::Nop })
            })
            .await;

        let admitted = matches!(
            result,
            CompResult::Inserted(_) | CompResult::ReplacedWith(_)
        );
        if !admitted {
            let count = self.silenced_count.fetch_add(1, Ordering::Relaxed) + 1;
            // Log only every 100th refusal to prevent log flooding
            if count.is_multiple_of(100) {
                debug!(
                    "Silenced {} private notices (recent: {})",
                    count, identity
                );
            }
        }
        admitted
    }

    /// Total number of refused notices
    #[must_use]
    pub fn silenced_count(&self) -> u64 {
        self.silenced_count.load(Ordering::Relaxed)
    }

    /// Configured cooldown
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        self.cooldown
    }
}
