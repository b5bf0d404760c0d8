//! Connection health monitor
//!
//! Every interval the monitor either sends a fresh probe or, if the previous
//! probe was never acknowledged, cycles the session. Probe ids come from a
//! counter so equality never depends on clock resolution.

use crate::transport::{ChatTransport, TransportError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Fatal monitor failures
#[derive(Debug, Error)]
pub enum HeartbeatError {
    /// The session could not be reopened after a missed acknowledgement
    #[error("Reconnect failed: {0}")]
    Reconnect(#[source] TransportError),
}

/// Health derived from the probe ids
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatStatus {
    /// The last probe was acknowledged
    Healthy,
    /// The last probe is still unanswered
    Suspect,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A probe with this id was sent
    Probed(u64),
    /// The session was closed and reopened
    Reconnected,
}

/// Last sent and last acknowledged probe ids
#[derive(Debug, Default)]
pub struct HeartbeatState {
    sent: AtomicU64,
    acked: AtomicU64,
}

impl HeartbeatState {
    /// Both ids start equal so the first tick probes instead of reconnecting
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sent: AtomicU64::new(0),
            acked: AtomicU64::new(0),
        }
    }

    /// Record an acknowledgement. Stale ids never move `acked` backwards
    /// and ids that were never sent are dropped.
    pub fn record_ack(&self, id: u64) {
        if id > self.last_sent() {
            warn!("Ignoring ack {} for a probe that was never sent", id);
            return;
        }
        self.acked.fetch_max(id, Ordering::SeqCst);
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> HeartbeatStatus {
        if self.last_sent() == self.last_acked() {
            HeartbeatStatus::Healthy
        } else {
            HeartbeatStatus::Suspect
        }
    }

    /// Id of the last probe sent
    #[must_use]
    pub fn last_sent(&self) -> u64 {
        self.sent.load(Ordering::SeqCst)
    }

    /// Id of the last acknowledgement received
    #[must_use]
    pub fn last_acked(&self) -> u64 {
        self.acked.load(Ordering::SeqCst)
    }

    fn next_probe(&self) -> u64 {
        self.sent.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn resync(&self) {
        self.acked.store(self.last_sent(), Ordering::SeqCst);
    }
}

/// Periodic liveness check over a [`ChatTransport`]
pub struct HeartbeatMonitor {
    state: Arc<HeartbeatState>,
    transport: Arc<dyn ChatTransport>,
    interval: Duration,
}

impl HeartbeatMonitor {
    /// Create a monitor in the healthy state
    #[must_use]
    pub fn new(transport: Arc<dyn ChatTransport>, interval: Duration) -> Self {
        Self {
            state: Arc::new(HeartbeatState::new()),
            transport,
            interval,
        }
    }

    /// Shared state, for feeding acknowledgements
    #[must_use]
    pub fn state(&self) -> Arc<HeartbeatState> {
        Arc::clone(&self.state)
    }

    /// Run one monitor step.
    ///
    /// # Errors
    ///
    /// Returns [`HeartbeatError::Reconnect`] if the session cannot be reopened.
    pub async fn tick(&self) -> Result<TickOutcome, HeartbeatError> {
        if self.state.status() == HeartbeatStatus::Suspect {
            warn!(
                "Ping mismatch (sent {}, acked {}), attempting to reconnect",
                self.state.last_sent(),
                self.state.last_acked()
            );

            if let Err(e) = self.transport.close().await {
                warn!("Close before reconnect failed: {}", e);
            }
            self.transport
                .open()
                .await
                .map_err(HeartbeatError::Reconnect)?;

            // Fresh session: probe it on the next tick
            self.state.resync();
            info!("Reconnected after missed heartbeat");
            return Ok(TickOutcome::Reconnected);
        }

        let id = self.state.next_probe();
        if let Err(e) = self.transport.send_probe(id).await {
            warn!("Failed to send heartbeat probe {}: {}", id, e);
        } else {
            debug!("Heartbeat probe {} sent", id);
        }
        Ok(TickOutcome::Probed(id))
    }

    /// Tick every interval until cancelled. The first tick fires one full
    /// interval after start.
    ///
    /// # Errors
    ///
    /// Returns the first fatal tick error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), HeartbeatError> {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Heartbeat monitor stopped: {}", e);
                        return Err(e);
                    }
                }
            }
        }
    }
}
