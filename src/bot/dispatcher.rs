//! Event loop
//!
//! Pulls [`ChatEvent`]s off the transport channel one at a time. Commands
//! are routed on their own task so a slow image lookup never stalls the
//! loop; delivery is fire-and-forget.

use super::commands::COMMAND_SIGIL;
use super::heartbeat::HeartbeatState;
use super::router::{Action, CommandRouter};
use crate::transport::{ChatEvent, ChatTransport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Routes inbound events to the command router or the heartbeat state
pub struct Dispatcher {
    router: Arc<CommandRouter>,
    heartbeat: Arc<HeartbeatState>,
    transport: Arc<dyn ChatTransport>,
}

impl Dispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new(
        router: Arc<CommandRouter>,
        heartbeat: Arc<HeartbeatState>,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            router,
            heartbeat,
            transport,
        }
    }

    /// Process events until the channel closes or `shutdown` is cancelled
    pub async fn run(&self, mut events: mpsc::Receiver<ChatEvent>, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Dispatcher shutting down");
                    return;
                }
                event = events.recv() => event,
            };

            let Some(event) = event else {
                info!("Event channel closed");
                return;
            };
            self.handle_event(event);
        }
    }

    /// Handle one event. Returns the handle of the command task, if one was
    /// spawned.
    pub fn handle_event(&self, event: ChatEvent) -> Option<JoinHandle<()>> {
        match event {
            ChatEvent::Message { sender, text } => {
                if !text.starts_with(COMMAND_SIGIL) {
                    return None;
                }
                let router = Arc::clone(&self.router);
                let transport = Arc::clone(&self.transport);
                Some(tokio::spawn(async move {
                    let action = router.route(&sender, &text).await;
                    deliver(transport.as_ref(), action).await;
                }))
            }
            ChatEvent::TransportError(description) => {
                warn!("Error {}", description);
                None
            }
            ChatEvent::Ack(id) => {
                debug!("Heartbeat ack {}", id);
                self.heartbeat.record_ack(id);
                None
            }
        }
    }
}

/// Send `action` and log a failure. The only place delivery errors surface.
pub async fn deliver(transport: &dyn ChatTransport, action: Action) {
    let result = match &action {
        Action::Public(text) => transport.send_public(text).await,
        Action::Private { target, text } => transport.send_private(target, text).await,
        Action::NoOp => return,
    };

    if let Err(e) = result {
        error!("Failed to deliver {:?}: {}", action, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access_list::AccessList;
    use crate::bot::heartbeat::{HeartbeatError, HeartbeatMonitor, HeartbeatStatus};
    use std::time::Duration;
    use crate::config::Settings;
    use crate::image_api::MockImageSource;
    use crate::transport::{MockChatTransport, TransportError};
    use mockall::predicate::eq;

    fn router() -> Arc<CommandRouter> {
        let access = AccessList::new("unused.json", "k", Vec::new(), Vec::new());
        Arc::new(CommandRouter::new(
            access,
            Arc::new(MockImageSource::new()),
            &Settings::default(),
        ))
    }

    #[tokio::test]
    async fn test_non_command_spawns_nothing() {
        let dispatcher = Dispatcher::new(
            router(),
            Arc::new(HeartbeatState::new()),
            Arc::new(MockChatTransport::new()),
        );

        let handle = dispatcher.handle_event(ChatEvent::Message {
            sender: "bob".to_string(),
            text: "just chatting".to_string(),
        });
        assert!(handle.is_none());
    }

    #[tokio::test]
    async fn test_ack_updates_heartbeat() -> Result<(), HeartbeatError> {
        let mut probes = MockChatTransport::new();
        probes.expect_send_probe().times(1).returning(|_| Ok(()));
        let monitor = HeartbeatMonitor::new(Arc::new(probes), Duration::from_secs(60));
        monitor.tick().await?;

        let heartbeat = monitor.state();
        let dispatcher = Dispatcher::new(
            router(),
            Arc::clone(&heartbeat),
            Arc::new(MockChatTransport::new()),
        );

        assert!(dispatcher.handle_event(ChatEvent::Ack(1)).is_none());
        assert!(dispatcher
            .handle_event(ChatEvent::TransportError("throttled".to_string()))
            .is_none());
        assert_eq!(heartbeat.last_acked(), 1);
        assert_eq!(heartbeat.status(), HeartbeatStatus::Healthy);
        Ok(())
    }

    #[tokio::test]
    async fn test_command_reply_is_sent() -> Result<(), tokio::task::JoinError> {
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_public()
            .with(eq("FerretLOL https://github.com/voloshink/FerretBot FerretLOL"))
            .times(1)
            .returning(|_| Ok(()));
        let dispatcher = Dispatcher::new(
            router(),
            Arc::new(HeartbeatState::new()),
            Arc::new(transport),
        );

        let handle = dispatcher.handle_event(ChatEvent::Message {
            sender: "bob".to_string(),
            text: "!fsource".to_string(),
        });
        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_delivery_failure_is_swallowed() {
        let mut transport = MockChatTransport::new();
        transport
            .expect_send_private()
            .times(1)
            .returning(|_, _| Err(TransportError::NotConnected));

        deliver(
            &transport,
            Action::Private {
                target: "eve".to_string(),
                text: "psst".to_string(),
            },
        )
        .await;
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dispatcher = Dispatcher::new(
            router(),
            Arc::new(HeartbeatState::new()),
            Arc::new(MockChatTransport::new()),
        );
        let (_tx, rx) = mpsc::channel(4);
        let token = CancellationToken::new();
        token.cancel();

        dispatcher.run(rx, token).await;
    }
}
