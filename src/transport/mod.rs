//! Chat transport contract
//!
//! The bot only needs a session it can open, close, write to, and probe.
//! Inbound traffic arrives as [`ChatEvent`]s on a channel owned by the
//! dispatcher.

/// destiny.gg websocket session
pub mod dgg;
/// Wire format of the chat protocol
pub mod protocol;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by a transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established
    #[error("Connect error: {0}")]
    Connect(String),
    /// No open session
    #[error("Not connected")]
    NotConnected,
    /// A frame could not be written
    #[error("Send error: {0}")]
    Send(String),
    /// The login key cannot be used as a header value
    #[error("Invalid auth header: {0}")]
    InvalidHeader(String),
}

/// Inbound event from the chat
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A chat line
    Message {
        /// Display name of the author
        sender: String,
        /// Message text
        text: String,
    },
    /// Error reported by the server or the connection
    TransportError(String),
    /// Acknowledgement of a liveness probe
    Ack(u64),
}

/// Bidirectional chat session
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open the session
    async fn open(&self) -> Result<(), TransportError>;
    /// Close the session
    async fn close(&self) -> Result<(), TransportError>;
    /// Send a line to the room
    async fn send_public(&self, text: &str) -> Result<(), TransportError>;
    /// Send a private message to one user
    async fn send_private(&self, target: &str, text: &str) -> Result<(), TransportError>;
    /// Send a liveness probe carrying `id`
    async fn send_probe(&self, id: u64) -> Result<(), TransportError>;
}
