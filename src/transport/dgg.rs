//! destiny.gg websocket session
//!
//! Frames read off the socket are decoded and pushed onto the event channel;
//! writes go through a shared sink.

use super::protocol::{self, encode_ping, encode_private, encode_public};
use super::{ChatEvent, ChatTransport, TransportError};
use crate::utils::retry_transport_operation;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, COOKIE};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

/// Websocket chat session authenticated with the login key cookie.
///
/// Each successful `open()` spawns a reader task that decodes frames into
/// [`ChatEvent`]s; `close()` tears the reader down with the socket.
pub struct DggSession {
    url: String,
    cookie: HeaderValue,
    events: mpsc::Sender<ChatEvent>,
    sink: Mutex<Option<WsSink>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl DggSession {
    /// Create a closed session.
    ///
    /// # Errors
    ///
    /// Returns `InvalidHeader` if the login key contains characters that
    /// cannot appear in a cookie header.
    pub fn new(
        url: impl Into<String>,
        login_key: &str,
        events: mpsc::Sender<ChatEvent>,
    ) -> Result<Self, TransportError> {
        let cookie = HeaderValue::from_str(&format!("authtoken={login_key}"))
            .map_err(|e| TransportError::InvalidHeader(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            cookie,
            events,
            sink: Mutex::new(None),
            reader: Mutex::new(None),
        })
    }

    async fn connect_once(&self) -> Result<WsStream, TransportError> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        request.headers_mut().insert(COOKIE, self.cookie.clone());

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        Ok(stream)
    }

    async fn write(&self, frame: String) -> Result<(), TransportError> {
        let mut guard = self.sink.lock().await;
        let sink = guard.as_mut().ok_or(TransportError::NotConnected)?;
        sink.send(Message::Text(frame))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }
}

async fn read_frames(mut stream: SplitStream<WsStream>, events: mpsc::Sender<ChatEvent>) {
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let Some(event) = protocol::parse_frame(&text) else {
                    continue;
                };
                if events.send(event).await.is_err() {
                    debug!("Event channel closed, stopping reader");
                    return;
                }
            }
            Ok(Message::Close(_)) => {
                info!("Connection closed");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                let _ = events.send(ChatEvent::TransportError(e.to_string())).await;
                return;
            }
        }
    }
}

#[async_trait]
impl ChatTransport for DggSession {
    async fn open(&self) -> Result<(), TransportError> {
        let stream = retry_transport_operation(|| self.connect_once()).await?;
        let (sink, stream) = stream.split();

        *self.sink.lock().await = Some(sink);

        let handle = tokio::spawn(read_frames(stream, self.events.clone()));
        if let Some(previous) = self.reader.lock().await.replace(handle) {
            previous.abort();
        }

        info!("Connected to {}", self.url);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }

        let Some(mut sink) = self.sink.lock().await.take() else {
            return Ok(());
        };
        if let Err(e) = sink.close().await {
            warn!("Failed to close websocket cleanly: {}", e);
            return Err(TransportError::Send(e.to_string()));
        }
        Ok(())
    }

    async fn send_public(&self, text: &str) -> Result<(), TransportError> {
        let frame = encode_public(text).map_err(|e| TransportError::Send(e.to_string()))?;
        self.write(frame).await
    }

    async fn send_private(&self, target: &str, text: &str) -> Result<(), TransportError> {
        let frame =
            encode_private(target, text).map_err(|e| TransportError::Send(e.to_string()))?;
        self.write(frame).await
    }

    async fn send_probe(&self, id: u64) -> Result<(), TransportError> {
        let frame = encode_ping(id).map_err(|e| TransportError::Send(e.to_string()))?;
        self.write(frame).await
    }
}
