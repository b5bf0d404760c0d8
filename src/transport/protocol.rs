//! Chat wire codec
//!
//! Frames are `TYPE <json>` text messages.

use super::ChatEvent;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Deserialize)]
struct InboundMessage {
    nick: String,
    data: String,
}

#[derive(Deserialize)]
struct Pong {
    data: u64,
}

#[derive(Serialize)]
struct OutboundMessage<'a> {
    data: &'a str,
}

#[derive(Serialize)]
struct OutboundPrivate<'a> {
    nick: &'a str,
    data: &'a str,
}

#[derive(Serialize)]
struct Ping {
    data: u64,
}

fn split_frame(frame: &str) -> Option<(&str, &str)> {
    let (kind, payload) = frame.split_once(' ')?;
    Some((kind, payload.trim()))
}

/// Decode one inbound frame. Frames the bot has no use for yield `None`.
#[must_use]
pub fn parse_frame(frame: &str) -> Option<ChatEvent> {
    let (kind, payload) = split_frame(frame)?;
    match kind {
        "MSG" => {
            let msg: InboundMessage = serde_json::from_str(payload).ok()?;
            Some(ChatEvent::Message {
                sender: msg.nick,
                text: msg.data,
            })
        }
        "PONG" => {
            let pong: Pong = serde_json::from_str(payload).ok()?;
            Some(ChatEvent::Ack(pong.data))
        }
        "ERR" => Some(ChatEvent::TransportError(error_description(payload))),
        _ => None,
    }
}

fn error_description(payload: &str) -> String {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(map)) => map
            .get("description")
            .and_then(Value::as_str)
            .map_or_else(|| payload.to_string(), str::to_string),
        _ => payload.to_string(),
    }
}

/// Encode a room message
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_public(text: &str) -> Result<String, serde_json::Error> {
    Ok(format!(
        "MSG {}",
        serde_json::to_string(&OutboundMessage { data: text })?
    ))
}

/// Encode a private message
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_private(target: &str, text: &str) -> Result<String, serde_json::Error> {
    Ok(format!(
        "PRIVMSG {}",
        serde_json::to_string(&OutboundPrivate {
            nick: target,
            data: text
        })?
    ))
}

/// Encode a liveness probe
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn encode_ping(id: u64) -> Result<String, serde_json::Error> {
    Ok(format!("PING {}", serde_json::to_string(&Ping { data: id })?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chat_message() {
        let frame = r#"MSG {"nick":"Bob","features":["subscriber"],"timestamp":1,"data":"!ferret pls"}"#;
        assert_eq!(
            parse_frame(frame),
            Some(ChatEvent::Message {
                sender: "Bob".to_string(),
                text: "!ferret pls".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_pong() {
        assert_eq!(parse_frame(r#"PONG {"data":42}"#), Some(ChatEvent::Ack(42)));
    }

    #[test]
    fn test_parse_error_variants() {
        assert_eq!(
            parse_frame(r#"ERR "throttled""#),
            Some(ChatEvent::TransportError("throttled".to_string()))
        );
        assert_eq!(
            parse_frame(r#"ERR {"description":"needlogin"}"#),
            Some(ChatEvent::TransportError("needlogin".to_string()))
        );
        assert_eq!(
            parse_frame("ERR broken"),
            Some(ChatEvent::TransportError("broken".to_string()))
        );
    }

    #[test]
    fn test_ignores_unknown_and_garbage() {
        assert_eq!(parse_frame(r#"JOIN {"nick":"x"}"#), None);
        assert_eq!(parse_frame("MSG not-json"), None);
        assert_eq!(parse_frame("NAMES"), None);
    }

    #[test]
    fn test_encoding_escapes_payload() -> Result<(), serde_json::Error> {
        assert_eq!(
            encode_public(r#"say "hi""#)?,
            r#"MSG {"data":"say \"hi\""}"#
        );
        assert_eq!(
            encode_private("eve", "psst")?,
            r#"PRIVMSG {"nick":"eve","data":"psst"}"#
        );
        assert_eq!(encode_ping(7)?, r#"PING {"data":7}"#);
        Ok(())
    }
}
