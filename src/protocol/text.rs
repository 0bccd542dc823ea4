//! Text-channel message shapes.
//!
//! The text side of the connection carries UTF-8 JSON, one message per
//! WebSocket text frame:
//!
//! - request: `{"i": <call id>, "m": <method>, "p": <params>}`
//! - response: `{"i": <call id>, "r": <result>}` or `{"i": ..., "e": <error>}`
//! - event: `{"e": <event name>, "p": <event payload>}`
//!
//! Signal and format-negotiation payloads ride the binary channel's
//! `metadata` field but are built here alongside the other JSON shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VoicewireError};

/// An outgoing RPC request.
#[derive(Debug, Serialize)]
pub struct CallRequest<'a> {
    pub i: i64,
    pub m: &'a str,
    pub p: &'a Value,
}

impl CallRequest<'_> {
    /// Serialize to the wire string.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A parsed incoming text message.
#[derive(Debug, PartialEq)]
pub enum TextMessage {
    /// A response correlated to a pending call. `result` is `Err` when the
    /// server sent an `"e"` member.
    Response {
        id: i64,
        result: std::result::Result<Value, Value>,
    },
    /// A server-initiated event.
    Event { name: String, payload: Value },
}

/// Parse one incoming text message.
///
/// A numeric `"i"` member marks a response; otherwise a string `"e"` member
/// marks an event. Anything else is a protocol error.
pub fn parse(text: &str) -> Result<TextMessage> {
    let js: Value = serde_json::from_str(text)?;
    if let Some(id) = js.get("i").and_then(Value::as_i64) {
        let result = match js.get("e") {
            Some(e) if !e.is_null() => Err(e.clone()),
            _ => Ok(js.get("r").cloned().unwrap_or(Value::Null)),
        };
        return Ok(TextMessage::Response { id, result });
    }
    if let Some(name) = js.get("e").and_then(Value::as_str) {
        return Ok(TextMessage::Event {
            name: name.to_string(),
            payload: js.get("p").cloned().unwrap_or(Value::Null),
        });
    }
    Err(VoicewireError::Protocol(format!(
        "invalid text message: {}",
        text
    )))
}

/// One direction of the audio format negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatSide {
    pub codec: String,
    pub sample_rate: u32,
}

/// Both directions of the audio format negotiation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Format {
    pub send: FormatSide,
    pub recv: FormatSide,
}

#[derive(Serialize, Deserialize)]
struct FormatEnvelope {
    format: Format,
}

#[derive(Serialize)]
struct Signal<'a> {
    signal: &'a str,
}

/// Build the `{"signal": ...}` metadata payload for a turn flip.
pub fn signal_metadata(enabled: bool) -> String {
    let signal = if enabled { "listen" } else { "stopListen" };
    serde_json::to_string(&Signal { signal }).expect("signal payload serializes")
}

/// Build the format-negotiation metadata payload.
pub fn format_metadata(format: &Format) -> Result<String> {
    Ok(serde_json::to_string(&FormatEnvelope {
        format: format.clone(),
    })?)
}

/// Parse a metadata string as a format renegotiation, if it is one.
pub fn parse_format(metadata: &str) -> Option<Format> {
    serde_json::from_str::<FormatEnvelope>(metadata)
        .ok()
        .map(|e| e.format)
}
