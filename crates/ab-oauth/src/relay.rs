//! Cross-context message relay channel
//!
//! The callback side and the orchestrator communicate through a narrow,
//! untrusted channel. Every message on it is a tagged union: anything not
//! carrying the [`OAUTH_RESPONSE`] sentinel is unrelated traffic and is
//! ignored; a message with the right tag but the wrong shape is malformed
//! and is logged and dropped rather than shown to the user.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Type sentinel carried by every relay message
pub const OAUTH_RESPONSE: &str = "oauth-response";

/// Successful callback payload: the authorization code plus the echoed state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayPayload {
    pub code: String,
    pub state: String,
}

/// A validated message from the callback side
///
/// Exactly one of payload/error is present on the wire; the decoder rejects
/// anything else as malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayMessage {
    Success { payload: RelayPayload },
    Error { error: String },
}

/// Wire shape of a relay message
#[derive(Debug, Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<RelayPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Outcome of decoding one raw channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayDecode {
    /// A valid relay message
    Message(RelayMessage),
    /// Different or missing type tag; not ours, skip silently
    Unrelated,
    /// Our tag, but the union did not match; skip and log
    Malformed,
}

impl RelayMessage {
    pub fn success(code: impl Into<String>, state: impl Into<String>) -> Self {
        RelayMessage::Success {
            payload: RelayPayload {
                code: code.into(),
                state: state.into(),
            },
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        RelayMessage::Error {
            error: message.into(),
        }
    }

    /// Serialize to the wire shape.
    pub fn encode(&self) -> Value {
        let wire = match self {
            RelayMessage::Success { payload } => WireMessage {
                kind: OAUTH_RESPONSE.to_string(),
                payload: Some(payload.clone()),
                error: None,
            },
            RelayMessage::Error { error } => WireMessage {
                kind: OAUTH_RESPONSE.to_string(),
                payload: None,
                error: Some(error.clone()),
            },
        };
        serde_json::to_value(wire).unwrap_or(Value::Null)
    }

    /// Validate and decode one raw message from the channel.
    ///
    /// The type tag is checked before any other field is trusted; only a
    /// matching tag with a broken union counts as malformed.
    pub fn decode(value: &Value) -> RelayDecode {
        match value.get("type").and_then(Value::as_str) {
            Some(OAUTH_RESPONSE) => {}
            _ => return RelayDecode::Unrelated,
        }

        let Ok(wire) = serde_json::from_value::<WireMessage>(value.clone()) else {
            debug!("Dropping malformed relay message: {}", value);
            return RelayDecode::Malformed;
        };

        match (wire.payload, wire.error) {
            (Some(payload), None) => RelayDecode::Message(RelayMessage::Success { payload }),
            (None, Some(error)) => RelayDecode::Message(RelayMessage::Error { error }),
            _ => {
                debug!("Dropping malformed relay message: {}", value);
                RelayDecode::Malformed
            }
        }
    }
}

/// Sending half of the relay channel, held by the callback side
#[derive(Debug, Clone)]
pub struct RelaySender {
    tx: mpsc::UnboundedSender<Value>,
}

impl RelaySender {
    /// Post a message to the opener. A closed receiver means the attempt is
    /// already finished; the message is dropped, matching a popup posting to
    /// an opener that stopped listening.
    pub fn post(&self, message: &RelayMessage) {
        if self.tx.send(message.encode()).is_err() {
            debug!("Relay receiver gone; dropping message");
        }
    }

    /// Post a raw value, bypassing encoding. Lets unrelated producers share
    /// the channel, which the receiver must tolerate.
    pub fn post_raw(&self, value: Value) {
        let _ = self.tx.send(value);
    }
}

/// Create a relay channel for one authorization attempt.
pub fn relay_channel() -> (RelaySender, mpsc::UnboundedReceiver<Value>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (RelaySender { tx }, rx)
}
