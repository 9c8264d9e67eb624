//! Wire codec between JSON text messages and typed commands/events.
//!
//! Inbound messages carry a single `action` field:
//!
//! ```json
//! {"action": "play"}
//! {"action": "location_off"}
//! ```
//!
//! Outbound location samples use a `type` tag:
//!
//! ```json
//! {"type": "location", "lat": 52.1, "lng": 21.0}
//! ```
//!
//! State changes are reported as `{"type": "status", "event": "alarm_started"}`.
//!
//! Decoding never touches state. Every [`Event`] has a wire form; encoding
//! goes through [`WireMessage`] so both directions share one schema.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::types::{Command, Event};

/// Outbound message as seen on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    /// A position sample
    Location { lat: f64, lng: f64 },
    /// A state change, identified by its event label
    Status { event: String },
}

impl WireMessage {
    /// Parse an outbound message (the controller's side of the connection).
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::decode(format!("outbound message: {e}")))
    }
}

impl From<&Event> for WireMessage {
    fn from(event: &Event) -> Self {
        match *event {
            Event::LocationSample {
                latitude,
                longitude,
            } => Self::Location {
                lat: latitude,
                lng: longitude,
            },
            other => Self::Status {
                event: other.event_type().to_string(),
            },
        }
    }
}

/// Parse an inbound text message into a [`Command`].
///
/// Invalid JSON, a missing or non-string `action`, and unknown action values
/// are all reported as [`Error::Decode`].
pub fn decode_command(text: &str) -> Result<Command> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::decode(format!("invalid JSON: {e}")))?;

    let action = value
        .get("action")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::decode("missing action field"))?;

    Command::from_action(action).ok_or_else(|| Error::decode(format!("unknown action '{action}'")))
}

/// Serialize an [`Event`] into its outbound text message.
pub fn encode_event(event: &Event) -> Result<String> {
    Ok(serde_json::to_string(&WireMessage::from(event))?)
}
