use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ParseError;

/// Kind of a debugger event, as named on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Init,
    Debug,
    Error,
    Message,
}

impl EventKind {
    /// Map a frame or envelope name onto a kind. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "init" => Some(Self::Init),
            "debug" => Some(Self::Debug),
            "error" => Some(Self::Error),
            "message" => Some(Self::Message),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Debug => "debug",
            Self::Error => "error",
            Self::Message => "message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event body: structured JSON when the frame carried it, raw text otherwise.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Json(Value),
}

impl Payload {
    /// Parse a frame body as JSON.
    pub fn parse(body: &str) -> Result<Self, ParseError> {
        serde_json::from_str::<Value>(body)
            .map(Self::Json)
            .map_err(|e| ParseError::new(body, e.to_string()))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Json(Value::String(s)) => Some(s),
            Self::Json(_) => None,
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

impl fmt::Display for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Json(Value::String(s)) => f.write_str(s),
            Self::Json(v) => write!(f, "{v}"),
        }
    }
}

/// A normalized debugger event. Wire form: `{"type": "<kind>", "data": <payload>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DebugEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(rename = "data")]
    pub payload: Payload,
}

impl DebugEvent {
    pub fn new(kind: EventKind, payload: Payload) -> Self {
        Self { kind, payload }
    }

    pub fn text(kind: EventKind, text: impl Into<String>) -> Self {
        Self::new(kind, Payload::Text(text.into()))
    }

    pub fn json(kind: EventKind, value: Value) -> Self {
        Self::new(kind, Payload::Json(value))
    }

    /// Synthetic event published when the transport fails.
    pub fn transport_error(reason: impl Into<String>) -> Self {
        Self::text(EventKind::Error, reason)
    }

    /// Decode a JSON envelope. Fails when the body is not JSON or not an envelope.
    pub fn from_envelope(body: &str) -> Result<Self, ParseError> {
        serde_json::from_str(body).map_err(|e| ParseError::new(body, e.to_string()))
    }
}

impl fmt::Display for DebugEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.payload)
    }
}
