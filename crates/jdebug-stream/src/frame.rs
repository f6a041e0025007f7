//! Raw transport frames and their normalization into [`DebugEvent`]s.
//!
//! Normalization never drops a frame. Bodies that are not structured data fall
//! back to a text payload.

use jdebug_core::{DebugEvent, EventKind, Payload};
use tracing::debug;

/// One unit of data received from a transport, before normalization.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// An SSE event. `name` is the `event:` field, absent for unlabelled frames.
    Sse { name: Option<String>, data: String },
    /// A STOMP `MESSAGE` delivered on a topic.
    Topic { destination: String, body: String },
}

impl Frame {
    pub fn sse(name: Option<&str>, data: impl Into<String>) -> Self {
        Self::Sse {
            name: name.map(str::to_string),
            data: data.into(),
        }
    }

    pub fn topic(destination: impl Into<String>, body: impl Into<String>) -> Self {
        Self::Topic {
            destination: destination.into(),
            body: body.into(),
        }
    }

    /// Convert into a [`DebugEvent`].
    ///
    /// Named SSE frames (`init`, `debug`, `error`) keep their name as the kind.
    /// Unlabelled frames, `message` frames and topic messages carry either a
    /// `{type, data}` envelope or a bare body, which becomes a `message` event.
    pub fn normalize(self) -> DebugEvent {
        match self {
            Self::Sse { name, data } => match name.as_deref().and_then(EventKind::from_name) {
                Some(kind) if kind != EventKind::Message => DebugEvent::new(kind, body_payload(&data)),
                _ => {
                    if let Some(other) = name.as_deref().filter(|n| EventKind::from_name(n).is_none()) {
                        debug!(frame_name = other, "unknown frame name, delivering as message");
                    }
                    unwrap_envelope(&data)
                }
            },
            Self::Topic { body, .. } => unwrap_envelope(&body),
        }
    }
}

fn body_payload(body: &str) -> Payload {
    Payload::parse(body).unwrap_or_else(|_| Payload::Text(body.to_string()))
}

fn unwrap_envelope(body: &str) -> DebugEvent {
    match DebugEvent::from_envelope(body) {
        Ok(event) => event,
        Err(e) => {
            debug!(reason = e.reason(), preview = e.body_preview(), "frame is not an event envelope");
            DebugEvent::new(EventKind::Message, body_payload(body))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn three_frame_feed() {
        let events: Vec<_> = [
            Frame::sse(Some("init"), "ready"),
            Frame::sse(Some("debug"), r#"{"line":5}"#),
            Frame::sse(None, "raw text"),
        ]
        .into_iter()
        .map(Frame::normalize)
        .collect();

        assert_eq!(events[0], DebugEvent::text(EventKind::Init, "ready"));
        assert_eq!(events[1], DebugEvent::json(EventKind::Debug, json!({"line": 5})));
        assert_eq!(events[2], DebugEvent::text(EventKind::Message, "raw text"));
    }

    #[test]
    fn unlabelled_envelope_is_unwrapped() {
        let evt = Frame::sse(None, r#"{"type":"debug","data":{"line":9}}"#).normalize();
        assert_eq!(evt, DebugEvent::json(EventKind::Debug, json!({"line": 9})));
    }

    #[test]
    fn unlabelled_json_without_envelope_is_message() {
        let evt = Frame::sse(None, r#"{"thread":"main"}"#).normalize();
        assert_eq!(evt, DebugEvent::json(EventKind::Message, json!({"thread": "main"})));
    }

    #[test]
    fn unknown_name_becomes_message() {
        let evt = Frame::sse(Some("heartbeat"), "tick").normalize();
        assert_eq!(evt, DebugEvent::text(EventKind::Message, "tick"));
    }

    #[test]
    fn named_error_frame() {
        let evt = Frame::sse(Some("error"), "VM disconnected").normalize();
        assert_eq!(evt, DebugEvent::text(EventKind::Error, "VM disconnected"));
    }

    #[test]
    fn topic_envelope() {
        let evt = Frame::topic("/topic/debug/s1", r#"{"type":"init","data":"ready"}"#).normalize();
        assert_eq!(evt, DebugEvent::text(EventKind::Init, "ready"));
    }

    #[test]
    fn topic_garbage_is_raw_message() {
        let evt = Frame::topic("/topic/debug/s1", "{not json").normalize();
        assert_eq!(evt, DebugEvent::text(EventKind::Message, "{not json"));
    }

    #[test]
    fn empty_body_is_kept() {
        let evt = Frame::sse(None, "").normalize();
        assert_eq!(evt, DebugEvent::text(EventKind::Message, ""));
    }
}
