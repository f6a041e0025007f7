use std::time::Duration;

use crate::ids::SubscriptionId;

const PREVIEW_CHARS: usize = 120;

/// The transport could not be established, or failed while open.
/// Never fatal: the reconnection controller retries after any of these.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConnectionError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("connection refused{}: {reason}", status_suffix(.status))]
    Refused { status: Option<u16>, reason: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("handshake failed: {0}")]
    Handshake(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("connection closed")]
    Closed,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl ConnectionError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::InvalidEndpoint(_) => "invalid_endpoint",
            Self::Refused { .. } => "refused",
            Self::Network(_) => "network",
            Self::Handshake(_) => "handshake",
            Self::Protocol(_) => "protocol",
            Self::Timeout(_) => "timeout",
            Self::Closed => "closed",
        }
    }
}

/// A frame body was not valid structured data. Recovered locally.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("unparseable frame body ({reason}): {preview}")]
pub struct ParseError {
    preview: String,
    reason: String,
}

impl ParseError {
    pub fn new(body: &str, reason: impl Into<String>) -> Self {
        let mut preview: String = body.chars().take(PREVIEW_CHARS).collect();
        if body.chars().count() > PREVIEW_CHARS {
            preview.push('…');
        }
        Self {
            preview,
            reason: reason.into(),
        }
    }

    pub fn body_preview(&self) -> &str {
        &self.preview
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// A subscriber's handler failed. Caught at the bus boundary, never propagated.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ListenerError {
    #[error("listener {subscription} failed: {reason}")]
    Failed {
        subscription: SubscriptionId,
        reason: String,
    },
    #[error("listener {subscription} panicked: {message}")]
    Panicked {
        subscription: SubscriptionId,
        message: String,
    },
}

impl ListenerError {
    pub fn subscription(&self) -> SubscriptionId {
        match self {
            Self::Failed { subscription, .. } | Self::Panicked { subscription, .. } => *subscription,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refused_display_with_and_without_status() {
        let with = ConnectionError::Refused {
            status: Some(503),
            reason: "unavailable".into(),
        };
        assert_eq!(with.to_string(), "connection refused (503): unavailable");

        let without = ConnectionError::Refused {
            status: None,
            reason: "tcp reset".into(),
        };
        assert_eq!(without.to_string(), "connection refused: tcp reset");
    }

    #[test]
    fn error_kind_strings() {
        assert_eq!(ConnectionError::Closed.error_kind(), "closed");
        assert_eq!(
            ConnectionError::Timeout(Duration::from_secs(10)).error_kind(),
            "timeout"
        );
        assert_eq!(
            ConnectionError::InvalidEndpoint("x".into()).error_kind(),
            "invalid_endpoint"
        );
    }

    #[test]
    fn parse_error_truncates_long_bodies() {
        let body = "x".repeat(500);
        let err = ParseError::new(&body, "expected value");
        assert_eq!(err.body_preview().chars().count(), PREVIEW_CHARS + 1);
        assert!(err.body_preview().ends_with('…'));
        assert_eq!(err.reason(), "expected value");
    }

    #[test]
    fn listener_error_carries_subscription() {
        let err = ListenerError::Panicked {
            subscription: SubscriptionId::from_raw(3),
            message: "boom".into(),
        };
        assert_eq!(err.subscription(), SubscriptionId::from_raw(3));
        assert_eq!(err.to_string(), "listener sub-3 panicked: boom");
    }
}
