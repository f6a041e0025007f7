//! Settings types. Field names are camelCase in `settings.json`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JdebugSettings {
    pub api: ApiSettings,
    pub stream: StreamSettings,
    pub logging: LoggingSettings,
}

/// REST backend settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiSettings {
    /// Base URL of the debugging backend (no trailing slash needed).
    pub base_url: String,
    /// Per-request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

/// Which realtime transport carries debugger events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Server-Sent Events on `GET {baseUrl}{eventsPath}`.
    #[default]
    Sse,
    /// STOMP over WebSocket with a per-session topic.
    Stomp,
}

impl TransportKind {
    pub fn parse(val: &str) -> Option<Self> {
        match val.to_lowercase().as_str() {
            "sse" => Some(Self::Sse),
            "stomp" | "ws" | "websocket" => Some(Self::Stomp),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sse => "sse",
            Self::Stomp => "stomp",
        }
    }
}

/// Live event stream settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamSettings {
    pub transport: TransportKind,
    /// SSE path relative to the API base URL.
    pub events_path: String,
    /// STOMP endpoint. Derived as `{baseUrl}/ws` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// The STOMP endpoint is a SockJS endpoint; connect to its raw `/websocket` sub-path.
    pub sockjs: bool,
    /// Topic prefix; the session topic is `{topicPrefix}/{sessionId}`.
    pub topic_prefix: String,
    /// Fixed delay between reconnect attempts in milliseconds.
    pub reconnect_delay_ms: u64,
    /// Upper bound on a single connect + handshake in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::Sse,
            events_path: "/events".to_string(),
            ws_url: None,
            sockjs: true,
            topic_prefix: "/topic/debug".to_string(),
            reconnect_delay_ms: 5_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Logging settings. `RUST_LOG` still wins when set.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    pub level: String,
    pub json: bool,
    /// Per-target levels, e.g. `{"jdebug_stream": "debug"}`.
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            modules: BTreeMap::new(),
        }
    }
}
