use std::time::Duration;

use jdebug_settings::{ApiSettings, StreamSettings, TransportKind};

/// Resolved connection parameters for the live stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EndpointConfig {
    pub transport: TransportKind,
    /// Full SSE URL.
    pub events_url: String,
    /// Full STOMP WebSocket URL (`ws://` or `wss://`).
    pub ws_url: String,
    pub topic_prefix: String,
    pub reconnect_delay: Duration,
    pub connect_timeout: Duration,
}

impl EndpointConfig {
    pub fn from_settings(api: &ApiSettings, stream: &StreamSettings) -> Self {
        let base = api.base_url.trim_end_matches('/');
        Self {
            transport: stream.transport,
            events_url: join_path(base, &stream.events_path),
            ws_url: resolve_ws_url(base, stream.ws_url.as_deref(), stream.sockjs),
            topic_prefix: stream.topic_prefix.clone(),
            reconnect_delay: Duration::from_millis(stream.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(stream.connect_timeout_ms),
        }
    }

    /// SSE endpoint with default timings.
    pub fn sse(events_url: impl Into<String>) -> Self {
        let defaults = StreamSettings::default();
        Self {
            transport: TransportKind::Sse,
            events_url: events_url.into(),
            ws_url: String::new(),
            topic_prefix: defaults.topic_prefix,
            reconnect_delay: Duration::from_millis(defaults.reconnect_delay_ms),
            connect_timeout: Duration::from_millis(defaults.connect_timeout_ms),
        }
    }

    /// STOMP endpoint with default timings. `ws_url` is used as given.
    pub fn stomp(ws_url: impl Into<String>) -> Self {
        Self {
            transport: TransportKind::Stomp,
            ws_url: ws_url.into(),
            events_url: String::new(),
            ..Self::sse("")
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }
}

fn join_path(base: &str, path: &str) -> String {
    if path.is_empty() {
        return base.to_string();
    }
    format!("{base}/{}", path.trim_start_matches('/'))
}

/// Derive the raw WebSocket URL for the STOMP endpoint.
///
/// Defaults to `{base}/ws`. `http(s)` schemes become `ws(s)`. SockJS endpoints
/// expose raw WebSocket at `/websocket` below the endpoint.
pub fn resolve_ws_url(base: &str, ws_url: Option<&str>, sockjs: bool) -> String {
    let url = match ws_url {
        Some(u) if !u.is_empty() => u.trim_end_matches('/').to_string(),
        _ => format!("{}/ws", base.trim_end_matches('/')),
    };
    let url = if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url
    };
    if sockjs && !url.ends_with("/websocket") {
        format!("{url}/websocket")
    } else {
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_settings() {
        let cfg = EndpointConfig::from_settings(&ApiSettings::default(), &StreamSettings::default());
        assert_eq!(cfg.transport, TransportKind::Sse);
        assert_eq!(cfg.events_url, "http://localhost:8080/events");
        assert_eq!(cfg.ws_url, "ws://localhost:8080/ws/websocket");
        assert_eq!(cfg.reconnect_delay, Duration::from_secs(5));
        assert_eq!(cfg.topic_prefix, "/topic/debug");
    }

    #[test]
    fn trailing_slash_on_base_is_ignored() {
        let api = ApiSettings {
            base_url: "https://dbg.example.com/".into(),
            ..ApiSettings::default()
        };
        let cfg = EndpointConfig::from_settings(&api, &StreamSettings::default());
        assert_eq!(cfg.events_url, "https://dbg.example.com/events");
        assert_eq!(cfg.ws_url, "wss://dbg.example.com/ws/websocket");
    }

    #[test]
    fn explicit_ws_url_without_sockjs() {
        assert_eq!(
            resolve_ws_url("http://x", Some("ws://other:9000/stomp"), false),
            "ws://other:9000/stomp"
        );
    }

    #[test]
    fn sockjs_suffix_not_duplicated() {
        assert_eq!(
            resolve_ws_url("http://x", Some("ws://h/ws/websocket"), true),
            "ws://h/ws/websocket"
        );
    }

    #[test]
    fn stomp_constructor_keeps_url() {
        let cfg = EndpointConfig::stomp("ws://127.0.0.1:1234").with_reconnect_delay(Duration::from_millis(20));
        assert_eq!(cfg.transport, TransportKind::Stomp);
        assert_eq!(cfg.ws_url, "ws://127.0.0.1:1234");
        assert_eq!(cfg.reconnect_delay, Duration::from_millis(20));
    }
}
