//! Typed client for the backend's session, launch and breakpoint endpoints.

use std::time::Duration;

use jdebug_core::SessionId;
use jdebug_settings::ApiSettings;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{ApiError, Result};

/// Body of `POST /launch`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchRequest<'a> {
    pub main_class: &'a str,
}

/// Body of `POST /breakpoints`.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakpointRequest<'a> {
    pub class_name: &'a str,
    pub line: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    session_id: String,
}

/// REST client for the debugging backend.
#[derive(Clone, Debug)]
pub struct DebuggerApi {
    client: reqwest::Client,
    base_url: String,
}

impl DebuggerApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn from_settings(settings: &ApiSettings) -> Result<Self> {
        Self::new(&settings.base_url, Duration::from_millis(settings.request_timeout_ms))
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `POST /sessions`. The backend may answer with a bare id, a JSON string,
    /// or `{"sessionId": ...}`.
    #[tracing::instrument(skip_all)]
    pub async fn create_session(&self) -> Result<SessionId> {
        let body = self.post("/sessions", None::<&()>).await?;
        let id = parse_session_id(&body)?;
        info!(session_id = %id, "session created");
        Ok(id)
    }

    /// `POST /launch` with `{mainClass}`. Returns the backend's message.
    #[tracing::instrument(skip_all, fields(main_class))]
    pub async fn launch_target(&self, main_class: &str) -> Result<String> {
        let main_class = main_class.trim();
        if main_class.is_empty() {
            return Err(ApiError::InvalidInput("main class must not be empty".into()));
        }
        let _ = tracing::Span::current().record("main_class", main_class);
        let body = self.post("/launch", Some(&LaunchRequest { main_class })).await?;
        Ok(message_from_body(&body))
    }

    /// `POST /breakpoints` with `{className, line}`. Returns the backend's message.
    #[tracing::instrument(skip_all, fields(class_name, line))]
    pub async fn add_breakpoint(&self, class_name: &str, line: u32) -> Result<String> {
        let class_name = class_name.trim();
        if class_name.is_empty() {
            return Err(ApiError::InvalidInput("class name must not be empty".into()));
        }
        if line == 0 {
            return Err(ApiError::InvalidInput("line must be a positive number".into()));
        }
        let span = tracing::Span::current();
        let _ = span.record("class_name", class_name);
        let _ = span.record("line", line);
        let body = self
            .post("/breakpoints", Some(&BreakpointRequest { class_name, line }))
            .await?;
        Ok(message_from_body(&body))
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: Option<&B>) -> Result<String> {
        let mut request = self.client.post(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }
        let resp = request.send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        debug!(path, status = status.as_u16(), "backend responded");
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                message: error_message(status, &text),
            });
        }
        Ok(text)
    }
}

fn parse_session_id(body: &str) -> Result<SessionId> {
    let trimmed = body.trim();
    let id = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::String(s)) => s,
        Ok(Value::Object(_)) => serde_json::from_str::<SessionResponse>(trimmed)
            .map(|r| r.session_id)
            .map_err(|e| ApiError::InvalidResponse(format!("session response: {e}")))?,
        Ok(other) => other.to_string(),
        Err(_) => trimmed.to_string(),
    };
    if id.trim().is_empty() {
        return Err(ApiError::InvalidResponse("empty session id".into()));
    }
    Ok(SessionId::from_raw(id.trim()))
}

/// Message of a success response: `message` field, JSON string, or raw text.
fn message_from_body(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("message")
            .and_then(Value::as_str)
            .map_or_else(|| body.trim().to_string(), str::to_string),
        Ok(Value::String(s)) => s,
        _ => body.trim().to_string(),
    }
}

/// Message of an error response: `message`, then `error`, then a plain body,
/// then the status text.
fn error_message(status: StatusCode, body: &str) -> String {
    let from_json = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ["message", "error"]
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str).map(str::to_string)),
        Ok(Value::String(s)) => Some(s),
        _ => None,
    };
    from_json
        .filter(|m| !m.trim().is_empty())
        .or_else(|| {
            let plain = body.trim();
            (!plain.is_empty() && !plain.starts_with('{')).then(|| plain.to_string())
        })
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string())
}
