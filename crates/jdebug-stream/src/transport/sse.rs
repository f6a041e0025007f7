//! Server-Sent Events transport over a long-lived `GET`.

use std::borrow::Cow;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};
use jdebug_core::{ConnectionError, ConnectionId};
use jdebug_settings::TransportKind;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use reqwest::Url;
use tracing::{debug, info, warn};

use super::{Connection, Transport};
use crate::frame::Frame;

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Incremental SSE decoder.
///
/// Bytes go in via [`feed`](Self::feed); complete events come out of
/// [`pop`](Self::pop). Lines end in `\n` with an optional `\r`. Multi-line
/// `data:` fields are joined with `\n`. `id:` and `retry:` are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: BytesMut,
    name: Option<String>,
    data: Vec<String>,
    ready: VecDeque<Frame>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line = self.buffer.split_to(pos + 1);
            line.truncate(line.len() - 1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            let text = String::from_utf8_lossy(&line);
            if matches!(text, Cow::Owned(_)) {
                warn!(bytes = line.len(), "SSE line is not valid UTF-8, decoding lossily");
            }
            self.process_line(&text);
        }
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.ready.pop_front()
    }

    /// Flush a final event the server did not terminate with a blank line.
    pub fn finish(&mut self) {
        if !self.buffer.is_empty() {
            let rest = self.buffer.split();
            let text = String::from_utf8_lossy(&rest);
            self.process_line(text.trim_end_matches('\r'));
        }
        self.dispatch();
    }

    fn process_line(&mut self, line: &str) {
        if line.is_empty() {
            self.dispatch();
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => self.name = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            "id" | "retry" => {}
            other => debug!(field = other, "ignoring unknown SSE field"),
        }
    }

    fn dispatch(&mut self) {
        let name = self.name.take().filter(|n| !n.is_empty());
        if self.data.is_empty() {
            return;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        self.ready.push_back(Frame::Sse { name, data });
    }
}

/// Opens SSE connections to one URL.
pub struct SseTransport {
    client: reqwest::Client,
    url: String,
    connect_timeout: Duration,
}

impl SseTransport {
    pub fn new(url: &str, connect_timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().connect_timeout(connect_timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!(error = %e, "SSE client build failed, falling back to defaults");
                reqwest::Client::new()
            }
        };
        Self {
            client,
            url: url.to_string(),
            connect_timeout,
        }
    }

    fn parse_url(&self) -> Result<Url, ConnectionError> {
        let url = Url::parse(&self.url).map_err(|e| ConnectionError::InvalidEndpoint(format!("{}: {e}", self.url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConnectionError::InvalidEndpoint(format!(
                "unsupported scheme {other:?} for SSE"
            ))),
        }
    }
}

fn map_reqwest_error(e: &reqwest::Error) -> ConnectionError {
    if e.is_builder() {
        ConnectionError::InvalidEndpoint(e.to_string())
    } else if e.is_connect() {
        ConnectionError::Refused {
            status: None,
            reason: e.to_string(),
        }
    } else {
        ConnectionError::Network(e.to_string())
    }
}

#[async_trait]
impl Transport for SseTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let url = self.parse_url()?;
        let request = self
            .client
            .get(url)
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send();

        let response = tokio::time::timeout(self.connect_timeout, request)
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))?
            .map_err(|e| map_reqwest_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = if body.trim().is_empty() {
                status.canonical_reason().unwrap_or("unexpected status").to_string()
            } else {
                body.trim().to_string()
            };
            return Err(ConnectionError::Refused {
                status: Some(status.as_u16()),
                reason,
            });
        }

        let conn = SseConnection::from_stream(Box::pin(response.bytes_stream()));
        info!(connection_id = %conn.id, url = %self.url, "SSE stream opened");
        Ok(Box::new(conn))
    }
}

/// An open SSE response body.
pub struct SseConnection {
    id: ConnectionId,
    body: Option<ByteStream>,
    decoder: SseDecoder,
}

impl SseConnection {
    pub fn from_stream(body: ByteStream) -> Self {
        Self {
            id: ConnectionId::new(),
            body: Some(body),
            decoder: SseDecoder::new(),
        }
    }
}

#[async_trait]
impl Connection for SseConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectionError> {
        debug!(connection_id = %self.id, topic, "SSE has no topics, subscription ignored");
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, ConnectionError>> {
        loop {
            if let Some(frame) = self.decoder.pop() {
                return Some(Ok(frame));
            }
            let body = self.body.as_mut()?;
            match body.next().await {
                Some(Ok(chunk)) => self.decoder.feed(&chunk),
                Some(Err(e)) => {
                    self.body = None;
                    return Some(Err(ConnectionError::Network(e.to_string())));
                }
                None => {
                    debug!(connection_id = %self.id, "SSE stream ended");
                    self.body = None;
                    self.decoder.finish();
                    return self.decoder.pop().map(Ok);
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.body.take().is_some() {
            debug!(connection_id = %self.id, "SSE stream closed");
        }
    }
}
