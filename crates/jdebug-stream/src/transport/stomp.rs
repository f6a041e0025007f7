//! STOMP over WebSocket.
//!
//! Only the client frames needed to follow a topic are implemented:
//! `CONNECT`, `SUBSCRIBE` and `DISCONNECT`. Heart-beating is disabled.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use jdebug_core::{ConnectionError, ConnectionId};
use jdebug_settings::TransportKind;
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::{Connection, Transport};
use crate::frame::Frame;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ACCEPT_VERSION: &str = "1.2,1.1,1.0";

/// A single STOMP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StompFrame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.push((name.to_string(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header. Repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    fn escapes_headers(&self) -> bool {
        self.command != "CONNECT" && self.command != "CONNECTED"
    }

    pub fn encode(&self) -> String {
        let escape = self.escapes_headers();
        let mut out = String::with_capacity(self.command.len() + self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (k, v) in &self.headers {
            if escape {
                out.push_str(&escape_header(k));
                out.push(':');
                out.push_str(&escape_header(v));
            } else {
                out.push_str(k);
                out.push(':');
                out.push_str(v);
            }
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, ConnectionError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(ConnectionError::Protocol(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )))
            }
        }
    }
    Ok(out)
}

/// Decode every frame in one WebSocket text message.
///
/// Leading end-of-lines are heart-beats and are skipped. A body runs to
/// `content-length` when present, otherwise to the first NUL.
pub fn decode_all(text: &str) -> Result<Vec<StompFrame>, ConnectionError> {
    let mut frames = Vec::new();
    let mut rest = text;
    loop {
        rest = rest.trim_start_matches(['\n', '\r']);
        if rest.is_empty() {
            return Ok(frames);
        }
        let (frame, remaining) = decode_one(rest)?;
        frames.push(frame);
        rest = remaining;
    }
}

/// Split at the first blank line. Each line may end in `\n` or `\r\n`.
fn split_head(input: &str) -> Option<(&str, &str)> {
    let mut start = 0;
    while let Some(offset) = input[start..].find('\n') {
        let end = start + offset;
        let line = &input[start..end];
        if line.is_empty() || line == "\r" {
            return Some((&input[..start], &input[end + 1..]));
        }
        start = end + 1;
    }
    None
}

fn decode_one(input: &str) -> Result<(StompFrame, &str), ConnectionError> {
    let (head, after_head) =
        split_head(input).ok_or_else(|| ConnectionError::Protocol("frame has no header terminator".into()))?;

    let mut lines = head.lines().map(|l| l.trim_end_matches('\r'));
    let command = lines
        .next()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ConnectionError::Protocol("frame has no command".into()))?
        .to_string();

    let unescape = command != "CONNECT" && command != "CONNECTED";
    let mut headers = Vec::new();
    for line in lines {
        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| ConnectionError::Protocol(format!("malformed header line {line:?}")))?;
        if unescape {
            headers.push((unescape_header(k)?, unescape_header(v)?));
        } else {
            headers.push((k.to_string(), v.to_string()));
        }
    }

    let mut frame = StompFrame {
        command,
        headers,
        body: String::new(),
    };

    let length = frame.get("content-length").and_then(|v| v.trim().parse::<usize>().ok());
    let (body, remaining) = match length {
        Some(len) => {
            let body = after_head
                .get(..len)
                .ok_or_else(|| ConnectionError::Protocol("body shorter than content-length".into()))?;
            let tail = &after_head[len..];
            let tail = tail
                .strip_prefix('\0')
                .ok_or_else(|| ConnectionError::Protocol("missing NUL after body".into()))?;
            (body, tail)
        }
        None => after_head
            .split_once('\0')
            .ok_or_else(|| ConnectionError::Protocol("missing NUL terminator".into()))?,
    };
    frame.body = body.to_string();
    Ok((frame, remaining))
}

/// Opens STOMP sessions over WebSocket.
pub struct StompTransport {
    url: String,
    connect_timeout: Duration,
}

impl StompTransport {
    pub fn new(url: &str, connect_timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            connect_timeout,
        }
    }

    fn parse_url(&self) -> Result<Url, ConnectionError> {
        let url = Url::parse(&self.url).map_err(|e| ConnectionError::InvalidEndpoint(format!("{}: {e}", self.url)))?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConnectionError::InvalidEndpoint(format!(
                "unsupported scheme {other:?} for STOMP"
            ))),
        }
    }

    async fn open(&self, url: &Url) -> Result<StompConnection, ConnectionError> {
        let (ws, _response) = connect_async(url.as_str()).await.map_err(map_ws_error)?;
        let mut conn = StompConnection::new(ws);
        let host = url.host_str().unwrap_or("localhost").to_string();
        conn.handshake(&host).await?;
        Ok(conn)
    }
}

fn map_ws_error(e: tungstenite::Error) -> ConnectionError {
    match e {
        tungstenite::Error::Http(response) => {
            let status = response.status();
            ConnectionError::Refused {
                status: Some(status.as_u16()),
                reason: status.canonical_reason().unwrap_or("upgrade rejected").to_string(),
            }
        }
        tungstenite::Error::Url(e) => ConnectionError::InvalidEndpoint(e.to_string()),
        tungstenite::Error::Io(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => ConnectionError::Refused {
            status: None,
            reason: e.to_string(),
        },
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => ConnectionError::Closed,
        other => ConnectionError::Network(other.to_string()),
    }
}

#[async_trait]
impl Transport for StompTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Stomp
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        let url = self.parse_url()?;
        let conn = tokio::time::timeout(self.connect_timeout, self.open(&url))
            .await
            .map_err(|_| ConnectionError::Timeout(self.connect_timeout))??;
        info!(connection_id = %conn.id, url = %self.url, "STOMP session established");
        Ok(Box::new(conn))
    }
}

/// A STOMP session that has completed its `CONNECTED` handshake.
pub struct StompConnection {
    id: ConnectionId,
    ws: Option<WsStream>,
    pending: VecDeque<StompFrame>,
    next_subscription: u64,
}

impl StompConnection {
    fn new(ws: WsStream) -> Self {
        Self {
            id: ConnectionId::new(),
            ws: Some(ws),
            pending: VecDeque::new(),
            next_subscription: 0,
        }
    }

    async fn send(&mut self, frame: StompFrame) -> Result<(), ConnectionError> {
        let ws = self.ws.as_mut().ok_or(ConnectionError::Closed)?;
        ws.send(Message::Text(frame.encode().into())).await.map_err(map_ws_error)
    }

    /// Next STOMP frame from the socket. `None` when the socket has closed.
    async fn read_frame(&mut self) -> Option<Result<StompFrame, ConnectionError>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Some(Ok(frame));
            }
            let ws = self.ws.as_mut()?;
            let text = match ws.next().await {
                Some(Ok(Message::Text(t))) => t.as_str().to_string(),
                Some(Ok(Message::Binary(b))) => String::from_utf8_lossy(&b).into_owned(),
                Some(Ok(Message::Close(_))) | None => {
                    self.ws = None;
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    self.ws = None;
                    return Some(Err(map_ws_error(e)));
                }
            };
            match decode_all(&text) {
                Ok(frames) => self.pending.extend(frames),
                Err(e) => return Some(Err(e)),
            }
        }
    }

    async fn handshake(&mut self, host: &str) -> Result<(), ConnectionError> {
        let connect = StompFrame::new("CONNECT")
            .header("accept-version", ACCEPT_VERSION)
            .header("host", host)
            .header("heart-beat", "0,0");
        self.send(connect).await?;

        loop {
            match self.read_frame().await {
                Some(Ok(frame)) if frame.command == "CONNECTED" => {
                    debug!(
                        connection_id = %self.id,
                        version = frame.get("version").unwrap_or("1.0"),
                        "STOMP CONNECTED"
                    );
                    return Ok(());
                }
                Some(Ok(frame)) if frame.command == "ERROR" => {
                    return Err(ConnectionError::Handshake(error_text(&frame)));
                }
                Some(Ok(frame)) => {
                    debug!(command = %frame.command, "ignoring frame before CONNECTED");
                }
                Some(Err(e)) => return Err(ConnectionError::Handshake(e.to_string())),
                None => return Err(ConnectionError::Handshake("socket closed before CONNECTED".into())),
            }
        }
    }
}

fn error_text(frame: &StompFrame) -> String {
    let message = frame.get("message").unwrap_or("server error");
    let body = frame.body.trim();
    if body.is_empty() {
        message.to_string()
    } else {
        format!("{message}: {body}")
    }
}

#[async_trait]
impl Connection for StompConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectionError> {
        let sub_id = format!("sub-{}", self.next_subscription);
        self.next_subscription += 1;
        let frame = StompFrame::new("SUBSCRIBE")
            .header("id", sub_id.clone())
            .header("destination", topic)
            .header("ack", "auto");
        self.send(frame).await?;
        debug!(connection_id = %self.id, topic, subscription = %sub_id, "STOMP SUBSCRIBE sent");
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<Result<Frame, ConnectionError>> {
        loop {
            let frame = match self.read_frame().await? {
                Ok(f) => f,
                Err(e) => return Some(Err(e)),
            };
            match frame.command.as_str() {
                "MESSAGE" => {
                    let destination = frame.get("destination").unwrap_or_default().to_string();
                    return Some(Ok(Frame::Topic {
                        destination,
                        body: frame.body,
                    }));
                }
                "ERROR" => return Some(Err(ConnectionError::Protocol(error_text(&frame)))),
                "RECEIPT" => continue,
                other => {
                    warn!(connection_id = %self.id, command = other, "unexpected STOMP frame");
                }
            }
        }
    }

    async fn close(&mut self) {
        if self.ws.is_none() {
            return;
        }
        let _ = self.send(StompFrame::new("DISCONNECT")).await;
        if let Some(mut ws) = self.ws.take() {
            let _ = ws.close(None).await;
        }
        self.pending.clear();
        debug!(connection_id = %self.id, "STOMP session closed");
    }
}
