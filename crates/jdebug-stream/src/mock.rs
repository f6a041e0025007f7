//! Scripted in-memory transport for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use jdebug_core::{ConnectionError, ConnectionId};
use jdebug_settings::TransportKind;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::frame::Frame;
use crate::transport::{Connection, Transport};

type FrameResult = Result<Frame, ConnectionError>;

pub struct MockConnection {
    id: ConnectionId,
    frames: mpsc::UnboundedReceiver<FrameResult>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
    hang_on_subscribe: bool,
}

/// Test-side controls for a [`MockConnection`]. Dropping it ends the connection.
pub struct MockHandle {
    tx: mpsc::UnboundedSender<FrameResult>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    closed: Arc<AtomicBool>,
}

impl MockConnection {
    pub fn pair() -> (Self, MockHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriptions = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let conn = Self {
            id: ConnectionId::new(),
            frames: rx,
            subscriptions: Arc::clone(&subscriptions),
            closed: Arc::clone(&closed),
            hang_on_subscribe: false,
        };
        (conn, MockHandle { tx, subscriptions, closed })
    }

    /// A connection whose `subscribe` never completes.
    pub fn hanging() -> (Self, MockHandle) {
        let (mut conn, handle) = Self::pair();
        conn.hang_on_subscribe = true;
        (conn, handle)
    }
}

impl MockHandle {
    pub fn send(&self, frame: Frame) {
        let _ = self.tx.send(Ok(frame));
    }

    pub fn fail(&self, err: ConnectionError) {
        let _ = self.tx.send(Err(err));
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectionError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ConnectionError::Closed);
        }
        self.subscriptions.lock().push(topic.to_string());
        if self.hang_on_subscribe {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn next_frame(&mut self) -> Option<FrameResult> {
        if self.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.frames.recv().await
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.frames.close();
    }
}

/// Hands out scripted connect results in order. Once the script runs out,
/// `connect` waits forever.
pub struct MockTransport {
    kind: TransportKind,
    script: Mutex<VecDeque<Result<MockConnection, ConnectionError>>>,
    attempts: Mutex<Vec<Instant>>,
}

impl MockTransport {
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            script: Mutex::new(VecDeque::new()),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn push_conn(&self, conn: MockConnection) {
        self.script.lock().push_back(Ok(conn));
    }

    pub fn push_err(&self, err: ConnectionError) {
        self.script.lock().push_back(Err(err));
    }

    /// Time of every connect call so far.
    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn kind(&self) -> TransportKind {
        self.kind
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError> {
        self.attempts.lock().push(Instant::now());
        let next = self.script.lock().pop_front();
        match next {
            Some(Ok(conn)) => Ok(Box::new(conn)),
            Some(Err(e)) => Err(e),
            None => std::future::pending().await,
        }
    }
}
