//! Fixed-delay reconnection.
//!
//! ```text
//! Disconnected → Connecting → Connected ─(failure)→ Reconnecting → Connecting → …
//!                     └──────(failure)─────────────────↑
//! any state ─(shutdown)→ Closed
//! ```
//!
//! Retries never stop on their own. Only cancellation reaches `Closed`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use jdebug_core::{ConnectionError, ConnectionId, DebugEvent};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::binder::SessionBinder;
use crate::bus::EventBus;
use crate::transport::{Connection, Transport};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of a stream's connection health.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamStatus {
    pub state: ConnectionState,
    /// Consecutive connect attempts since the last successful connection.
    pub attempt: u32,
    pub last_error: Option<ConnectionError>,
    pub connection_id: Option<ConnectionId>,
}

impl Default for StreamStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt: 0,
            last_error: None,
            connection_id: None,
        }
    }
}

/// Shared, observable connection status.
pub struct StatusBoard {
    current: RwLock<StreamStatus>,
    changes: broadcast::Sender<ConnectionState>,
}

impl Default for StatusBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBoard {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            current: RwLock::new(StreamStatus::default()),
            changes,
        }
    }

    pub fn snapshot(&self) -> StreamStatus {
        self.current.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.current.read().state
    }

    /// Receive every state transition from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionState> {
        self.changes.subscribe()
    }

    fn update(&self, f: impl FnOnce(&mut StreamStatus)) {
        let (before, after) = {
            let mut status = self.current.write();
            let before = status.state;
            f(&mut status);
            (before, status.state)
        };
        if before != after {
            debug!(from = %before, to = %after, "stream state changed");
            let _ = self.changes.send(after);
        }
    }

    pub(crate) fn connecting(&self, attempt: u32) {
        self.update(|s| {
            s.state = ConnectionState::Connecting;
            s.attempt = attempt;
            s.connection_id = None;
        });
    }

    pub(crate) fn connected(&self, id: ConnectionId) {
        self.update(|s| {
            s.state = ConnectionState::Connected;
            s.last_error = None;
            s.connection_id = Some(id);
        });
    }

    pub(crate) fn failed(&self, err: ConnectionError) {
        self.update(|s| {
            s.last_error = Some(err);
            s.connection_id = None;
        });
    }

    pub(crate) fn reconnecting(&self) {
        self.update(|s| {
            s.state = ConnectionState::Reconnecting;
            s.connection_id = None;
        });
    }

    pub(crate) fn closed(&self) {
        self.update(|s| {
            s.state = ConnectionState::Closed;
            s.connection_id = None;
        });
    }

    pub(crate) fn reset(&self) {
        self.update(|s| *s = StreamStatus::default());
    }
}

enum Served {
    Cancelled,
    /// The subscribe step failed; the connection never carried events.
    NotBound,
    Disconnected,
}

enum PumpEnd {
    Cancelled,
    Ended,
    Failed(ConnectionError),
}

/// Owns the connection for one stream and keeps it alive.
pub struct ReconnectionController {
    transport: Arc<dyn Transport>,
    binder: Arc<SessionBinder>,
    bus: Arc<EventBus>,
    status: Arc<StatusBoard>,
    reconnect_delay: Duration,
}

impl ReconnectionController {
    pub fn new(
        transport: Arc<dyn Transport>,
        binder: Arc<SessionBinder>,
        bus: Arc<EventBus>,
        status: Arc<StatusBoard>,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            transport,
            binder,
            bus,
            status,
            reconnect_delay,
        }
    }

    /// Connect, bind, pump frames into the bus, and retry forever until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut attempt: u32 = 0;
        loop {
            attempt = attempt.saturating_add(1);
            self.status.connecting(attempt);
            debug!(attempt, transport = self.transport.kind().as_str(), "connecting");

            let connected = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = self.transport.connect() => Some(result),
            };
            let Some(connected) = connected else { break };

            match connected {
                Err(e) => {
                    warn!(attempt, error = %e, error_kind = e.error_kind(), "connect failed");
                    self.status.failed(e);
                }
                Ok(mut conn) => {
                    let served = self.serve(conn.as_mut(), &cancel).await;
                    conn.close().await;
                    match served {
                        Served::Cancelled => break,
                        Served::Disconnected => attempt = 0,
                        Served::NotBound => {}
                    }
                }
            }

            self.status.reconnecting();
            info!(delay_ms = self.reconnect_delay.as_millis() as u64, "reconnecting after delay");
            let cancelled = tokio::select! {
                biased;
                () = cancel.cancelled() => true,
                () = tokio::time::sleep(self.reconnect_delay) => false,
            };
            if cancelled {
                break;
            }
        }
        self.status.closed();
        info!("stream closed");
    }

    /// Bind and pump one connection until it ends or `cancel` fires.
    async fn serve(&self, conn: &mut dyn Connection, cancel: &CancellationToken) -> Served {
        let conn_id = conn.id().clone();
        let bound = tokio::select! {
            biased;
            () = cancel.cancelled() => None,
            result = self.binder.rebind(&mut *conn) => Some(result),
        };
        match bound {
            None => {
                debug!(connection_id = %conn_id, "shutdown during subscribe, dropping connection");
                return Served::Cancelled;
            }
            Some(Err(e)) => {
                warn!(connection_id = %conn_id, error = %e, "subscribe failed");
                self.bus.publish(DebugEvent::transport_error(e.to_string()));
                self.status.failed(e);
                return Served::NotBound;
            }
            Some(Ok(())) => {}
        }

        self.status.connected(conn_id.clone());
        info!(connection_id = %conn_id, "stream connected");

        match self.pump(conn, cancel).await {
            PumpEnd::Cancelled => Served::Cancelled,
            PumpEnd::Ended => {
                info!(connection_id = %conn_id, "stream ended by server");
                self.status.failed(ConnectionError::Closed);
                Served::Disconnected
            }
            PumpEnd::Failed(e) => {
                warn!(connection_id = %conn_id, error = %e, error_kind = e.error_kind(), "stream failed");
                self.bus.publish(DebugEvent::transport_error(e.to_string()));
                self.status.failed(e);
                Served::Disconnected
            }
        }
    }

    async fn pump(&self, conn: &mut dyn Connection, cancel: &CancellationToken) -> PumpEnd {
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => return PumpEnd::Cancelled,
                next = conn.next_frame() => next,
            };
            match next {
                Some(Ok(frame)) => {
                    let event = frame.normalize();
                    trace!(event_kind = %event.kind, "event received");
                    let _ = self.bus.publish(event);
                }
                Some(Err(e)) => return PumpEnd::Failed(e),
                None => return PumpEnd::Ended,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;
    use crate::mock::{MockConnection, MockTransport};
    use jdebug_core::{EventKind, SessionId};
    use jdebug_settings::TransportKind;
    use parking_lot::Mutex;

    const DELAY: Duration = Duration::from_secs(5);

    struct Harness {
        transport: Arc<MockTransport>,
        bus: Arc<EventBus>,
        status: Arc<StatusBoard>,
        cancel: CancellationToken,
        task: tokio::task::JoinHandle<()>,
    }

    fn start(transport: MockTransport) -> Harness {
        let transport = Arc::new(transport);
        let binder = Arc::new(SessionBinder::new(transport.kind(), "/topic/debug"));
        binder.bind(SessionId::from_raw("s1"));
        let bus = Arc::new(EventBus::new());
        let status = Arc::new(StatusBoard::new());
        let controller = ReconnectionController::new(
            Arc::clone(&transport) as Arc<dyn Transport>,
            binder,
            Arc::clone(&bus),
            Arc::clone(&status),
            DELAY,
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(controller.run(cancel.clone()));
        Harness {
            transport,
            bus,
            status,
            cancel,
            task,
        }
    }

    fn record(bus: &EventBus) -> Arc<Mutex<Vec<DebugEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe(move |e| {
            sink.lock().push(e.clone());
            Ok(())
        });
        seen
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_fixed_delay_until_connected() {
        let transport = MockTransport::new(TransportKind::Stomp);
        transport.push_err(ConnectionError::Network("down".into()));
        transport.push_err(ConnectionError::Refused {
            status: Some(503),
            reason: "starting".into(),
        });
        let (conn, handle) = MockConnection::pair();
        transport.push_conn(conn);

        let h = start(transport);
        tokio::time::sleep(DELAY * 3).await;

        let attempts = h.transport.attempts();
        assert_eq!(attempts.len(), 3);
        assert_eq!(attempts[1] - attempts[0], DELAY);
        assert_eq!(attempts[2] - attempts[1], DELAY);

        let status = h.status.snapshot();
        assert_eq!(status.state, ConnectionState::Connected);
        assert!(status.last_error.is_none());
        assert_eq!(handle.subscriptions(), vec!["/topic/debug/s1".to_string()]);

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_attempt_is_visible_in_status() {
        let transport = MockTransport::new(TransportKind::Sse);
        transport.push_err(ConnectionError::Network("down".into()));

        let h = start(transport);
        settle().await;

        let status = h.status.snapshot();
        assert_eq!(status.state, ConnectionState::Reconnecting);
        assert_eq!(status.attempt, 1);
        assert_eq!(status.last_error, Some(ConnectionError::Network("down".into())));

        h.cancel.cancel();
        h.task.await.unwrap();
        assert_eq!(h.status.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn listeners_survive_reconnect() {
        let transport = MockTransport::new(TransportKind::Stomp);
        let (first, first_handle) = MockConnection::pair();
        let (second, second_handle) = MockConnection::pair();
        transport.push_conn(first);
        transport.push_conn(second);

        let h = start(transport);
        let seen = record(&h.bus);
        settle().await;
        let mut states = h.status.subscribe();

        first_handle.send(Frame::topic("/topic/debug/s1", r#"{"type":"init","data":"ready"}"#));
        settle().await;
        drop(first_handle);
        settle().await;

        assert_eq!(states.try_recv().unwrap(), ConnectionState::Reconnecting);
        tokio::time::sleep(DELAY).await;
        settle().await;
        assert_eq!(states.try_recv().unwrap(), ConnectionState::Connecting);
        assert_eq!(states.try_recv().unwrap(), ConnectionState::Connected);

        second_handle.send(Frame::topic("/topic/debug/s1", r#"{"type":"debug","data":{"line":5}}"#));
        settle().await;

        let kinds: Vec<_> = seen.lock().iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![EventKind::Init, EventKind::Debug]);
        assert_eq!(second_handle.subscriptions(), vec!["/topic/debug/s1".to_string()]);

        h.cancel.cancel();
        h.task.await.unwrap();
        assert!(second_handle.is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn transport_error_is_published_before_teardown() {
        let transport = MockTransport::new(TransportKind::Sse);
        let (conn, handle) = MockConnection::pair();
        transport.push_conn(conn);

        let h = start(transport);
        let seen = record(&h.bus);
        settle().await;

        handle.fail(ConnectionError::Network("connection reset".into()));
        settle().await;

        let events = seen.lock().clone();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::Error);
        assert!(events[0].to_string().contains("connection reset"));
        assert!(handle.is_closed());
        assert_eq!(h.status.state(), ConnectionState::Reconnecting);

        h.cancel.cancel();
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_subscribe_delivers_nothing() {
        let transport = MockTransport::new(TransportKind::Stomp);
        let (conn, handle) = MockConnection::hanging();
        transport.push_conn(conn);

        let h = start(transport);
        let seen = record(&h.bus);
        settle().await;
        assert_eq!(handle.subscriptions().len(), 1);
        assert_eq!(h.status.state(), ConnectionState::Connecting);

        h.cancel.cancel();
        h.task.await.unwrap();

        handle.send(Frame::topic("/topic/debug/s1", "late"));
        settle().await;
        assert!(seen.lock().is_empty());
        assert!(handle.is_closed());
        assert_eq!(h.status.state(), ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_while_connecting() {
        // Empty script: connect never resolves.
        let h = start(MockTransport::new(TransportKind::Sse));
        settle().await;
        assert_eq!(h.status.state(), ConnectionState::Connecting);

        h.cancel.cancel();
        h.task.await.unwrap();
        assert_eq!(h.status.state(), ConnectionState::Closed);
    }
}
