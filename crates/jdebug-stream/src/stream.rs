use std::sync::Arc;

use jdebug_core::{DebugEvent, SessionId, SubscriptionId};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::binder::{Binding, SessionBinder};
use crate::bus::EventBus;
use crate::endpoint::EndpointConfig;
use crate::reconnect::{ConnectionState, ReconnectionController, StatusBoard, StreamStatus};
use crate::transport::{transport_for, Transport};

/// Returned by [`DebugStream::create_stream`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamHandle {
    binding: Binding,
}

impl StreamHandle {
    pub fn session_id(&self) -> &SessionId {
        &self.binding.session_id
    }

    /// Topic followed on topic transports.
    pub fn topic(&self) -> Option<&str> {
        self.binding.topic.as_deref()
    }
}

struct ActiveStream {
    session_id: SessionId,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Live event stream for one debug session at a time.
///
/// Listeners registered with [`subscribe`](Self::subscribe) stay registered
/// across reconnects and across calls to `create_stream`.
pub struct DebugStream {
    config: EndpointConfig,
    transport: Arc<dyn Transport>,
    binder: Arc<SessionBinder>,
    bus: Arc<EventBus>,
    status: Arc<StatusBoard>,
    active: Mutex<Option<ActiveStream>>,
}

impl DebugStream {
    pub fn new(config: EndpointConfig) -> Self {
        let transport = transport_for(&config);
        Self::with_transport(config, transport)
    }

    /// Use a caller-supplied transport instead of the one `config` selects.
    pub fn with_transport(config: EndpointConfig, transport: Arc<dyn Transport>) -> Self {
        let binder = Arc::new(SessionBinder::new(transport.kind(), config.topic_prefix.clone()));
        Self {
            config,
            transport,
            binder,
            bus: Arc::new(EventBus::new()),
            status: Arc::new(StatusBoard::new()),
            active: Mutex::new(None),
        }
    }

    /// Start streaming events for `session_id`. Any previous stream is torn down first.
    pub async fn create_stream(&self, session_id: SessionId) -> StreamHandle {
        let mut active = self.active.lock().await;
        if let Some(prev) = active.take() {
            info!(session_id = %prev.session_id, "replacing active stream");
            stop(prev).await;
        }

        self.status.reset();
        let binding = self.binder.bind(session_id.clone());
        let controller = ReconnectionController::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.binder),
            Arc::clone(&self.bus),
            Arc::clone(&self.status),
            self.config.reconnect_delay,
        );
        let cancel = CancellationToken::new();
        let task = tokio::spawn(controller.run(cancel.clone()));
        info!(
            session_id = %session_id,
            transport = self.transport.kind().as_str(),
            topic = binding.topic.as_deref().unwrap_or("-"),
            "stream created"
        );

        *active = Some(ActiveStream {
            session_id,
            cancel,
            task,
        });
        StreamHandle { binding }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DebugEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(id)
    }

    pub fn latest(&self) -> Option<DebugEvent> {
        self.bus.latest()
    }

    pub fn status(&self) -> StreamStatus {
        self.status.snapshot()
    }

    pub fn state_changes(&self) -> broadcast::Receiver<ConnectionState> {
        self.status.subscribe()
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.binder.binding().map(|b| b.session_id)
    }

    /// Stop the stream and close its connection. Listeners stay registered.
    pub async fn shutdown(&self) {
        let prev = self.active.lock().await.take();
        if let Some(prev) = prev {
            info!(session_id = %prev.session_id, "shutting down stream");
            stop(prev).await;
        }
        self.binder.clear();
        self.status.closed();
    }
}

async fn stop(stream: ActiveStream) {
    stream.cancel.cancel();
    if let Err(e) = stream.task.await {
        warn!(session_id = %stream.session_id, error = %e, "stream task ended abnormally");
    }
}

impl Drop for DebugStream {
    fn drop(&mut self) {
        if let Some(active) = self.active.get_mut().take() {
            active.cancel.cancel();
        }
    }
}
