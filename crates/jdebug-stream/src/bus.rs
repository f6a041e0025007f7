use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use jdebug_core::{DebugEvent, ListenerError, SubscriptionId};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use tracing::warn;

type Handler = dyn Fn(&DebugEvent) -> anyhow::Result<()> + Send + Sync;

struct Listener {
    id: SubscriptionId,
    handler: Arc<Handler>,
    // Cleared on unsubscribe so an in-progress publish skips it.
    active: Arc<AtomicBool>,
}

impl Listener {
    fn snapshot(&self) -> Self {
        Self {
            id: self.id,
            handler: Arc::clone(&self.handler),
            active: Arc::clone(&self.active),
        }
    }
}

/// In-process publish/subscribe register for debugger events.
///
/// - No backlog replay: a listener sees only events published after it registered.
/// - `publish` runs every handler synchronously before returning. Concurrent
///   publishers are serialized, so all listeners observe one global order.
/// - A handler that errors or panics is logged as a [`ListenerError`] and the
///   remaining handlers still run.
/// - `unsubscribe` may be called from inside a handler.
pub struct EventBus {
    listeners: Mutex<Vec<Listener>>,
    next_id: AtomicU64,
    // Reentrant so a handler may publish without deadlocking its own thread.
    delivery: ReentrantMutex<()>,
    latest: RwLock<Option<DebugEvent>>,
    published: AtomicU64,
    failures: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            delivery: ReentrantMutex::new(()),
            latest: RwLock::new(None),
            published: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Register a handler. Returns immediately with its handle.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&DebugEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Listener {
            id,
            handler: Arc::new(handler),
            active: Arc::new(AtomicBool::new(true)),
        });
        tracing::debug!(subscription_id = %id, "listener registered");
        id
    }

    /// Remove a handler. Returns false if the handle was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(pos) = listeners.iter().position(|l| l.id == id) else {
            return false;
        };
        let removed = listeners.remove(pos);
        removed.active.store(false, Ordering::Release);
        tracing::debug!(subscription_id = %id, "listener removed");
        true
    }

    /// Deliver `event` to every registered handler. Returns how many handlers ran.
    pub fn publish(&self, event: DebugEvent) -> usize {
        let _order = self.delivery.lock();

        *self.latest.write() = Some(event.clone());
        let _ = self.published.fetch_add(1, Ordering::Relaxed);

        let snapshot: Vec<Listener> = self.listeners.lock().iter().map(Listener::snapshot).collect();

        let mut delivered = 0;
        for listener in snapshot {
            if !listener.active.load(Ordering::Acquire) {
                continue;
            }
            delivered += 1;
            let outcome = catch_unwind(AssertUnwindSafe(|| (listener.handler)(&event)));
            let failure = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => ListenerError::Failed {
                    subscription: listener.id,
                    reason: format!("{e:#}"),
                },
                Err(panic) => ListenerError::Panicked {
                    subscription: listener.id,
                    message: panic_message(panic.as_ref()),
                },
            };
            let _ = self.failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                subscription_id = %failure.subscription(),
                event_kind = %event.kind,
                error = %failure,
                "listener failed, continuing delivery"
            );
        }
        delivered
    }

    /// The most recently published event, if any.
    pub fn latest(&self) -> Option<DebugEvent> {
        self.latest.read().clone()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn published_count(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    /// Drop every listener.
    pub fn clear(&self) {
        for listener in self.listeners.lock().drain(..) {
            listener.active.store(false, Ordering::Release);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
