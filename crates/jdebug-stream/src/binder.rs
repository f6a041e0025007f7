use jdebug_core::{ConnectionError, SessionId};
use jdebug_settings::TransportKind;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::transport::Connection;

/// The session the stream is following and the topic it maps to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Binding {
    pub session_id: SessionId,
    /// `None` on transports without topics.
    pub topic: Option<String>,
}

/// Maps the active debug session onto a transport subscription.
///
/// At most one binding exists at a time. After every reconnect the controller
/// calls [`rebind`](Self::rebind) so the fresh connection follows the same topic.
pub struct SessionBinder {
    kind: TransportKind,
    topic_prefix: String,
    binding: RwLock<Option<Binding>>,
}

impl SessionBinder {
    pub fn new(kind: TransportKind, topic_prefix: impl Into<String>) -> Self {
        Self {
            kind,
            topic_prefix: topic_prefix.into().trim_end_matches('/').to_string(),
            binding: RwLock::new(None),
        }
    }

    /// Topic for a session on topic-based transports.
    pub fn topic_for(&self, session_id: &SessionId) -> Option<String> {
        match self.kind {
            TransportKind::Stomp => Some(format!("{}/{}", self.topic_prefix, session_id)),
            TransportKind::Sse => None,
        }
    }

    /// Bind `session_id`, replacing any previous binding.
    pub fn bind(&self, session_id: SessionId) -> Binding {
        let binding = Binding {
            topic: self.topic_for(&session_id),
            session_id,
        };
        let previous = self.binding.write().replace(binding.clone());
        if let Some(prev) = previous.filter(|p| p.session_id != binding.session_id) {
            info!(from = %prev.session_id, to = %binding.session_id, "session binding replaced");
        }
        binding
    }

    pub fn binding(&self) -> Option<Binding> {
        self.binding.read().clone()
    }

    pub fn clear(&self) {
        if let Some(prev) = self.binding.write().take() {
            debug!(session_id = %prev.session_id, "session binding cleared");
        }
    }

    /// Re-establish the current binding on a fresh connection.
    pub async fn rebind(&self, conn: &mut dyn Connection) -> Result<(), ConnectionError> {
        // Clone out so no lock is held across the await.
        let Some(binding) = self.binding() else {
            return Ok(());
        };
        if let Some(topic) = &binding.topic {
            conn.subscribe(topic).await?;
            debug!(
                connection_id = %conn.id(),
                session_id = %binding.session_id,
                topic,
                "session bound to connection"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnection;

    #[test]
    fn stomp_topic_uses_prefix() {
        let binder = SessionBinder::new(TransportKind::Stomp, "/topic/debug/");
        let binding = binder.bind(SessionId::from_raw("s1"));
        assert_eq!(binding.topic.as_deref(), Some("/topic/debug/s1"));
    }

    #[test]
    fn sse_has_no_topic() {
        let binder = SessionBinder::new(TransportKind::Sse, "/topic/debug");
        assert!(binder.bind(SessionId::from_raw("s1")).topic.is_none());
    }

    #[test]
    fn rebinding_replaces_previous_session() {
        let binder = SessionBinder::new(TransportKind::Stomp, "/topic/debug");
        binder.bind(SessionId::from_raw("s1"));
        binder.bind(SessionId::from_raw("s2"));
        assert_eq!(binder.binding().unwrap().session_id.as_str(), "s2");
        binder.clear();
        assert!(binder.binding().is_none());
    }

    #[tokio::test]
    async fn rebind_subscribes_current_topic() {
        let binder = SessionBinder::new(TransportKind::Stomp, "/topic/debug");
        binder.bind(SessionId::from_raw("abc"));
        let (mut conn, handle) = MockConnection::pair();
        binder.rebind(&mut conn).await.unwrap();
        assert_eq!(handle.subscriptions(), vec!["/topic/debug/abc".to_string()]);
    }

    #[tokio::test]
    async fn rebind_without_binding_is_noop() {
        let binder = SessionBinder::new(TransportKind::Stomp, "/topic/debug");
        let (mut conn, handle) = MockConnection::pair();
        binder.rebind(&mut conn).await.unwrap();
        assert!(handle.subscriptions().is_empty());
    }
}
