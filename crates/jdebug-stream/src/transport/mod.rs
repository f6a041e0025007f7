//! Realtime transports.
//!
//! A [`Transport`] opens [`Connection`]s; a connection yields raw [`Frame`]s
//! until it ends. Reconnection lives above this layer.

pub mod sse;
pub mod stomp;

use std::sync::Arc;

use async_trait::async_trait;
use jdebug_core::{ConnectionError, ConnectionId};
use jdebug_settings::TransportKind;

use crate::endpoint::EndpointConfig;
use crate::frame::Frame;

pub use sse::SseTransport;
pub use stomp::StompTransport;

/// One open realtime connection.
#[async_trait]
pub trait Connection: Send {
    fn id(&self) -> &ConnectionId;

    /// Subscribe to a topic. Transports without topics accept and ignore it.
    async fn subscribe(&mut self, topic: &str) -> Result<(), ConnectionError>;

    /// Next inbound frame. `None` once the connection has ended.
    async fn next_frame(&mut self) -> Option<Result<Frame, ConnectionError>>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self);
}

/// Factory for connections to one endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Establish a connection. Fails on a malformed endpoint or refusal.
    async fn connect(&self) -> Result<Box<dyn Connection>, ConnectionError>;
}

/// Build the transport selected by `config`.
pub fn transport_for(config: &EndpointConfig) -> Arc<dyn Transport> {
    match config.transport {
        TransportKind::Sse => Arc::new(SseTransport::new(&config.events_url, config.connect_timeout)),
        TransportKind::Stomp => Arc::new(StompTransport::new(&config.ws_url, config.connect_timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_transport_by_kind() {
        assert_eq!(transport_for(&EndpointConfig::sse("http://h/events")).kind(), TransportKind::Sse);
        assert_eq!(transport_for(&EndpointConfig::stomp("ws://h/ws")).kind(), TransportKind::Stomp);
    }
}
