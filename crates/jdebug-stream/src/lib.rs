//! # jdebug-stream
//!
//! Live event distribution for a remote debugging session.
//!
//! - [`transport`]: SSE and STOMP-over-WebSocket connections behind one `Transport` trait
//! - [`frame`]: normalization of raw frames into [`DebugEvent`](jdebug_core::DebugEvent)
//! - [`bus`]: synchronous in-process fan-out to subscribers
//! - [`binder`]: session → topic mapping, restored after every reconnect
//! - [`reconnect`]: fixed-delay reconnection state machine
//! - [`stream`]: the `DebugStream` facade used by front ends

pub mod binder;
pub mod bus;
pub mod endpoint;
pub mod frame;
pub mod reconnect;
pub mod stream;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

pub use binder::{Binding, SessionBinder};
pub use bus::EventBus;
pub use endpoint::EndpointConfig;
pub use frame::Frame;
pub use reconnect::{ConnectionState, ReconnectionController, StatusBoard, StreamStatus};
pub use stream::{DebugStream, StreamHandle};
pub use transport::{transport_for, Connection, Transport};
