//! # jdebug-core
//!
//! Shared vocabulary for the jdebug crates:
//!
//! - **Ids**: `SessionId`, `ConnectionId`, `SubscriptionId`
//! - **Events**: `DebugEvent` with its `EventKind` and `Payload`
//! - **Errors**: `ConnectionError`, `ParseError`, `ListenerError`

pub mod errors;
pub mod events;
pub mod ids;

pub use errors::{ConnectionError, ListenerError, ParseError};
pub use events::{DebugEvent, EventKind, Payload};
pub use ids::{ConnectionId, SessionId, SubscriptionId};
