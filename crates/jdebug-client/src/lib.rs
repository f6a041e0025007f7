//! # jdebug-client
//!
//! REST collaborator for the debugging backend: create a session, launch the
//! target program, register breakpoints.

pub mod api;
pub mod errors;

pub use api::{BreakpointRequest, DebuggerApi, LaunchRequest};
pub use errors::{ApiError, Result};
