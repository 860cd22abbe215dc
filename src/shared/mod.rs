//! Shared Module
//!
//! Types exchanged between the server and its clients: the messaging domain
//! model, the per-viewer payload views and the socket event protocol.
//!
//! Nothing in here touches I/O, so everything is usable from tests and tools
//! without a running server.

/// Real-time event protocol
pub mod event;

/// Shared error types
pub mod error;

/// Users, connections, messages and their client views
pub mod messaging;

pub use error::SharedError;
pub use event::{ClientEvent, DecodeError, EventKind, ServerEvent};
