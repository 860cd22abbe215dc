//! Backend Error Module
//!
//! This module defines error types specific to the backend server.
//! Command handlers return them to the router, and HTTP handlers return them
//! directly as responses.
//!
//! # Architecture
//!
//! - **`types`** - The `BackendError` taxonomy and its constructors
//! - **`conversion`** - `IntoResponse` for the HTTP surface
//!
//! # Error Types
//!
//! - `NotFound` - A referenced user, connection or message does not exist
//! - `Unauthorized` - The caller is not allowed to act on the target
//! - `MalformedInput` - A command carried unusable data
//! - `MediaPipeline` - Attachment decoding, storage or transcoding failed
//! - `ConnectionLost` - A write to the peer socket failed
//! - `Store` - The persistence layer failed
//! - `Config` - Startup configuration is unusable
//!
//! # Socket Behaviour
//!
//! On the socket no error is ever sent back to the client. The command router
//! logs `NotFound` and `Unauthorized` at debug level and everything else at
//! warn level, then drops the command.

/// Error type definitions
pub mod types;

/// Error conversion implementations
pub mod conversion;

pub use types::BackendError;
