//! Shared Error Types
//!
//! Errors raised by the wire protocol itself, independent of any collaborator
//! (store, media, transport). Encoding an outbound event is the only
//! operation that can fail here.
//!
//! # Usage
//!
//! ```rust
//! use chatline::shared::error::SharedError;
//!
//! let error = SharedError::serialization("unexpected map key");
//! assert_eq!(error.to_string(), "Serialization error: unexpected map key");
//! ```
use thiserror::Error;

/// Shared error types used by the protocol layer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// JSON serialization or deserialization error
    #[error("Serialization error: {message}")]
    SerializationError {
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::SerializationError {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for SharedError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(format!("JSON error: {}", err))
    }
}
