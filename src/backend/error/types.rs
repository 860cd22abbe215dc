/**
 * Backend Error Types
 *
 * # Error Categories
 *
 * ## Silent Rejections
 *
 * `NotFound` and `Unauthorized` are the expected outcome of stale or hostile
 * commands (a message deleted in another tab, a forged connection id). They
 * are dropped without noise.
 *
 * ## Failures
 *
 * `Store` and `MediaPipeline` indicate the server could not complete an
 * otherwise valid command. `ConnectionLost` is raised when a socket write
 * fails; the session ends and the error is only logged.
 */

use axum::http::StatusCode;
use thiserror::Error;

use crate::backend::media::MediaError;
use crate::backend::store::StoreError;

/// Backend-specific error types
///
/// # Usage
///
/// ```rust
/// use chatline::backend::error::BackendError;
///
/// let err = BackendError::not_found("connection 4");
/// assert!(err.is_silent());
///
/// let err = BackendError::malformed("page must be non-negative");
/// assert!(!err.is_silent());
/// ```
#[derive(Debug, Error)]
pub enum BackendError {
    /// A referenced entity does not exist
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The caller may not act on the target
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Malformed input: {message}")]
    MalformedInput { message: String },

    #[error(transparent)]
    MediaPipeline(#[from] MediaError),

    #[error("Connection lost: {message}")]
    ConnectionLost { message: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl BackendError {
    /// Create a not-found error
    ///
    /// # Arguments
    ///
    /// * `what` - Description of the missing entity, e.g. `"message 12"`
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedInput {
            message: message.into(),
        }
    }

    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::ConnectionLost {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Whether this error is an expected rejection that should not be
    /// reported above debug level
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::Unauthorized { .. })
    }

    /// Get the HTTP status code for this error
    ///
    /// # Status Code Mapping
    ///
    /// - `NotFound` - 404
    /// - `Unauthorized` - 403
    /// - `MalformedInput` - 400
    /// - `MediaPipeline` - 422
    /// - everything else - 500
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Unauthorized { .. } => StatusCode::FORBIDDEN,
            Self::MalformedInput { .. } => StatusCode::BAD_REQUEST,
            Self::MediaPipeline(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ConnectionLost { .. } | Self::Store(_) | Self::Config { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::NotFound { what } => format!("{} not found", what),
            Self::Unauthorized { message }
            | Self::MalformedInput { message }
            | Self::ConnectionLost { message }
            | Self::Config { message } => message.clone(),
            other => other.to_string(),
        }
    }
}
