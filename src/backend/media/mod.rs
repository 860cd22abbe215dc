//! Media Attachment Pipeline
//!
//! Turns encoded attachments into stored files and derives metadata from
//! them in the background.
//!
//! # Architecture
//!
//! - **`attachment`** - Base64 decoding, media kinds and storage paths
//! - **`storage`** - `MediaStore` collaborator and its filesystem implementation
//! - **`transcoder`** - `Transcoder` collaborator driving ffmpeg, ffprobe and
//!   audiowaveform
//! - **`pipeline`** - `MediaPipeline`: store-before-commit for new attachments,
//!   cancellable background metadata tasks and the `MetadataHook` fired when
//!   derived fields land
//!
//! # Flow
//!
//! ```text
//! message.send ──> decode ──> MediaStore::save ──> Store::create_message
//!                                                        │
//!                         background task <──────────────┘
//!                         (waveform / duration / thumbnail)
//!                                │
//!                  Store::update_metadata ──> MetadataHook
//! ```

use thiserror::Error;

pub mod attachment;
pub mod pipeline;
pub mod storage;
pub mod transcoder;

pub use attachment::{DecodedAttachment, MediaKind};
pub use pipeline::{MediaPipeline, MetadataHook, StoredAttachments};
pub use storage::{FsMediaStore, MediaStore};
pub use transcoder::{FfmpegTranscoder, Transcoder, VideoMetadata};

/// Media pipeline failures
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("attachment is empty")]
    Empty,

    /// A reference tried to escape the media root
    #[error("invalid media reference `{0}`")]
    InvalidReference(String),

    #[error("media I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{tool} could not be started: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected {tool} output: {message}")]
    Parse { tool: String, message: String },
}

impl MediaError {
    pub fn parse(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            tool: tool.into(),
            message: message.into(),
        }
    }
}
