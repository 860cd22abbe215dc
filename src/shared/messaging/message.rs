//! Chat Message Data Structure
//!
//! Represents a message exchanged over a connection, with optional text and
//! media attachments. Media fields hold store-relative references; derived
//! metadata (waveform, video duration and thumbnail) is filled in after the
//! message is first persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::ConnectionId;

/// Store-assigned message identifier
pub type MessageId = i64;

/// Media references attached to a message
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MessageMedia {
    pub image: Option<String>,
    pub voice: Option<String>,
    /// Amplitude samples normalized by 255, derived from `voice`
    pub waveform: Option<Vec<f32>>,
    pub video: Option<String>,
    /// Single frame extracted from `video`
    pub video_thumbnail: Option<String>,
    /// Whole seconds, derived from `video`
    pub video_duration: Option<u32>,
}

impl MessageMedia {
    /// Every stored file this message references
    pub fn references(&self) -> Vec<&str> {
        [
            &self.image,
            &self.voice,
            &self.video,
            &self.video_thumbnail,
        ]
        .into_iter()
        .filter_map(|r| r.as_deref())
        .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.references().is_empty()
    }
}

/// A persisted message
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub connection_id: ConnectionId,
    /// Username of the author
    pub user: String,
    pub text: Option<String>,
    #[serde(flatten)]
    pub media: MessageMedia,
    pub delivered: bool,
    pub seen: bool,
    pub created: DateTime<Utc>,
}

impl Message {
    pub fn is_author(&self, username: &str) -> bool {
        self.user == username
    }

    /// Only the non-author party may mark a message as seen
    pub fn can_mark_seen(&self, username: &str) -> bool {
        !self.is_author(username)
    }
}

/// Fields needed to create a message
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub connection_id: ConnectionId,
    pub user: String,
    pub text: Option<String>,
    pub media: MessageMedia,
    pub delivered: bool,
}

impl NewMessage {
    /// A delivered message with the given text and no media
    pub fn text(connection_id: ConnectionId, user: impl Into<String>, text: Option<String>) -> Self {
        Self {
            connection_id,
            user: user.into(),
            text,
            media: MessageMedia::default(),
            delivered: true,
        }
    }

    pub fn with_media(mut self, media: MessageMedia) -> Self {
        self.media = media;
        self
    }

    /// Copy of `source` authored by `forwarder` into another connection.
    /// Media references are shared; derived metadata is copied as-is.
    pub fn forwarded(source: &Message, connection_id: ConnectionId, forwarder: &str) -> Self {
        Self {
            connection_id,
            user: forwarder.to_string(),
            text: source.text.clone(),
            media: source.media.clone(),
            delivered: true,
        }
    }
}

/// Derived metadata written back onto a message once transcoding finishes.
/// `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    pub waveform: Option<Vec<f32>>,
    pub video_duration: Option<u32>,
    pub video_thumbnail: Option<String>,
}

impl MetadataUpdate {
    pub fn is_empty(&self) -> bool {
        self.waveform.is_none() && self.video_duration.is_none() && self.video_thumbnail.is_none()
    }

    /// Apply the non-empty fields onto `media`
    pub fn apply(&self, media: &mut MessageMedia) {
        if let Some(waveform) = &self.waveform {
            media.waveform = Some(waveform.clone());
        }
        if let Some(duration) = self.video_duration {
            media.video_duration = Some(duration);
        }
        if let Some(thumbnail) = &self.video_thumbnail {
            media.video_thumbnail = Some(thumbnail.clone());
        }
    }
}
