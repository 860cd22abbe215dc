//! Attachment decoding and storage layout

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;
use uuid::Uuid;

use super::MediaError;
use crate::shared::event::{AttachmentKind, EncodedAttachment};
use crate::shared::messaging::ConnectionId;

/// Kind of a stored media file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Image,
    Voice,
    Video,
    /// Frame extracted from a video
    VideoThumbnail,
    /// User profile picture
    Avatar,
}

impl MediaKind {
    /// Directory segment under `messages/<connection>/`
    pub fn dir(&self) -> &'static str {
        match self {
            MediaKind::Image => "images",
            MediaKind::Voice => "voices",
            MediaKind::Video => "videos",
            MediaKind::VideoThumbnail => "thumbs",
            MediaKind::Avatar => "thumbnails",
        }
    }

    /// Extension used when the client filename has none
    pub fn default_extension(&self) -> &'static str {
        match self {
            MediaKind::Image | MediaKind::Avatar => "png",
            MediaKind::Voice => "m4a",
            MediaKind::Video => "mp4",
            MediaKind::VideoThumbnail => "jpg",
        }
    }
}

impl From<AttachmentKind> for MediaKind {
    fn from(kind: AttachmentKind) -> Self {
        match kind {
            AttachmentKind::Image => MediaKind::Image,
            AttachmentKind::Voice => MediaKind::Voice,
            AttachmentKind::Video => MediaKind::Video,
        }
    }
}

/// Decode a base64 payload, stripping a `data:<mime>;base64,` prefix if present
pub fn decode_payload(data: &str) -> Result<Vec<u8>, MediaError> {
    let data = data.trim();
    let encoded = match data.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, body)| body).unwrap_or(rest),
        None => data,
    };
    let encoded: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = STANDARD
        .decode(&encoded)
        .or_else(|_| STANDARD_NO_PAD.decode(&encoded))?;
    if bytes.is_empty() {
        return Err(MediaError::Empty);
    }
    Ok(bytes)
}

/// Lowercase alphanumeric extension of `filename`, or the kind's default
pub fn extension_for(filename: &str, kind: MediaKind) -> String {
    std::path::Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 10 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| kind.default_extension().to_string())
}

/// `messages/<connection>/<dir>/<uuid>.<ext>`
pub fn message_media_reference(connection_id: ConnectionId, kind: MediaKind, extension: &str) -> String {
    format!(
        "messages/{}/{}/{}.{}",
        connection_id,
        kind.dir(),
        Uuid::new_v4(),
        extension
    )
}

/// `thumbnails/<username>.<ext>`
pub fn avatar_reference(username: &str, extension: &str) -> String {
    format!("{}/{}.{}", MediaKind::Avatar.dir(), username, extension)
}

/// An attachment decoded and ready to store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedAttachment {
    pub kind: AttachmentKind,
    pub bytes: Vec<u8>,
    pub extension: String,
}

impl DecodedAttachment {
    pub fn decode(encoded: &EncodedAttachment) -> Result<Self, MediaError> {
        Ok(Self {
            kind: encoded.kind,
            bytes: decode_payload(&encoded.data)?,
            extension: extension_for(&encoded.filename, encoded.kind.into()),
        })
    }
}
