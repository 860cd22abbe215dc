//! Client-facing Views
//!
//! Payload shapes pushed to clients. Views are computed per viewer: the same
//! message is serialized with `is_me = true` for its author and `false` for
//! the other party, and `friend` always names the other party.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::connection::{Connection, ConnectionId, RelationshipStatus};
use super::message::{Message, MessageId};
use super::user::User;

/// Preview shown for a friend with no text message yet
pub const NEW_CONNECTION_PREVIEW: &str = "New connection!";

/// Turns store-relative media references into absolute URLs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaUrls {
    base: String,
}

impl MediaUrls {
    /// `site_url` is the public origin, `media_url` the path media is served under
    pub fn new(site_url: &str, media_url: &str) -> Self {
        let site = site_url.trim_end_matches('/');
        let path = format!("/{}/", media_url.trim_matches('/'));
        let path = if path == "//" { "/".to_string() } else { path };
        Self {
            base: format!("{}{}", site, path),
        }
    }

    pub fn resolve(&self, reference: &str) -> String {
        format!("{}{}", self.base, reference.trim_start_matches('/'))
    }

    fn resolve_opt(&self, reference: Option<&str>) -> Option<String> {
        reference.map(|r| self.resolve(r))
    }
}

/// Public profile of a user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserView {
    pub username: String,
    pub name: String,
    pub thumbnail: Option<String>,
}

impl UserView {
    pub fn new(user: &User, urls: &MediaUrls) -> Self {
        Self {
            username: user.username.clone(),
            name: user.display_name(),
            thumbnail: urls.resolve_opt(user.thumbnail.as_deref()),
        }
    }
}

/// A message as seen by one viewer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageView {
    pub id: MessageId,
    pub connection_id: ConnectionId,
    pub is_me: bool,
    pub text: Option<String>,
    pub image: Option<String>,
    pub voice: Option<String>,
    pub waveform: Option<Vec<f32>>,
    pub video_url: Option<String>,
    pub video_thumb_url: Option<String>,
    pub video_duration: Option<u32>,
    pub delivered: bool,
    pub seen: bool,
    pub created: String,
}

impl MessageView {
    pub fn new(message: &Message, viewer: &str, urls: &MediaUrls) -> Self {
        let media = &message.media;
        Self {
            id: message.id,
            connection_id: message.connection_id,
            is_me: message.is_author(viewer),
            text: message.text.clone(),
            image: urls.resolve_opt(media.image.as_deref()),
            voice: urls.resolve_opt(media.voice.as_deref()),
            waveform: media.waveform.clone(),
            video_url: urls.resolve_opt(media.video.as_deref()),
            video_thumb_url: urls.resolve_opt(media.video_thumbnail.as_deref()),
            video_duration: media.video_duration,
            delivered: message.delivered,
            seen: message.seen,
            created: message.created.to_rfc3339(),
        }
    }
}

/// An accepted connection from one party's perspective
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FriendView {
    /// Connection id
    pub id: ConnectionId,
    pub friend: UserView,
    pub preview: String,
    pub updated: String,
}

impl FriendView {
    /// `latest_text` and `latest_created` describe the newest message, if any.
    /// `updated` is the later of that message and the connection's own update.
    pub fn new(
        connection: &Connection,
        friend: &User,
        latest_text: Option<&str>,
        latest_created: Option<DateTime<Utc>>,
        urls: &MediaUrls,
    ) -> Self {
        let updated = latest_created.map_or(connection.updated, |created| created.max(connection.updated));
        Self {
            id: connection.id,
            friend: UserView::new(friend, urls),
            preview: latest_text.unwrap_or(NEW_CONNECTION_PREVIEW).to_string(),
            updated: updated.to_rfc3339(),
        }
    }
}

/// A connection request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestView {
    pub id: ConnectionId,
    pub sender: UserView,
    pub receiver: UserView,
    pub created: String,
}

impl RequestView {
    pub fn new(connection: &Connection, sender: &User, receiver: &User, urls: &MediaUrls) -> Self {
        Self {
            id: connection.id,
            sender: UserView::new(sender, urls),
            receiver: UserView::new(receiver, urls),
            created: connection.created.to_rfc3339(),
        }
    }
}

/// A search hit annotated with its relationship to the caller
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchView {
    pub username: String,
    pub name: String,
    pub thumbnail: Option<String>,
    pub status: RelationshipStatus,
}

impl SearchView {
    pub fn new(user: &User, status: RelationshipStatus, urls: &MediaUrls) -> Self {
        let profile = UserView::new(user, urls);
        Self {
            username: profile.username,
            name: profile.name,
            thumbnail: profile.thumbnail,
            status,
        }
    }
}

/// One page of a connection's history, newest first
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<MessageView>,
    /// Index of the following page, `None` when exhausted
    pub next: Option<u32>,
    pub friend: UserView,
    pub connection_id: ConnectionId,
}

/// A single message pushed to one party
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageNotice {
    pub message: MessageView,
    /// The other party from the receiving viewer's perspective
    pub friend: UserView,
    pub connection_id: ConnectionId,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TypingNotice {
    /// Who is typing
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletedNotice {
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
}
