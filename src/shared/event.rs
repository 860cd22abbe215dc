/**
 * Real-time Event Protocol
 *
 * This module defines the frames exchanged over the persistent socket.
 *
 * # Inbound
 *
 * Clients send flat JSON objects whose `source` key names the event kind and
 * whose remaining keys carry the payload:
 *
 * ```json
 * {"source": "message.send", "connectionId": 4, "message": "hi"}
 * ```
 *
 * Inbound kinds form the closed enum [`ClientEvent`]. Unknown kinds are
 * rejected at the decode boundary with [`DecodeError::UnknownKind`] so the
 * command router only ever sees well-formed variants.
 *
 * # Outbound
 *
 * The server pushes `{"source": <kind>, "data": <payload>}` envelopes,
 * modelled by [`ServerEvent`].
 */
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::error::SharedError;
use crate::shared::messaging::{
    ConnectionId, DeletedNotice, FriendView, MessageId, MessageNotice, MessagePage, MessageView,
    RequestView, SearchView, TypingNotice, UserView,
};

/// Every event kind that can appear in a `source` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FriendList,
    FriendNew,
    MessageList,
    MessageSend,
    MessageType,
    MessageSeen,
    MessageDelete,
    MessageDeleted,
    MessageForward,
    MessageUpdated,
    RequestConnect,
    RequestAccept,
    RequestList,
    Search,
    Thumbnail,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FriendList => "friend.list",
            EventKind::FriendNew => "friend.new",
            EventKind::MessageList => "message.list",
            EventKind::MessageSend => "message.send",
            EventKind::MessageType => "message.type",
            EventKind::MessageSeen => "message.seen",
            EventKind::MessageDelete => "message.delete",
            EventKind::MessageDeleted => "message.deleted",
            EventKind::MessageForward => "message.forward",
            EventKind::MessageUpdated => "message.updated",
            EventKind::RequestConnect => "request.connect",
            EventKind::RequestAccept => "request.accept",
            EventKind::RequestList => "request.list",
            EventKind::Search => "search",
            EventKind::Thumbnail => "thumbnail",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "friend.list" => Some(EventKind::FriendList),
            "friend.new" => Some(EventKind::FriendNew),
            "message.list" => Some(EventKind::MessageList),
            "message.send" => Some(EventKind::MessageSend),
            "message.type" => Some(EventKind::MessageType),
            "message.seen" => Some(EventKind::MessageSeen),
            "message.delete" => Some(EventKind::MessageDelete),
            "message.deleted" => Some(EventKind::MessageDeleted),
            "message.forward" => Some(EventKind::MessageForward),
            "message.updated" => Some(EventKind::MessageUpdated),
            "request.connect" => Some(EventKind::RequestConnect),
            "request.accept" => Some(EventKind::RequestAccept),
            "request.list" => Some(EventKind::RequestList),
            "search" => Some(EventKind::Search),
            "thumbnail" => Some(EventKind::Thumbnail),
            _ => None,
        }
    }

    /// Whether clients may send this kind
    pub fn is_inbound(&self) -> bool {
        !matches!(
            self,
            EventKind::FriendNew | EventKind::MessageDeleted | EventKind::MessageUpdated
        )
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an inbound frame was dropped
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Json(serde_json::Error),

    #[error("frame has no string `source` field")]
    MissingSource,

    #[error("unknown event kind `{0}`")]
    UnknownKind(String),

    #[error("invalid payload for `{kind}`: {source}")]
    Payload {
        kind: EventKind,
        #[source]
        source: serde_json::Error,
    },
}

/// Kind of an inbound media attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    Image,
    Voice,
    Video,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "image",
            AttachmentKind::Voice => "voice",
            AttachmentKind::Video => "video",
        }
    }
}

/// An attachment exactly as received: base64 text, optionally data-URI prefixed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAttachment {
    pub kind: AttachmentKind,
    pub data: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageListRequest {
    #[serde(rename = "connectionId")]
    pub connection_id: ConnectionId,
    #[serde(default)]
    pub page: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct MessageSendRequest {
    #[serde(rename = "connectionId")]
    pub connection_id: ConnectionId,
    #[serde(rename = "message", default)]
    pub text: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub image_filename: Option<String>,
    #[serde(default)]
    pub voice: Option<String>,
    #[serde(default)]
    pub voice_filename: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
    #[serde(default)]
    pub video_filename: Option<String>,
}

impl MessageSendRequest {
    /// Attachments that carry both data and a filename, tagged with their kind
    pub fn attachments(&self) -> Vec<EncodedAttachment> {
        let fields = [
            (AttachmentKind::Image, &self.image, &self.image_filename),
            (AttachmentKind::Voice, &self.voice, &self.voice_filename),
            (AttachmentKind::Video, &self.video, &self.video_filename),
        ];
        fields
            .into_iter()
            .filter_map(|(kind, data, filename)| match (data, filename) {
                (Some(data), Some(filename)) if !data.is_empty() && !filename.is_empty() => {
                    Some(EncodedAttachment {
                        kind,
                        data: data.clone(),
                        filename: filename.clone(),
                    })
                }
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsernameRequest {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageSeenRequest {
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageDeleteRequest {
    #[serde(rename = "connectionId")]
    pub connection_id: ConnectionId,
    #[serde(rename = "messageId")]
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MessageForwardRequest {
    #[serde(rename = "fromConnectionId")]
    pub from_connection_id: ConnectionId,
    #[serde(rename = "toConnectionId")]
    pub to_connection_id: ConnectionId,
    #[serde(rename = "messageIds", default)]
    pub message_ids: Vec<MessageId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ThumbnailRequest {
    pub base64: String,
    pub filename: String,
}

/// Every event a client may send
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "source")]
pub enum ClientEvent {
    #[serde(rename = "friend.list")]
    FriendList,
    #[serde(rename = "message.list")]
    MessageList(MessageListRequest),
    #[serde(rename = "message.send")]
    MessageSend(MessageSendRequest),
    /// Typing indicator; `username` is the recipient
    #[serde(rename = "message.type")]
    MessageType(UsernameRequest),
    #[serde(rename = "message.seen")]
    MessageSeen(MessageSeenRequest),
    #[serde(rename = "message.delete")]
    MessageDelete(MessageDeleteRequest),
    #[serde(rename = "message.forward")]
    MessageForward(MessageForwardRequest),
    /// `username` is the user being asked to connect
    #[serde(rename = "request.connect")]
    RequestConnect(UsernameRequest),
    /// `username` is the requester whose request is accepted
    #[serde(rename = "request.accept")]
    RequestAccept(UsernameRequest),
    #[serde(rename = "request.list")]
    RequestList,
    #[serde(rename = "search")]
    Search(SearchRequest),
    #[serde(rename = "thumbnail")]
    Thumbnail(ThumbnailRequest),
}

impl ClientEvent {
    /// Decode one inbound text frame
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
        let source = value
            .get("source")
            .and_then(serde_json::Value::as_str)
            .ok_or(DecodeError::MissingSource)?;
        let kind = match EventKind::from_str(source) {
            Some(kind) if kind.is_inbound() => kind,
            _ => return Err(DecodeError::UnknownKind(source.to_string())),
        };
        serde_json::from_value(value).map_err(|source| DecodeError::Payload { kind, source })
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ClientEvent::FriendList => EventKind::FriendList,
            ClientEvent::MessageList(_) => EventKind::MessageList,
            ClientEvent::MessageSend(_) => EventKind::MessageSend,
            ClientEvent::MessageType(_) => EventKind::MessageType,
            ClientEvent::MessageSeen(_) => EventKind::MessageSeen,
            ClientEvent::MessageDelete(_) => EventKind::MessageDelete,
            ClientEvent::MessageForward(_) => EventKind::MessageForward,
            ClientEvent::RequestConnect(_) => EventKind::RequestConnect,
            ClientEvent::RequestAccept(_) => EventKind::RequestAccept,
            ClientEvent::RequestList => EventKind::RequestList,
            ClientEvent::Search(_) => EventKind::Search,
            ClientEvent::Thumbnail(_) => EventKind::Thumbnail,
        }
    }
}

/// Every event the server pushes, serialized as `{source, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "friend.list")]
    FriendList(Vec<FriendView>),
    #[serde(rename = "friend.new")]
    FriendNew(FriendView),
    #[serde(rename = "message.list")]
    MessageList(MessagePage),
    #[serde(rename = "message.send")]
    MessageSend(MessageNotice),
    /// Derived metadata arrived for a message already delivered
    #[serde(rename = "message.updated")]
    MessageUpdated(MessageNotice),
    #[serde(rename = "message.type")]
    MessageType(TypingNotice),
    #[serde(rename = "message.seen")]
    MessageSeen(MessageView),
    #[serde(rename = "message.deleted")]
    MessageDeleted(DeletedNotice),
    #[serde(rename = "request.connect")]
    RequestConnect(RequestView),
    #[serde(rename = "request.accept")]
    RequestAccept(RequestView),
    #[serde(rename = "request.list")]
    RequestList(Vec<RequestView>),
    #[serde(rename = "search")]
    Search(Vec<SearchView>),
    #[serde(rename = "thumbnail")]
    Thumbnail(UserView),
}

impl ServerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::FriendList(_) => EventKind::FriendList,
            ServerEvent::FriendNew(_) => EventKind::FriendNew,
            ServerEvent::MessageList(_) => EventKind::MessageList,
            ServerEvent::MessageSend(_) => EventKind::MessageSend,
            ServerEvent::MessageUpdated(_) => EventKind::MessageUpdated,
            ServerEvent::MessageType(_) => EventKind::MessageType,
            ServerEvent::MessageSeen(_) => EventKind::MessageSeen,
            ServerEvent::MessageDeleted(_) => EventKind::MessageDeleted,
            ServerEvent::RequestConnect(_) => EventKind::RequestConnect,
            ServerEvent::RequestAccept(_) => EventKind::RequestAccept,
            ServerEvent::RequestList(_) => EventKind::RequestList,
            ServerEvent::Search(_) => EventKind::Search,
            ServerEvent::Thumbnail(_) => EventKind::Thumbnail,
        }
    }

    /// Serialize to the text frame written on the socket
    pub fn to_json(&self) -> Result<String, SharedError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_decode_unit_variant_ignores_extra_keys() {
        let event = ClientEvent::decode(r#"{"source":"friend.list","extra":1}"#).unwrap();
        assert_eq!(event, ClientEvent::FriendList);
    }

    #[test]
    fn test_decode_message_list_defaults_page() {
        let event = ClientEvent::decode(r#"{"source":"message.list","connectionId":3}"#).unwrap();
        assert_eq!(
            event,
            ClientEvent::MessageList(MessageListRequest {
                connection_id: 3,
                page: 0
            })
        );
    }

    #[test]
    fn test_decode_forward() {
        let event = ClientEvent::decode(
            r#"{"source":"message.forward","fromConnectionId":1,"toConnectionId":2,"messageIds":[4,5]}"#,
        )
        .unwrap();
        assert_matches!(event, ClientEvent::MessageForward(req) if req.message_ids == vec![4, 5]);
    }

    #[test]
    fn test_decode_unknown_kind() {
        let err = ClientEvent::decode(r#"{"source":"call.start"}"#).unwrap_err();
        assert_matches!(err, DecodeError::UnknownKind(kind) if kind == "call.start");
    }

    #[test]
    fn test_decode_rejects_outbound_only_kind() {
        let err = ClientEvent::decode(r#"{"source":"friend.new"}"#).unwrap_err();
        assert_matches!(err, DecodeError::UnknownKind(_));
    }

    #[test]
    fn test_decode_malformed() {
        assert_matches!(ClientEvent::decode("not json"), Err(DecodeError::Json(_)));
        assert_matches!(ClientEvent::decode(r#"{"data":1}"#), Err(DecodeError::MissingSource));
        assert_matches!(
            ClientEvent::decode(r#"{"source":"message.seen","messageId":"abc"}"#),
            Err(DecodeError::Payload { kind: EventKind::MessageSeen, .. })
        );
    }

    #[test]
    fn test_send_request_attachments_require_filename() {
        let event = ClientEvent::decode(
            r#"{"source":"message.send","connectionId":1,"message":"hi","image":"aGk=","voice":"aGk=","voice_filename":"v.m4a"}"#,
        )
        .unwrap();
        let ClientEvent::MessageSend(req) = event else {
            panic!("expected message.send");
        };
        assert_eq!(req.text.as_deref(), Some("hi"));
        let attachments = req.attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].kind, AttachmentKind::Voice);
        assert_eq!(attachments[0].filename, "v.m4a");
    }

    #[test]
    fn test_server_event_envelope_shape() {
        let event = ServerEvent::MessageType(TypingNotice {
            username: "alice".to_string(),
        });
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"source": "message.type", "data": {"username": "alice"}})
        );
        assert_eq!(event.kind(), EventKind::MessageType);
    }

    #[test]
    fn test_kind_round_trip_names() {
        for kind in [
            EventKind::FriendList,
            EventKind::MessageDeleted,
            EventKind::Search,
            EventKind::Thumbnail,
        ] {
            assert_eq!(EventKind::from_str(kind.as_str()), Some(kind));
        }
    }
}
