/**
 * Messaging Engine
 *
 * Message history and every mutation of a message.
 *
 * # Pagination
 *
 * Page `p` is the slice `[p * 15, (p + 1) * 15)` of the connection's history
 * ordered newest first (ties broken by id). `next` is `p + 1` while more
 * messages remain beyond the slice.
 *
 * # Per-viewer Notices
 *
 * A message event is built once per party: `is_me` is true only in the
 * author's copy and `friend` always names the other party.
 *
 * # Attachments
 *
 * Files are stored before the row is created and removed again if the
 * insert fails. Derived metadata is produced afterwards in the background;
 * when it lands, [`BroadcastMetadataHook`] pushes `message.updated` to both
 * parties.
 */

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{load_parties, party_connection, require_user};
use crate::backend::auth::Identity;
use crate::backend::error::BackendError;
use crate::backend::media::{MediaPipeline, MetadataHook};
use crate::backend::realtime::{Dispatch, GroupRegistry};
use crate::backend::store::Store;
use crate::shared::event::{
    MessageDeleteRequest, MessageForwardRequest, MessageListRequest, MessageSendRequest,
    ServerEvent, ThumbnailRequest,
};
use crate::shared::messaging::{
    Connection, DeletedNotice, Message, MessageId, MediaUrls, MessageNotice, MessagePage,
    MessageView, NewMessage, TypingNotice, UserView,
};

/// Messages per history page
pub const PAGE_SIZE: u32 = 15;

/// `next` page index for page `page` of a history holding `total` messages
pub fn next_page(page: u32, total: u64) -> Option<u32> {
    let end = (u64::from(page) + 1) * u64::from(PAGE_SIZE);
    if end < total {
        page.checked_add(1)
    } else {
        None
    }
}

/// One message event per party, each from that party's point of view
async fn message_notices(
    store: &dyn Store,
    urls: &MediaUrls,
    connection: &Connection,
    message: &Message,
    wrap: fn(MessageNotice) -> ServerEvent,
) -> Result<Vec<Dispatch>, BackendError> {
    let (sender, receiver) = load_parties(store, connection).await?;
    Ok([(&sender, &receiver), (&receiver, &sender)]
        .into_iter()
        .map(|(viewer, friend)| {
            Dispatch::to(
                &viewer.username,
                wrap(MessageNotice {
                    message: MessageView::new(message, &viewer.username, urls),
                    friend: UserView::new(friend, urls),
                    connection_id: connection.id,
                }),
            )
        })
        .collect())
}

pub struct MessagingEngine {
    store: Arc<dyn Store>,
    media: MediaPipeline,
    urls: MediaUrls,
}

impl MessagingEngine {
    pub fn new(store: Arc<dyn Store>, media: MediaPipeline, urls: MediaUrls) -> Self {
        Self { store, media, urls }
    }

    /// One page of history for a connection the caller belongs to
    pub async fn message_list(
        &self,
        caller: &Identity,
        request: &MessageListRequest,
    ) -> Result<Vec<Dispatch>, BackendError> {
        let store = self.store.as_ref();
        let connection = party_connection(store, &caller.username, request.connection_id).await?;
        let friend_name = connection
            .other_party(&caller.username)
            .unwrap_or(&caller.username)
            .to_string();
        let friend = require_user(store, &friend_name).await?;

        let offset = u64::from(request.page) * u64::from(PAGE_SIZE);
        let messages = store
            .list_messages(connection.id, offset, u64::from(PAGE_SIZE))
            .await?;
        let total = store.count_messages(connection.id).await?;

        let page = MessagePage {
            messages: messages
                .iter()
                .map(|m| MessageView::new(m, &caller.username, &self.urls))
                .collect(),
            next: next_page(request.page, total),
            friend: UserView::new(&friend, &self.urls),
            connection_id: connection.id,
        };
        Ok(vec![Dispatch::to(
            &caller.username,
            ServerEvent::MessageList(page),
        )])
    }

    /// Create a message with optional text and attachments
    pub async fn message_send(
        &self,
        caller: &Identity,
        request: &MessageSendRequest,
    ) -> Result<Vec<Dispatch>, BackendError> {
        let store = self.store.as_ref();
        let connection = party_connection(store, &caller.username, request.connection_id).await?;

        let attachments = request.attachments();
        let text = request.text.clone();
        // Text is kept as sent; only a bare message must say something
        let blank = text.as_deref().map_or(true, |t| t.trim().is_empty());
        if blank && attachments.is_empty() {
            return Err(BackendError::malformed("message has no text and no attachments"));
        }

        let stored = self
            .media
            .store_attachments(connection.id, &attachments)
            .await?;
        let new_message =
            NewMessage::text(connection.id, &caller.username, text).with_media(stored.media.clone());
        let message = match store.create_message(new_message).await {
            Ok(message) => message,
            Err(e) => {
                self.media.discard(&stored).await;
                return Err(e.into());
            }
        };
        info!(
            "[Messages] {} sent message {} on connection {}",
            caller.username, message.id, connection.id
        );

        let notices =
            message_notices(store, &self.urls, &connection, &message, ServerEvent::MessageSend).await?;
        self.media.spawn_metadata(&message);
        Ok(notices)
    }

    /// Typing indicator addressed to `target`; nothing is stored
    pub fn message_type(&self, caller: &Identity, target: &str) -> Vec<Dispatch> {
        vec![Dispatch::to(
            target,
            ServerEvent::MessageType(TypingNotice {
                username: caller.username.clone(),
            }),
        )]
    }

    /// Mark a message seen; only the recipient may do this
    pub async fn message_seen(
        &self,
        caller: &Identity,
        message_id: MessageId,
    ) -> Result<Vec<Dispatch>, BackendError> {
        let store = self.store.as_ref();
        let message = store
            .get_message(message_id)
            .await?
            .ok_or_else(|| BackendError::not_found(format!("message {}", message_id)))?;
        let connection = party_connection(store, &caller.username, message.connection_id).await?;
        if !message.can_mark_seen(&caller.username) {
            return Err(BackendError::unauthorized(format!(
                "{} authored message {}",
                caller.username, message_id
            )));
        }

        let message = store
            .mark_seen(message_id)
            .await?
            .ok_or_else(|| BackendError::not_found(format!("message {}", message_id)))?;
        Ok(connection
            .parties()
            .into_iter()
            .map(|party| {
                Dispatch::to(
                    party,
                    ServerEvent::MessageSeen(MessageView::new(&message, party, &self.urls)),
                )
            })
            .collect())
    }

    /// Delete a message the caller authored, with its attachments
    pub async fn message_delete(
        &self,
        caller: &Identity,
        request: &MessageDeleteRequest,
    ) -> Result<Vec<Dispatch>, BackendError> {
        let store = self.store.as_ref();
        let message = store
            .get_message(request.message_id)
            .await?
            .filter(|m| m.connection_id == request.connection_id)
            .ok_or_else(|| {
                BackendError::not_found(format!(
                    "message {} in connection {}",
                    request.message_id, request.connection_id
                ))
            })?;
        let connection = party_connection(store, &caller.username, message.connection_id).await?;
        if !message.is_author(&caller.username) {
            return Err(BackendError::unauthorized(format!(
                "{} did not author message {}",
                caller.username, message.id
            )));
        }

        let deleted = store
            .delete_message(message.id)
            .await?
            .ok_or_else(|| BackendError::not_found(format!("message {}", message.id)))?;
        self.media.release_media(&deleted).await;
        info!(
            "[Messages] {} deleted message {} on connection {}",
            caller.username, deleted.id, connection.id
        );

        Ok(connection
            .parties()
            .into_iter()
            .map(|party| {
                Dispatch::to(
                    party,
                    ServerEvent::MessageDeleted(DeletedNotice {
                        message_id: deleted.id,
                    }),
                )
            })
            .collect())
    }

    /// Copy messages from one of the caller's connections into another
    ///
    /// Ids that do not exist in the source connection are skipped. Copies
    /// are authored by the caller and share the source's media references,
    /// including derived metadata when it has already landed.
    pub async fn message_forward(
        &self,
        caller: &Identity,
        request: &MessageForwardRequest,
    ) -> Result<Vec<Dispatch>, BackendError> {
        let store = self.store.as_ref();
        let target =
            party_connection(store, &caller.username, request.to_connection_id).await?;
        party_connection(store, &caller.username, request.from_connection_id).await?;

        let mut dispatches = Vec::new();
        for id in &request.message_ids {
            let sharing = self.media.share_references().await;
            let Some(source) = store
                .get_message(*id)
                .await?
                .filter(|m| m.connection_id == request.from_connection_id)
            else {
                debug!(
                    "[Messages] Skipping forward of message {} (not in connection {})",
                    id, request.from_connection_id
                );
                continue;
            };

            let copy = store
                .create_message(NewMessage::forwarded(&source, target.id, &caller.username))
                .await?;
            drop(sharing);
            dispatches.extend(
                message_notices(store, &self.urls, &target, &copy, ServerEvent::MessageSend).await?,
            );
            // Copies taken before the source's metadata landed derive their own
            self.media.spawn_metadata(&copy);
        }
        info!(
            "[Messages] {} forwarded {} message(s) into connection {}",
            caller.username,
            dispatches.len() / 2,
            target.id
        );
        Ok(dispatches)
    }

    /// Replace the caller's avatar
    pub async fn thumbnail(
        &self,
        caller: &Identity,
        request: &ThumbnailRequest,
    ) -> Result<Vec<Dispatch>, BackendError> {
        let store = self.store.as_ref();
        let previous = require_user(store, &caller.username).await?.thumbnail;

        let reference = self
            .media
            .store_avatar(&caller.username, &request.base64, &request.filename)
            .await?;
        let user = store
            .set_thumbnail(&caller.username, &reference)
            .await?
            .ok_or_else(|| BackendError::not_found(format!("user {}", caller.username)))?;

        if let Some(previous) = previous.filter(|old| *old != reference) {
            self.media.delete_reference(&previous).await;
        }
        Ok(vec![Dispatch::to(
            &caller.username,
            ServerEvent::Thumbnail(UserView::new(&user, &self.urls)),
        )])
    }
}

/// Pushes `message.updated` to both parties once derived metadata lands
pub struct BroadcastMetadataHook {
    store: Arc<dyn Store>,
    registry: Arc<GroupRegistry>,
    urls: MediaUrls,
}

impl BroadcastMetadataHook {
    pub fn new(store: Arc<dyn Store>, registry: Arc<GroupRegistry>, urls: MediaUrls) -> Self {
        Self {
            store,
            registry,
            urls,
        }
    }
}

#[async_trait]
impl MetadataHook for BroadcastMetadataHook {
    async fn metadata_ready(&self, message: &Message) {
        let store = self.store.as_ref();
        let connection = match store.get_connection(message.connection_id).await {
            Ok(Some(connection)) => connection,
            Ok(None) => return,
            Err(e) => {
                warn!("[Messages] Could not load connection {}: {}", message.connection_id, e);
                return;
            }
        };
        match message_notices(store, &self.urls, &connection, message, ServerEvent::MessageUpdated).await {
            Ok(dispatches) => {
                self.registry.deliver(dispatches).await;
            }
            Err(e) => warn!("[Messages] Could not publish update for message {}: {}", message.id, e),
        }
    }
}
