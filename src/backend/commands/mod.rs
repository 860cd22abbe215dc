//! Command Router
//!
//! Turns one decoded client event into the dispatches it produces. The match
//! over [`ClientEvent`] is exhaustive, so adding an inbound kind without a
//! handler does not compile.
//!
//! Handler failures never reach the socket. `NotFound` and `Unauthorized`
//! are logged at debug level and everything else at warn; in both cases the
//! command produces no dispatches.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::auth::Identity;
use crate::backend::error::BackendError;
use crate::backend::messaging::{FriendshipEngine, MessagingEngine};
use crate::backend::realtime::Dispatch;
use crate::shared::event::ClientEvent;

#[derive(Clone)]
pub struct CommandRouter {
    friends: Arc<FriendshipEngine>,
    messages: Arc<MessagingEngine>,
}

impl CommandRouter {
    pub fn new(friends: Arc<FriendshipEngine>, messages: Arc<MessagingEngine>) -> Self {
        Self { friends, messages }
    }

    /// Run `event` on behalf of `caller`
    ///
    /// # Returns
    ///
    /// Dispatches to publish, empty when the command was rejected
    pub async fn route(&self, caller: &Identity, event: ClientEvent) -> Vec<Dispatch> {
        let kind = event.kind();
        match self.handle(caller, event).await {
            Ok(dispatches) => {
                debug!(
                    "[Router] {} from {} produced {} dispatch(es)",
                    kind,
                    caller.username,
                    dispatches.len()
                );
                dispatches
            }
            Err(e) if e.is_silent() => {
                debug!("[Router] Dropped {} from {}: {}", kind, caller.username, e);
                Vec::new()
            }
            Err(e) => {
                warn!("[Router] {} from {} failed: {}", kind, caller.username, e);
                Vec::new()
            }
        }
    }

    async fn handle(
        &self,
        caller: &Identity,
        event: ClientEvent,
    ) -> Result<Vec<Dispatch>, BackendError> {
        match event {
            ClientEvent::FriendList => self.friends.friend_list(caller).await,
            ClientEvent::MessageList(request) => self.messages.message_list(caller, &request).await,
            ClientEvent::MessageSend(request) => self.messages.message_send(caller, &request).await,
            ClientEvent::MessageType(request) => {
                Ok(self.messages.message_type(caller, &request.username))
            }
            ClientEvent::MessageSeen(request) => {
                self.messages.message_seen(caller, request.message_id).await
            }
            ClientEvent::MessageDelete(request) => {
                self.messages.message_delete(caller, &request).await
            }
            ClientEvent::MessageForward(request) => {
                self.messages.message_forward(caller, &request).await
            }
            ClientEvent::RequestConnect(request) => {
                self.friends.request_connect(caller, &request.username).await
            }
            ClientEvent::RequestAccept(request) => {
                self.friends.request_accept(caller, &request.username).await
            }
            ClientEvent::RequestList => self.friends.request_list(caller).await,
            ClientEvent::Search(request) => self.friends.search(caller, &request.query).await,
            ClientEvent::Thumbnail(request) => self.messages.thumbnail(caller, &request).await,
        }
    }
}
