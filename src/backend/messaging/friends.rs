/**
 * Friendship & Request Engine
 *
 * Connection lifecycle and the views built on it:
 *
 * ```text
 * request.connect(A -> B)      creates  A -> B, accepted = false
 * request.accept(by B, of A)   sets     accepted = true, bumps updated
 * ```
 *
 * Accepting is one-way. Accepting an edge that is already accepted runs the
 * same transition again and re-sends the same notices.
 *
 * # Relationship Status
 *
 * Search results carry the caller's relationship to each hit, from three
 * existence checks evaluated in order: caller's pending request to them,
 * their pending request to the caller, an accepted edge in either direction.
 */

use std::sync::Arc;

use tracing::{debug, info};

use super::{load_parties, require_user};
use crate::backend::auth::Identity;
use crate::backend::error::BackendError;
use crate::backend::realtime::Dispatch;
use crate::backend::store::Store;
use crate::shared::event::ServerEvent;
use crate::shared::messaging::{
    Connection, FriendView, MediaUrls, RelationshipStatus, RequestView, SearchView,
};

pub struct FriendshipEngine {
    store: Arc<dyn Store>,
    urls: MediaUrls,
}

impl FriendshipEngine {
    pub fn new(store: Arc<dyn Store>, urls: MediaUrls) -> Self {
        Self { store, urls }
    }

    /// Accepted connections of the caller, most recent activity first
    pub async fn friend_list(&self, caller: &Identity) -> Result<Vec<Dispatch>, BackendError> {
        let rows = self.store.list_friends(&caller.username).await?;
        let friends = rows
            .iter()
            .map(|row| {
                FriendView::new(
                    &row.connection,
                    &row.friend,
                    row.latest_text.as_deref(),
                    row.latest_created,
                    &self.urls,
                )
            })
            .collect();
        Ok(vec![Dispatch::to(
            &caller.username,
            ServerEvent::FriendList(friends),
        )])
    }

    /// Ask `target` to connect with the caller
    ///
    /// Get-or-create: repeating the request returns the existing edge. Both
    /// parties are notified either way.
    pub async fn request_connect(
        &self,
        caller: &Identity,
        target: &str,
    ) -> Result<Vec<Dispatch>, BackendError> {
        if target == caller.username {
            return Err(BackendError::malformed("cannot connect to yourself"));
        }
        require_user(self.store.as_ref(), target).await?;

        let (connection, created) = self
            .store
            .get_or_create_connection(&caller.username, target)
            .await?;
        if created {
            info!(
                "[Friends] {} requested to connect with {} (connection {})",
                caller.username, target, connection.id
            );
        } else {
            debug!("[Friends] Connection {} already exists", connection.id);
        }

        let view = self.request_view(&connection).await?;
        Ok(connection
            .parties()
            .into_iter()
            .map(|party| Dispatch::to(party, ServerEvent::RequestConnect(view.clone())))
            .collect())
    }

    /// Accept the request `requester` sent to the caller
    ///
    /// Both parties get the `request.accept` notice and a `friend.new` entry
    /// built from their own point of view.
    pub async fn request_accept(
        &self,
        caller: &Identity,
        requester: &str,
    ) -> Result<Vec<Dispatch>, BackendError> {
        let pending = self
            .store
            .find_connection(requester, &caller.username)
            .await?
            .ok_or_else(|| {
                BackendError::not_found(format!("request from {} to {}", requester, caller.username))
            })?;
        let connection = self
            .store
            .accept_connection(pending.id)
            .await?
            .ok_or_else(|| BackendError::not_found(format!("connection {}", pending.id)))?;
        info!(
            "[Friends] {} accepted {} (connection {})",
            caller.username, requester, connection.id
        );

        let (sender, receiver) = load_parties(self.store.as_ref(), &connection).await?;
        let request = RequestView::new(&connection, &sender, &receiver, &self.urls);

        let mut dispatches = Vec::with_capacity(4);
        for party in connection.parties() {
            dispatches.push(Dispatch::to(
                party,
                ServerEvent::RequestAccept(request.clone()),
            ));
        }
        // Each side's new friend is the other side
        dispatches.push(Dispatch::to(
            &sender.username,
            ServerEvent::FriendNew(FriendView::new(&connection, &receiver, None, None, &self.urls)),
        ));
        dispatches.push(Dispatch::to(
            &receiver.username,
            ServerEvent::FriendNew(FriendView::new(&connection, &sender, None, None, &self.urls)),
        ));
        Ok(dispatches)
    }

    /// Unaccepted requests addressed to the caller
    pub async fn request_list(&self, caller: &Identity) -> Result<Vec<Dispatch>, BackendError> {
        let pending = self.store.list_pending_requests(&caller.username).await?;
        let mut views = Vec::with_capacity(pending.len());
        for connection in &pending {
            views.push(self.request_view(connection).await?);
        }
        Ok(vec![Dispatch::to(
            &caller.username,
            ServerEvent::RequestList(views),
        )])
    }

    /// Prefix search over other users, annotated with relationship status
    pub async fn search(
        &self,
        caller: &Identity,
        query: &str,
    ) -> Result<Vec<Dispatch>, BackendError> {
        let hits = self.store.search_users(query, &caller.username).await?;
        let connections = self.store.list_connections(&caller.username).await?;

        let results = hits
            .iter()
            .map(|user| {
                let status = relationship(&connections, &caller.username, &user.username);
                SearchView::new(user, status, &self.urls)
            })
            .collect();
        Ok(vec![Dispatch::to(
            &caller.username,
            ServerEvent::Search(results),
        )])
    }

    async fn request_view(&self, connection: &Connection) -> Result<RequestView, BackendError> {
        let (sender, receiver) = load_parties(self.store.as_ref(), connection).await?;
        Ok(RequestView::new(connection, &sender, &receiver, &self.urls))
    }
}

/// Classify `other` relative to `me` from `me`'s connections
fn relationship(connections: &[Connection], me: &str, other: &str) -> RelationshipStatus {
    let pending_them = connections
        .iter()
        .any(|c| c.sender == me && c.receiver == other && !c.accepted);
    let pending_me = connections
        .iter()
        .any(|c| c.sender == other && c.receiver == me && !c.accepted);
    let connected = connections
        .iter()
        .any(|c| c.accepted && c.involves(me) && c.involves(other));
    RelationshipStatus::classify(pending_them, pending_me, connected)
}
