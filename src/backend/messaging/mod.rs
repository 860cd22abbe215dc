//! Messaging Module
//!
//! The two engines behind the command router:
//!
//! - **`friends`** - `FriendshipEngine`: friend list, connection requests and
//!   user search with relationship status
//! - **`messages`** - `MessagingEngine`: history pages, send, seen, delete,
//!   forward, typing and avatar replacement, plus the `message.updated`
//!   metadata hook
//!
//! Engines never touch sockets. Every operation returns the dispatches it
//! produced and the router hands them to the registry.

pub mod friends;
pub mod messages;

pub use friends::FriendshipEngine;
pub use messages::{BroadcastMetadataHook, MessagingEngine, PAGE_SIZE};

use crate::backend::error::BackendError;
use crate::backend::store::Store;
use crate::shared::messaging::{Connection, ConnectionId, User};

/// Fetch a user or fail with `NotFound`
pub(crate) async fn require_user(store: &dyn Store, username: &str) -> Result<User, BackendError> {
    store
        .get_user(username)
        .await?
        .ok_or_else(|| BackendError::not_found(format!("user {}", username)))
}

/// Fetch a connection the caller is a party of
///
/// # Returns
///
/// * `Err(NotFound)` - no such connection
/// * `Err(Unauthorized)` - `caller` is not one of its two parties
pub(crate) async fn party_connection(
    store: &dyn Store,
    caller: &str,
    id: ConnectionId,
) -> Result<Connection, BackendError> {
    let connection = store
        .get_connection(id)
        .await?
        .ok_or_else(|| BackendError::not_found(format!("connection {}", id)))?;
    if !connection.involves(caller) {
        return Err(BackendError::unauthorized(format!(
            "{} is not a party of connection {}",
            caller, id
        )));
    }
    Ok(connection)
}

/// Both users of a connection, sender first
pub(crate) async fn load_parties(
    store: &dyn Store,
    connection: &Connection,
) -> Result<(User, User), BackendError> {
    let sender = require_user(store, &connection.sender).await?;
    let receiver = require_user(store, &connection.receiver).await?;
    Ok((sender, receiver))
}
