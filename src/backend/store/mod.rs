//! Persistence Layer
//!
//! The [`Store`] trait is the single seam between the engines and the
//! database. Two implementations exist:
//!
//! - **`postgres`** - `PgStore`, backed by a sqlx `PgPool`
//! - **`memory`** - `InMemoryStore`, used when no database is configured and
//!   throughout the tests
//!
//! # Ordering
//!
//! Message history is always returned newest first. Messages created within
//! the same timestamp are ordered by id, highest first, so pagination is
//! stable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::shared::messaging::{
    Connection, ConnectionId, Message, MessageId, MetadataUpdate, NewMessage, NewUser, User,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Persistence failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A row could not be turned into a domain value
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// A uniqueness rule was violated
    #[error("Conflict: {message}")]
    Conflict { message: String },
}

impl StoreError {
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }
}

/// An accepted connection together with what the friend list needs to render it
#[derive(Debug, Clone, PartialEq)]
pub struct FriendRow {
    pub connection: Connection,
    /// The other party
    pub friend: User,
    /// Text of the newest message, if that message has text
    pub latest_text: Option<String>,
    /// Creation time of the newest message
    pub latest_created: Option<DateTime<Utc>>,
}

impl FriendRow {
    /// Sort key for the friend list: the later of the newest message and
    /// the connection's own update time
    pub fn activity(&self) -> DateTime<Utc> {
        let updated = self.connection.updated;
        self.latest_created.map_or(updated, |created| created.max(updated))
    }
}

/// Storage operations used by the engines
///
/// Lookups return `Ok(None)` for missing rows; `Err` is reserved for
/// storage failures. Mutations that target a missing row also return
/// `Ok(None)`.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    // Users

    /// Create a user
    ///
    /// # Returns
    ///
    /// * `Err(StoreError::Conflict)` - the username is taken
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn get_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Case-insensitive prefix match on username, first name or last name,
    /// excluding `exclude`
    async fn search_users(&self, query: &str, exclude: &str) -> Result<Vec<User>, StoreError>;

    /// Replace a user's avatar reference and return the updated user
    async fn set_thumbnail(
        &self,
        username: &str,
        reference: &str,
    ) -> Result<Option<User>, StoreError>;

    // Connections

    async fn get_connection(&self, id: ConnectionId) -> Result<Option<Connection>, StoreError>;

    /// The directed connection `sender -> receiver`, if any
    async fn find_connection(
        &self,
        sender: &str,
        receiver: &str,
    ) -> Result<Option<Connection>, StoreError>;

    /// Fetch the connection between `sender` and `receiver` in either
    /// direction, creating an unaccepted `sender -> receiver` edge if there
    /// is none. Two users never share more than one connection.
    ///
    /// # Returns
    ///
    /// The connection and whether it was created by this call
    async fn get_or_create_connection(
        &self,
        sender: &str,
        receiver: &str,
    ) -> Result<(Connection, bool), StoreError>;

    /// Mark a connection accepted and bump its `updated` time
    async fn accept_connection(&self, id: ConnectionId)
        -> Result<Option<Connection>, StoreError>;

    /// Every connection, accepted or not, in which `username` is a party
    async fn list_connections(&self, username: &str) -> Result<Vec<Connection>, StoreError>;

    /// Unaccepted connections where `receiver` is the requested user, newest first
    async fn list_pending_requests(&self, receiver: &str) -> Result<Vec<Connection>, StoreError>;

    /// Accepted connections of `username`, most recent activity first
    async fn list_friends(&self, username: &str) -> Result<Vec<FriendRow>, StoreError>;

    // Messages

    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError>;

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// Newest-first slice of a connection's history
    async fn list_messages(
        &self,
        connection_id: ConnectionId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, StoreError>;

    async fn count_messages(&self, connection_id: ConnectionId) -> Result<u64, StoreError>;

    async fn mark_seen(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// Delete a message and return what was deleted
    async fn delete_message(&self, id: MessageId) -> Result<Option<Message>, StoreError>;

    /// Whether any message still points at the media file `reference`
    async fn is_media_referenced(&self, reference: &str) -> Result<bool, StoreError>;

    /// Write derived media metadata onto a message
    async fn update_metadata(
        &self,
        id: MessageId,
        update: &MetadataUpdate,
    ) -> Result<Option<Message>, StoreError>;
}
