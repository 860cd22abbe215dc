//! Messaging Module
//!
//! This module contains the data structures for the messaging system:
//!
//! - `User` - An account, addressed by its username
//! - `Connection` - A friendship edge between two users
//! - `Message` - A message sent over a connection
//! - Views (`UserView`, `MessageView`, ...) - per-viewer payloads pushed to clients
//!
//! # Usage
//!
//! ```rust
//! use chatline::shared::messaging::{Connection, Message, User};
//! ```

pub mod connection;
pub mod message;
pub mod user;
pub mod view;

pub use connection::{Connection, ConnectionId, RelationshipStatus};
pub use message::{Message, MessageId, MessageMedia, MetadataUpdate, NewMessage};
pub use user::{NewUser, User};
pub use view::{
    DeletedNotice, FriendView, MediaUrls, MessageNotice, MessagePage, MessageView, RequestView,
    SearchView, TypingNotice, UserView,
};
