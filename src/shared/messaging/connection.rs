//! Connection (Friendship Edge) Data Structure
//!
//! A connection is created directed (sender requests receiver) and becomes
//! bidirectional once the receiver accepts it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned connection identifier
pub type ConnectionId = i64;

/// A friendship edge between two users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    /// Username of the requester
    pub sender: String,
    /// Username of the requested user
    pub receiver: String,
    /// Set once by the receiver; never reverts
    pub accepted: bool,
    pub updated: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

impl Connection {
    /// Whether `username` is one of the two parties
    pub fn involves(&self, username: &str) -> bool {
        self.sender == username || self.receiver == username
    }

    /// The party that is not `username`, or `None` if `username` is not a party
    pub fn other_party(&self, username: &str) -> Option<&str> {
        if self.sender == username {
            Some(&self.receiver)
        } else if self.receiver == username {
            Some(&self.sender)
        } else {
            None
        }
    }

    /// Both parties, sender first
    pub fn parties(&self) -> [&str; 2] {
        [&self.sender, &self.receiver]
    }
}

/// Relationship between the searching user and a search result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RelationshipStatus {
    /// Caller has an outstanding request to them
    PendingThem,
    /// They have an outstanding request to the caller
    PendingMe,
    /// An accepted connection exists in either direction
    Connected,
    NoConnection,
}

impl RelationshipStatus {
    /// Combine the three existence checks; earlier checks take precedence
    pub fn classify(pending_them: bool, pending_me: bool, connected: bool) -> Self {
        if pending_them {
            Self::PendingThem
        } else if pending_me {
            Self::PendingMe
        } else if connected {
            Self::Connected
        } else {
            Self::NoConnection
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingThem => "pending-them",
            Self::PendingMe => "pending-me",
            Self::Connected => "connected",
            Self::NoConnection => "no-connection",
        }
    }
}
