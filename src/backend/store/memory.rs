//! In-memory Store
//!
//! Keeps every table in a single `RwLock`-guarded struct. Used when
//! `DATABASE_URL` is unset and as the store behind the test suite. Ids are
//! assigned from per-table counters starting at 1.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{FriendRow, Store, StoreError};
use crate::shared::messaging::{
    Connection, ConnectionId, Message, MessageId, MetadataUpdate, NewMessage, NewUser, User,
};

#[derive(Debug, Default)]
struct Tables {
    users: BTreeMap<String, User>,
    connections: BTreeMap<ConnectionId, Connection>,
    messages: BTreeMap<MessageId, Message>,
    next_connection_id: ConnectionId,
    next_message_id: MessageId,
}

impl Tables {
    fn history(&self, connection_id: ConnectionId) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self
            .messages
            .values()
            .filter(|m| m.connection_id == connection_id)
            .collect();
        messages.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        messages
    }
}

/// Store that lives entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.contains_key(&user.username) {
            return Err(StoreError::conflict(format!(
                "username {} is taken",
                user.username
            )));
        }
        let created = User {
            username: user.username,
            first_name: user.first_name,
            last_name: user.last_name,
            thumbnail: None,
            created: Utc::now(),
        };
        tables
            .users
            .insert(created.username.clone(), created.clone());
        Ok(created)
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(username).cloned())
    }

    async fn search_users(&self, query: &str, exclude: &str) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .filter(|u| u.username != exclude && u.matches_prefix(query))
            .cloned()
            .collect())
    }

    async fn set_thumbnail(
        &self,
        username: &str,
        reference: &str,
    ) -> Result<Option<User>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(username).map(|user| {
            user.thumbnail = Some(reference.to_string());
            user.clone()
        }))
    }

    async fn get_connection(&self, id: ConnectionId) -> Result<Option<Connection>, StoreError> {
        Ok(self.tables.read().await.connections.get(&id).cloned())
    }

    async fn find_connection(
        &self,
        sender: &str,
        receiver: &str,
    ) -> Result<Option<Connection>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .connections
            .values()
            .find(|c| c.sender == sender && c.receiver == receiver)
            .cloned())
    }

    async fn get_or_create_connection(
        &self,
        sender: &str,
        receiver: &str,
    ) -> Result<(Connection, bool), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables
            .connections
            .values()
            .find(|c| {
                (c.sender == sender && c.receiver == receiver)
                    || (c.sender == receiver && c.receiver == sender)
            })
        {
            return Ok((existing.clone(), false));
        }
        tables.next_connection_id += 1;
        let now = Utc::now();
        let connection = Connection {
            id: tables.next_connection_id,
            sender: sender.to_string(),
            receiver: receiver.to_string(),
            accepted: false,
            updated: now,
            created: now,
        };
        tables.connections.insert(connection.id, connection.clone());
        Ok((connection, true))
    }

    async fn accept_connection(
        &self,
        id: ConnectionId,
    ) -> Result<Option<Connection>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.connections.get_mut(&id).map(|connection| {
            connection.accepted = true;
            connection.updated = Utc::now();
            connection.clone()
        }))
    }

    async fn list_connections(&self, username: &str) -> Result<Vec<Connection>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .connections
            .values()
            .filter(|c| c.involves(username))
            .cloned()
            .collect())
    }

    async fn list_pending_requests(&self, receiver: &str) -> Result<Vec<Connection>, StoreError> {
        let tables = self.tables.read().await;
        let mut pending: Vec<Connection> = tables
            .connections
            .values()
            .filter(|c| c.receiver == receiver && !c.accepted)
            .cloned()
            .collect();
        pending.sort_by(|a, b| b.created.cmp(&a.created).then(b.id.cmp(&a.id)));
        Ok(pending)
    }

    async fn list_friends(&self, username: &str) -> Result<Vec<FriendRow>, StoreError> {
        let tables = self.tables.read().await;
        let mut rows = Vec::new();
        for connection in tables
            .connections
            .values()
            .filter(|c| c.accepted && c.involves(username))
        {
            let Some(friend) = connection
                .other_party(username)
                .and_then(|other| tables.users.get(other))
            else {
                continue;
            };
            let latest = tables.history(connection.id).into_iter().next();
            rows.push(FriendRow {
                connection: connection.clone(),
                friend: friend.clone(),
                latest_text: latest.and_then(|m| m.text.clone()),
                latest_created: latest.map(|m| m.created),
            });
        }
        rows.sort_by(|a, b| {
            b.activity()
                .cmp(&a.activity())
                .then(b.connection.id.cmp(&a.connection.id))
        });
        Ok(rows)
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let mut tables = self.tables.write().await;
        tables.next_message_id += 1;
        let created = Message {
            id: tables.next_message_id,
            connection_id: message.connection_id,
            user: message.user,
            text: message.text,
            media: message.media,
            delivered: message.delivered,
            seen: false,
            created: Utc::now(),
        };
        tables.messages.insert(created.id, created.clone());
        Ok(created)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.tables.read().await.messages.get(&id).cloned())
    }

    async fn list_messages(
        &self,
        connection_id: ConnectionId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .history(connection_id)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_messages(&self, connection_id: ConnectionId) -> Result<u64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .values()
            .filter(|m| m.connection_id == connection_id)
            .count() as u64)
    }

    async fn mark_seen(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.messages.get_mut(&id).map(|message| {
            message.seen = true;
            message.clone()
        }))
    }

    async fn delete_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        Ok(self.tables.write().await.messages.remove(&id))
    }

    async fn is_media_referenced(&self, reference: &str) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .values()
            .any(|m| m.media.references().contains(&reference)))
    }

    async fn update_metadata(
        &self,
        id: MessageId,
        update: &MetadataUpdate,
    ) -> Result<Option<Message>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.messages.get_mut(&id).map(|message| {
            update.apply(&mut message.media);
            message.clone()
        }))
    }
}
