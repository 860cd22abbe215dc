//! PostgreSQL Store
//!
//! `PgStore` runs runtime-checked `sqlx::query` statements against a
//! `PgPool`. The schema lives in `migrations/` and is applied by
//! [`PgStore::connect`].

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use super::{FriendRow, Store, StoreError};
use crate::shared::messaging::{
    Connection, ConnectionId, Message, MessageId, MessageMedia, MetadataUpdate, NewMessage,
    NewUser, User,
};

const USER_COLUMNS: &str = "username, first_name, last_name, thumbnail, created";

const CONNECTION_COLUMNS: &str = "id, sender, receiver, accepted, updated, created";

const MESSAGE_COLUMNS: &str = "id, connection_id, author, text, image, voice, waveform, video, \
     video_thumbnail, video_duration, delivered, seen, created";

/// Store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and bring the schema up to date
    ///
    /// # Arguments
    ///
    /// * `database_url` - A `postgres://` connection string
    ///
    /// # Returns
    ///
    /// A ready store, or the connection or migration failure
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        sqlx::migrate!().run(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// The connection between two users in either direction
    async fn find_pair(&self, a: &str, b: &str) -> Result<Option<Connection>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE (sender = $1 AND receiver = $2) OR (sender = $2 AND receiver = $1)
            ORDER BY id
            LIMIT 1
            "#
        ))
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(connection_from_row).transpose()
    }
}

fn user_from_row(row: &PgRow) -> Result<User, StoreError> {
    Ok(User {
        username: row.try_get("username")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        thumbnail: row.try_get("thumbnail")?,
        created: row.try_get("created")?,
    })
}

fn connection_from_row(row: &PgRow) -> Result<Connection, StoreError> {
    Ok(Connection {
        id: row.try_get("id")?,
        sender: row.try_get("sender")?,
        receiver: row.try_get("receiver")?,
        accepted: row.try_get("accepted")?,
        updated: row.try_get("updated")?,
        created: row.try_get("created")?,
    })
}

fn message_from_row(row: &PgRow) -> Result<Message, StoreError> {
    let video_duration = row
        .try_get::<Option<i32>, _>("video_duration")?
        .map(u32::try_from)
        .transpose()
        .map_err(|_| StoreError::decode("negative video_duration"))?;

    Ok(Message {
        id: row.try_get("id")?,
        connection_id: row.try_get("connection_id")?,
        user: row.try_get("author")?,
        text: row.try_get("text")?,
        media: MessageMedia {
            image: row.try_get("image")?,
            voice: row.try_get("voice")?,
            waveform: row.try_get("waveform")?,
            video: row.try_get("video")?,
            video_thumbnail: row.try_get("video_thumbnail")?,
            video_duration,
        },
        delivered: row.try_get("delivered")?,
        seen: row.try_get("seen")?,
        created: row.try_get("created")?,
    })
}

/// Escape LIKE wildcards so user input only ever matches literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn duration_param(duration: Option<u32>) -> Result<Option<i32>, StoreError> {
    duration
        .map(i32::try_from)
        .transpose()
        .map_err(|_| StoreError::decode("video_duration out of range"))
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let result = sqlx::query(&format!(
            "INSERT INTO users (username, first_name, last_name) VALUES ($1, $2, $3) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.username)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => user_from_row(&row),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(
                StoreError::conflict(format!("username {} is taken", user.username)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn search_users(&self, query: &str, exclude: &str) -> Result<Vec<User>, StoreError> {
        let pattern = format!("{}%", escape_like(&query.to_lowercase()));
        let rows = sqlx::query(&format!(
            r#"
            SELECT {USER_COLUMNS}
            FROM users
            WHERE username <> $2
              AND (LOWER(username) LIKE $1
                   OR LOWER(first_name) LIKE $1
                   OR LOWER(last_name) LIKE $1)
            ORDER BY username
            "#
        ))
        .bind(pattern)
        .bind(exclude)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn set_thumbnail(
        &self,
        username: &str,
        reference: &str,
    ) -> Result<Option<User>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE users SET thumbnail = $2 WHERE username = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(username)
        .bind(reference)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_connection(&self, id: ConnectionId) -> Result<Option<Connection>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(connection_from_row).transpose()
    }

    async fn find_connection(
        &self,
        sender: &str,
        receiver: &str,
    ) -> Result<Option<Connection>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE sender = $1 AND receiver = $2"
        ))
        .bind(sender)
        .bind(receiver)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(connection_from_row).transpose()
    }

    async fn get_or_create_connection(
        &self,
        sender: &str,
        receiver: &str,
    ) -> Result<(Connection, bool), StoreError> {
        if let Some(existing) = self.find_pair(sender, receiver).await? {
            return Ok((existing, false));
        }

        let inserted = sqlx::query(&format!(
            r#"
            INSERT INTO connections (sender, receiver)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            RETURNING {CONNECTION_COLUMNS}
            "#
        ))
        .bind(sender)
        .bind(receiver)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok((connection_from_row(&row)?, true));
        }

        // Lost the race to a concurrent request in either direction
        let existing = self
            .find_pair(sender, receiver)
            .await?
            .ok_or_else(|| StoreError::conflict("connection vanished after insert conflict"))?;
        Ok((existing, false))
    }

    async fn accept_connection(
        &self,
        id: ConnectionId,
    ) -> Result<Option<Connection>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE connections SET accepted = TRUE, updated = NOW() WHERE id = $1 \
             RETURNING {CONNECTION_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(connection_from_row).transpose()
    }

    async fn list_connections(&self, username: &str) -> Result<Vec<Connection>, StoreError> {
        let rows = sqlx::query(&format!(
            "SELECT {CONNECTION_COLUMNS} FROM connections WHERE sender = $1 OR receiver = $1"
        ))
        .bind(username)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(connection_from_row).collect()
    }

    async fn list_pending_requests(&self, receiver: &str) -> Result<Vec<Connection>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CONNECTION_COLUMNS}
            FROM connections
            WHERE receiver = $1 AND NOT accepted
            ORDER BY created DESC, id DESC
            "#
        ))
        .bind(receiver)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(connection_from_row).collect()
    }

    async fn list_friends(&self, username: &str) -> Result<Vec<FriendRow>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.sender, c.receiver, c.accepted, c.updated, c.created,
                   u.username, u.first_name, u.last_name, u.thumbnail,
                   u.created AS user_created,
                   latest.text AS latest_text,
                   latest.created AS latest_created
            FROM connections c
            JOIN users u
              ON u.username = CASE WHEN c.sender = $1 THEN c.receiver ELSE c.sender END
            LEFT JOIN LATERAL (
                SELECT m.text, m.created
                FROM messages m
                WHERE m.connection_id = c.id
                ORDER BY m.created DESC, m.id DESC
                LIMIT 1
            ) latest ON TRUE
            WHERE c.accepted AND (c.sender = $1 OR c.receiver = $1)
            ORDER BY GREATEST(latest.created, c.updated) DESC, c.id DESC
            "#,
        )
        .bind(username)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<FriendRow, StoreError> {
                Ok(FriendRow {
                    connection: connection_from_row(row)?,
                    friend: User {
                        username: row.try_get("username")?,
                        first_name: row.try_get("first_name")?,
                        last_name: row.try_get("last_name")?,
                        thumbnail: row.try_get("thumbnail")?,
                        created: row.try_get("user_created")?,
                    },
                    latest_text: row.try_get("latest_text")?,
                    latest_created: row.try_get("latest_created")?,
                })
            })
            .collect()
    }

    async fn create_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        let media = &message.media;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO messages
                (connection_id, author, text, image, voice, waveform, video,
                 video_thumbnail, video_duration, delivered)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(message.connection_id)
        .bind(&message.user)
        .bind(&message.text)
        .bind(&media.image)
        .bind(&media.voice)
        .bind(&media.waveform)
        .bind(&media.video)
        .bind(&media.video_thumbnail)
        .bind(duration_param(media.video_duration)?)
        .bind(message.delivered)
        .fetch_one(&self.pool)
        .await?;
        message_from_row(&row)
    }

    async fn get_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn list_messages(
        &self,
        connection_id: ConnectionId,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
            FROM messages
            WHERE connection_id = $1
            ORDER BY created DESC, id DESC
            OFFSET $2 LIMIT $3
            "#
        ))
        .bind(connection_id)
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(message_from_row).collect()
    }

    async fn count_messages(&self, connection_id: ConnectionId) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE connection_id = $1")
            .bind(connection_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn mark_seen(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE messages SET seen = TRUE WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn delete_message(&self, id: MessageId) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query(&format!(
            "DELETE FROM messages WHERE id = $1 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }

    async fn is_media_referenced(&self, reference: &str) -> Result<bool, StoreError> {
        let referenced: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM messages
                WHERE image = $1 OR voice = $1 OR video = $1 OR video_thumbnail = $1
            )
            "#,
        )
        .bind(reference)
        .fetch_one(&self.pool)
        .await?;
        Ok(referenced)
    }

    async fn update_metadata(
        &self,
        id: MessageId,
        update: &MetadataUpdate,
    ) -> Result<Option<Message>, StoreError> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE messages
            SET waveform = COALESCE($2, waveform),
                video_duration = COALESCE($3, video_duration),
                video_thumbnail = COALESCE($4, video_thumbnail)
            WHERE id = $1
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&update.waveform)
        .bind(duration_param(update.video_duration)?)
        .bind(&update.video_thumbnail)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(message_from_row).transpose()
    }
}
