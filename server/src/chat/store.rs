//! Message store gateway.
//!
//! Owns the `messages` table. The delivery pipeline reads and writes message
//! rows exclusively through this gateway and never keeps its own copy beyond
//! a single operation. rusqlite is synchronous, so every call hops through
//! spawn_blocking with the shared connection.

use chrono::Utc;
use uuid::Uuid;

use crate::db::models::ChatMessage;
use crate::db::{DbPool, StoreError};

const SELECT_COLUMNS: &str =
    "id, sender_id, receiver_id, content, created_at, delivered, delivered_at, is_read, read_at";

#[derive(Clone)]
pub struct ChatStore {
    db: DbPool,
}

/// One page of history between a user pair, newest first.
#[derive(Debug)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub has_more: bool,
}

impl ChatStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Persist a new message with delivered=false, read=false.
    /// Ids are UUIDv7, so per-pair creation order matches id order.
    pub async fn create(
        &self,
        sender_id: String,
        receiver_id: String,
        content: String,
    ) -> Result<ChatMessage, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let message = ChatMessage {
                id: Uuid::now_v7().to_string(),
                sender_id,
                receiver_id,
                content,
                created_at: Utc::now().to_rfc3339(),
                delivered: false,
                delivered_at: None,
                read: false,
                read_at: None,
            };
            conn.execute(
                "INSERT INTO messages (id, sender_id, receiver_id, content, created_at, delivered, is_read)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, 0)",
                rusqlite::params![
                    message.id,
                    message.sender_id,
                    message.receiver_id,
                    message.content,
                    message.created_at,
                ],
            )?;
            Ok(message)
        })
        .await
        .map_err(|_| StoreError::Join)?
    }

    pub async fn find(&self, message_id: String) -> Result<Option<ChatMessage>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            find_in_conn(&conn, &message_id)
        })
        .await
        .map_err(|_| StoreError::Join)?
    }

    /// Set delivered=true. Idempotent: a repeat call refreshes the timestamp
    /// but not the logical state, and a message already marked read keeps its
    /// original delivered_at so read_at never precedes it.
    pub async fn mark_delivered(&self, message_id: String) -> Result<ChatMessage, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let now = Utc::now().to_rfc3339();
            let affected = conn.execute(
                "UPDATE messages
                 SET delivered = 1,
                     delivered_at = CASE WHEN is_read = 1 THEN COALESCE(delivered_at, read_at) ELSE ?2 END
                 WHERE id = ?1",
                rusqlite::params![message_id, now],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            find_in_conn(&conn, &message_id)?.ok_or(StoreError::NotFound)
        })
        .await
        .map_err(|_| StoreError::Join)?
    }

    /// Set read=true. Read implies delivered: a message never explicitly
    /// acknowledged as delivered gets delivered_at backfilled to the read time.
    pub async fn mark_read(&self, message_id: String) -> Result<ChatMessage, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let now = Utc::now().to_rfc3339();
            let affected = conn.execute(
                "UPDATE messages
                 SET is_read = 1,
                     read_at = ?2,
                     delivered = 1,
                     delivered_at = COALESCE(delivered_at, ?2)
                 WHERE id = ?1",
                rusqlite::params![message_id, now],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            find_in_conn(&conn, &message_id)?.ok_or(StoreError::NotFound)
        })
        .await
        .map_err(|_| StoreError::Join)?
    }

    /// Permanently remove a message. Returns the deleted row so the caller
    /// can notify both participants.
    pub async fn delete(&self, message_id: String) -> Result<ChatMessage, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let message = find_in_conn(&conn, &message_id)?.ok_or(StoreError::NotFound)?;
            conn.execute(
                "DELETE FROM messages WHERE id = ?1",
                rusqlite::params![message_id],
            )?;
            Ok(message)
        })
        .await
        .map_err(|_| StoreError::Join)?
    }

    /// Keyset-paginated history between a pair, newest first. `before` is an
    /// exclusive cursor: only messages strictly older than that id are
    /// returned. Fetches limit+1 rows to compute has_more.
    pub async fn history(
        &self,
        user_a: String,
        user_b: String,
        limit: u32,
        before: Option<String>,
    ) -> Result<HistoryPage, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {SELECT_COLUMNS} FROM messages
                 WHERE ((sender_id = ?1 AND receiver_id = ?2)
                     OR (sender_id = ?2 AND receiver_id = ?1))
                   AND (?3 IS NULL OR id < ?3)
                 ORDER BY id DESC
                 LIMIT ?4"
            ))?;
            let mut messages: Vec<ChatMessage> = stmt
                .query_map(
                    rusqlite::params![user_a, user_b, before, i64::from(limit) + 1],
                    ChatMessage::from_row,
                )?
                .collect::<Result<_, _>>()?;

            let has_more = messages.len() > limit as usize;
            messages.truncate(limit as usize);
            Ok(HistoryPage { messages, has_more })
        })
        .await
        .map_err(|_| StoreError::Join)?
    }
}

fn find_in_conn(
    conn: &rusqlite::Connection,
    message_id: &str,
) -> Result<Option<ChatMessage>, StoreError> {
    let result = conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM messages WHERE id = ?1"),
        rusqlite::params![message_id],
        ChatMessage::from_row,
    );
    match result {
        Ok(message) => Ok(Some(message)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Db(e)),
    }
}
