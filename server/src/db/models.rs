/// Database row types for all tables.
/// These correspond 1:1 to the SQLite schema defined in migrations.rs.
use serde::Serialize;

/// User record in the users table
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub created_at: String,
}

/// Chat message record. Immutable once delivered except for the
/// delivered/read acknowledgement flags.
///
/// Invariant: delivered_at is never earlier than created_at, and read_at
/// never earlier than delivered_at (mark_read backfills delivered_at).
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub receiver_id: String,
    pub content: String,
    pub created_at: String,
    pub delivered: bool,
    pub delivered_at: Option<String>,
    pub read: bool,
    pub read_at: Option<String>,
}

impl ChatMessage {
    /// Map a full row from the messages table, in schema column order.
    pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            sender_id: row.get(1)?,
            receiver_id: row.get(2)?,
            content: row.get(3)?,
            created_at: row.get(4)?,
            delivered: row.get::<_, i64>(5)? != 0,
            delivered_at: row.get(6)?,
            read: row.get::<_, i64>(7)? != 0,
            read_at: row.get(8)?,
        })
    }
}

/// Persisted video call record. The in-memory active call registry mirrors
/// rows with status 'connecting' or 'connected'; ended calls live only here.
#[derive(Debug, Clone, Serialize)]
pub struct CallRecord {
    pub id: String,
    /// The match initiator (first element of the matched pair).
    pub caller_id: String,
    pub callee_id: String,
    pub status: String,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub duration_secs: Option<i64>,
}
