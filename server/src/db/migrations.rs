use rusqlite_migration::{Migrations, M};

/// Define all schema migrations.
/// Uses SQLite user_version pragma for tracking — no migration table needed.
pub fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        M::up(
            "-- Migration 1: Users

CREATE TABLE users (
    id TEXT PRIMARY KEY,
    username TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE UNIQUE INDEX idx_users_username ON users(username);
",
        ),
        M::up(
            "-- Migration 2: Direct messages

CREATE TABLE messages (
    id TEXT PRIMARY KEY,
    sender_id TEXT NOT NULL,
    receiver_id TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at TEXT NOT NULL,
    delivered INTEGER NOT NULL DEFAULT 0,
    delivered_at TEXT,
    is_read INTEGER NOT NULL DEFAULT 0,
    read_at TEXT,
    FOREIGN KEY (sender_id) REFERENCES users(id),
    FOREIGN KEY (receiver_id) REFERENCES users(id)
);

-- Message ids are UUIDv7 (time-ordered), so the id column doubles as the
-- pagination cursor for per-pair history queries.
CREATE INDEX idx_messages_sender_receiver ON messages(sender_id, receiver_id, id);
CREATE INDEX idx_messages_receiver_sender ON messages(receiver_id, sender_id, id);
",
        ),
        M::up(
            "-- Migration 3: Video call records

CREATE TABLE calls (
    id TEXT PRIMARY KEY,
    caller_id TEXT NOT NULL,
    callee_id TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'connecting',
    started_at TEXT NOT NULL,
    ended_at TEXT,
    duration_secs INTEGER,
    FOREIGN KEY (caller_id) REFERENCES users(id),
    FOREIGN KEY (callee_id) REFERENCES users(id)
);

CREATE INDEX idx_calls_caller ON calls(caller_id);
CREATE INDEX idx_calls_callee ON calls(callee_id);
",
        ),
    ])
}
