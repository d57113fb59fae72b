//! User lookup and creation.
//!
//! The realtime core treats users as externally owned identities: it only
//! ever asks "does this user exist" and never mutates identity records.

use chrono::Utc;
use thiserror::Error;
use uuid::Uuid;

use crate::db::models::User;
use crate::db::DbPool;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("username is already taken")]
    UsernameTaken,
    #[error("username is invalid")]
    InvalidUsername,
    #[error("database error")]
    Db,
}

/// Create a user with a fresh UUID. Usernames are unique.
pub async fn create_user(db: DbPool, username: String) -> Result<User, UserError> {
    let username = username.trim().to_string();
    if username.is_empty() || username.len() > 32 {
        return Err(UserError::InvalidUsername);
    }

    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| UserError::Db)?;
        let user = User {
            id: Uuid::new_v4().to_string(),
            username,
            created_at: Utc::now().to_rfc3339(),
        };

        match conn.execute(
            "INSERT INTO users (id, username, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![user.id, user.username, user.created_at],
        ) {
            Ok(_) => Ok(user),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(UserError::UsernameTaken)
            }
            Err(_) => Err(UserError::Db),
        }
    })
    .await
    .map_err(|_| UserError::Db)?
}

/// Existence check for the delivery pipeline's receiver validation.
/// Goes to the users table, not the connection registry — a receiver
/// need not be online to get a message.
pub async fn user_exists(db: DbPool, user_id: String) -> Result<bool, UserError> {
    tokio::task::spawn_blocking(move || {
        let conn = db.lock().map_err(|_| UserError::Db)?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE id = ?1",
                rusqlite::params![user_id],
                |row| row.get(0),
            )
            .map_err(|_| UserError::Db)?;
        Ok(count > 0)
    })
    .await
    .map_err(|_| UserError::Db)?
}
