//! Call record persistence.
//!
//! The external system of record for call history. The in-memory active call
//! registry holds only live calls; this store keeps every record, including
//! ended ones.

use crate::db::models::CallRecord;
use crate::db::{DbPool, StoreError};

const SELECT_COLUMNS: &str = "id, caller_id, callee_id, status, started_at, ended_at, duration_secs";

#[derive(Clone)]
pub struct CallStore {
    db: DbPool,
}

impl CallStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    /// Insert a freshly matched call (status 'connecting').
    pub async fn create(&self, record: CallRecord) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            conn.execute(
                "INSERT INTO calls (id, caller_id, callee_id, status, started_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    record.id,
                    record.caller_id,
                    record.callee_id,
                    record.status,
                    record.started_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(|_| StoreError::Join)?
    }

    /// Mirror the connecting -> connected transition.
    pub async fn mark_connected(&self, call_id: String) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let affected = conn.execute(
                "UPDATE calls SET status = 'connected' WHERE id = ?1 AND status = 'connecting'",
                rusqlite::params![call_id],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            Ok(())
        })
        .await
        .map_err(|_| StoreError::Join)?
    }

    /// Finalize a call: status 'ended', end time, duration. Returns the full
    /// record for the caller's response.
    pub async fn finish(
        &self,
        call_id: String,
        ended_at: String,
        duration_secs: i64,
    ) -> Result<CallRecord, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            let affected = conn.execute(
                "UPDATE calls SET status = 'ended', ended_at = ?2, duration_secs = ?3 WHERE id = ?1",
                rusqlite::params![call_id, ended_at, duration_secs],
            )?;
            if affected == 0 {
                return Err(StoreError::NotFound);
            }
            find_in_conn(&conn, &call_id)?.ok_or(StoreError::NotFound)
        })
        .await
        .map_err(|_| StoreError::Join)?
    }

    pub async fn find(&self, call_id: String) -> Result<Option<CallRecord>, StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock().map_err(|_| StoreError::Lock)?;
            find_in_conn(&conn, &call_id)
        })
        .await
        .map_err(|_| StoreError::Join)?
    }
}

fn find_in_conn(
    conn: &rusqlite::Connection,
    call_id: &str,
) -> Result<Option<CallRecord>, StoreError> {
    let result = conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM calls WHERE id = ?1"),
        rusqlite::params![call_id],
        |row| {
            Ok(CallRecord {
                id: row.get(0)?,
                caller_id: row.get(1)?,
                callee_id: row.get(2)?,
                status: row.get(3)?,
                started_at: row.get(4)?,
                ended_at: row.get(5)?,
                duration_secs: row.get(6)?,
            })
        },
    );
    match result {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(StoreError::Db(e)),
    }
}
