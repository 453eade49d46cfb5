//! Cafe session rows.  Each session is an inbox other peers can leave
//! blocks in while this node is offline.

use chrono::Utc;
use rusqlite::params;

use crate::database::{parse_date, Database};
use crate::error::{Result, StoreError};
use crate::models::CafeSession;

impl Database {
    /// Record a session with `cafe_id`, refreshing it if it already exists.
    pub fn add_cafe_session(&self, cafe_id: &str) -> Result<CafeSession> {
        let session = CafeSession {
            cafe_id: cafe_id.to_string(),
            created_at: Utc::now(),
        };
        self.conn().execute(
            "INSERT INTO cafe_sessions (cafe_id, created_at) VALUES (?1, ?2)
             ON CONFLICT (cafe_id) DO UPDATE SET created_at = excluded.created_at",
            params![session.cafe_id, session.created_at.to_rfc3339()],
        )?;
        Ok(session)
    }

    /// All sessions, oldest first.
    pub fn list_cafe_sessions(&self) -> Result<Vec<CafeSession>> {
        let mut stmt = self
            .conn()
            .prepare("SELECT cafe_id, created_at FROM cafe_sessions ORDER BY created_at ASC, rowid ASC")?;
        let rows = stmt.query_map([], |row| {
            let cafe_id: String = row.get(0)?;
            let created: String = row.get(1)?;
            Ok(CafeSession {
                cafe_id,
                created_at: parse_date(1, &created)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_cafe_session(&self, cafe_id: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM cafe_sessions WHERE cafe_id = ?1", params![cafe_id])?;
        Ok(affected > 0)
    }
}
