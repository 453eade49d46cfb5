//! Thread roster rows.

use chrono::Utc;
use rusqlite::params;

use threadlog_shared::types::{PeerId, ThreadId};

use crate::database::{column, not_found, Database};
use crate::error::{Result, StoreError};
use crate::models::ThreadPeer;

impl Database {
    /// Insert a peer if it is not on the roster yet.  An existing entry,
    /// including its username and inboxes, is kept as is.
    pub fn add_thread_peer(&self, peer: &ThreadPeer) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO thread_peers (id, thread_id, username, inboxes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                peer.id.to_hex(),
                peer.thread_id.to_hex(),
                peer.username,
                serde_json::to_string(&peer.inboxes)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    /// Insert or overwrite a roster entry in a single statement.
    pub fn upsert_thread_peer(&self, peer: &ThreadPeer) -> Result<()> {
        self.conn().execute(
            "INSERT INTO thread_peers (id, thread_id, username, inboxes, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (id, thread_id) DO UPDATE SET
                 username = excluded.username,
                 inboxes = excluded.inboxes,
                 updated_at = excluded.updated_at",
            params![
                peer.id.to_hex(),
                peer.thread_id.to_hex(),
                peer.username,
                serde_json::to_string(&peer.inboxes)?,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn get_thread_peer(&self, thread_id: &ThreadId, id: &PeerId) -> Result<ThreadPeer> {
        self.conn()
            .query_row(
                "SELECT id, thread_id, username, inboxes FROM thread_peers
                 WHERE thread_id = ?1 AND id = ?2",
                params![thread_id.to_hex(), id.to_hex()],
                row_to_peer,
            )
            .map_err(not_found)
    }

    /// Roster of a thread, ordered by peer id.
    pub fn list_thread_peers(&self, thread_id: &ThreadId) -> Result<Vec<ThreadPeer>> {
        let mut stmt = self.conn().prepare(
            "SELECT id, thread_id, username, inboxes FROM thread_peers
             WHERE thread_id = ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![thread_id.to_hex()], row_to_peer)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn delete_thread_peer(&self, thread_id: &ThreadId, id: &PeerId) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM thread_peers WHERE thread_id = ?1 AND id = ?2",
            params![thread_id.to_hex(), id.to_hex()],
        )?;
        Ok(affected > 0)
    }

    /// Drop the whole roster of a thread.  Returns the number of rows removed.
    pub fn clear_thread_peers(&self, thread_id: &ThreadId) -> Result<usize> {
        Ok(self.conn().execute(
            "DELETE FROM thread_peers WHERE thread_id = ?1",
            params![thread_id.to_hex()],
        )?)
    }
}

fn row_to_peer(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadPeer> {
    let id: String = row.get(0)?;
    let thread_id: String = row.get(1)?;
    let username: Option<String> = row.get(2)?;
    let inboxes: String = row.get(3)?;

    Ok(ThreadPeer {
        id: column(0, PeerId::from_hex(&id))?,
        thread_id: column(1, ThreadId::from_hex(&thread_id))?,
        username,
        inboxes: column(3, serde_json::from_str(&inboxes))?,
    })
}
