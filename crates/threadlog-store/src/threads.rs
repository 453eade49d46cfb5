//! CRUD operations for [`ThreadRecord`] rows and their head pointer.

use rusqlite::params;

use threadlog_shared::types::{Hash, PeerId, ThreadId, ThreadKind};

use crate::database::{column, not_found, parse_date, Database};
use crate::error::{Result, StoreError};
use crate::models::ThreadRecord;

const THREAD_COLUMNS: &str =
    "id, key, name, secret, sym_key, schema, initiator, kind, head, created_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new thread.
    pub fn add_thread(&self, thread: &ThreadRecord) -> Result<()> {
        self.conn().execute(
            "INSERT INTO threads (id, key, name, secret, sym_key, schema, initiator, kind, head, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                thread.id.to_hex(),
                thread.key,
                thread.name,
                hex::encode(thread.secret),
                hex::encode(thread.sym_key),
                thread.schema.map(|h| h.to_hex()),
                thread.initiator.to_hex(),
                thread.kind.as_str(),
                thread.head.map(|h| h.to_hex()),
                thread.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single thread by id.
    pub fn get_thread(&self, id: &ThreadId) -> Result<ThreadRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {THREAD_COLUMNS} FROM threads WHERE id = ?1"),
                params![id.to_hex()],
                row_to_thread,
            )
            .map_err(not_found)
    }

    /// List all threads, oldest first.
    pub fn list_threads(&self) -> Result<Vec<ThreadRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {THREAD_COLUMNS} FROM threads ORDER BY created_at ASC, rowid ASC"
        ))?;
        let rows = stmt.query_map([], row_to_thread)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    // ------------------------------------------------------------------
    // Head
    // ------------------------------------------------------------------

    /// Current head of a thread, `None` if it has no blocks yet.
    pub fn get_head(&self, id: &ThreadId) -> Result<Option<Hash>> {
        let head: Option<String> = self
            .conn()
            .query_row(
                "SELECT head FROM threads WHERE id = ?1",
                params![id.to_hex()],
                |row| row.get(0),
            )
            .map_err(not_found)?;
        Ok(column(0, head.map(|h| Hash::from_hex(&h)).transpose())?)
    }

    /// Point a thread's head at `hash`.
    pub fn set_head(&self, id: &ThreadId, hash: &Hash) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE threads SET head = ?1 WHERE id = ?2",
            params![hash.to_hex(), id.to_hex()],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    // ON DELETE CASCADE: block records and roster go with it
    pub fn delete_thread(&self, id: &ThreadId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM threads WHERE id = ?1", params![id.to_hex()])?;
        Ok(affected > 0)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn decode_key(idx: usize, s: &str) -> rusqlite::Result<[u8; 32]> {
    let bytes = column(idx, hex::decode(s))?;
    column(
        idx,
        <[u8; 32]>::try_from(bytes.as_slice()).map_err(|_| hex::FromHexError::InvalidStringLength),
    )
}

/// Map a `rusqlite::Row` to a [`ThreadRecord`].
fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadRecord> {
    let id: String = row.get(0)?;
    let key: String = row.get(1)?;
    let name: String = row.get(2)?;
    let secret: String = row.get(3)?;
    let sym_key: String = row.get(4)?;
    let schema: Option<String> = row.get(5)?;
    let initiator: String = row.get(6)?;
    let kind: String = row.get(7)?;
    let head: Option<String> = row.get(8)?;
    let created: String = row.get(9)?;

    let kind = ThreadKind::from_name(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            rusqlite::types::Type::Text,
            format!("unknown thread kind: {kind}").into(),
        )
    })?;

    Ok(ThreadRecord {
        id: column(0, ThreadId::from_hex(&id))?,
        key,
        name,
        secret: decode_key(3, &secret)?,
        sym_key: decode_key(4, &sym_key)?,
        schema: column(5, schema.map(|s| Hash::from_hex(&s)).transpose())?,
        initiator: column(6, PeerId::from_hex(&initiator))?,
        kind,
        head: column(8, head.map(|s| Hash::from_hex(&s)).transpose())?,
        created_at: parse_date(9, &created)?,
    })
}

#[cfg(test)]
mod tests {
    use crate::database::test_support::{open_temp, sample_thread};
    use crate::error::StoreError;

    use threadlog_shared::types::Hash;

    #[test]
    fn test_add_get_list() {
        let (db, _dir) = open_temp();
        let thread = sample_thread("photos");

        db.add_thread(&thread).unwrap();
        assert_eq!(db.get_thread(&thread.id).unwrap(), thread);
        assert_eq!(db.list_threads().unwrap(), vec![thread]);
    }

    #[test]
    fn test_head_roundtrip() {
        let (db, _dir) = open_temp();
        let thread = sample_thread("photos");
        db.add_thread(&thread).unwrap();

        assert_eq!(db.get_head(&thread.id).unwrap(), None);

        let hash = Hash::of(b"block");
        db.set_head(&thread.id, &hash).unwrap();
        assert_eq!(db.get_head(&thread.id).unwrap(), Some(hash));
    }

    #[test]
    fn test_unknown_thread() {
        let (db, _dir) = open_temp();
        let thread = sample_thread("ghost");

        assert!(matches!(db.get_thread(&thread.id), Err(StoreError::NotFound)));
        assert!(matches!(db.get_head(&thread.id), Err(StoreError::NotFound)));
        assert!(matches!(
            db.set_head(&thread.id, &Hash::of(b"x")),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn test_delete() {
        let (db, _dir) = open_temp();
        let thread = sample_thread("photos");
        db.add_thread(&thread).unwrap();

        assert!(db.delete_thread(&thread.id).unwrap());
        assert!(!db.delete_thread(&thread.id).unwrap());
        assert!(db.list_threads().unwrap().is_empty());
    }
}
