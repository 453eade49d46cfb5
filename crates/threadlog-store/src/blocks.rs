//! Block index records.

use rusqlite::params;

use threadlog_shared::block::BlockType;
use threadlog_shared::types::{Hash, PeerId, ThreadId};

use crate::database::{column, not_found, parse_date, Database};
use crate::error::{Result, StoreError};
use crate::models::BlockRecord;

const BLOCK_COLUMNS: &str = "hash, thread_id, kind, parent, author, date";

impl Database {
    /// Index a block.  Returns `false` if the hash was already indexed, in
    /// which case the existing record is left untouched.
    pub fn record_block(&self, record: &BlockRecord) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO blocks (hash, thread_id, kind, parent, author, date)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                record.hash.to_hex(),
                record.thread_id.to_hex(),
                record.kind.as_byte(),
                record.parent.map(|h| h.to_hex()),
                record.author.to_hex(),
                record.date.to_rfc3339(),
            ],
        )?;
        Ok(affected > 0)
    }

    pub fn get_block(&self, hash: &Hash) -> Result<BlockRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {BLOCK_COLUMNS} FROM blocks WHERE hash = ?1"),
                params![hash.to_hex()],
                row_to_block,
            )
            .map_err(not_found)
    }

    pub fn has_block(&self, hash: &Hash) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM blocks WHERE hash = ?1",
            params![hash.to_hex()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Blocks of a thread in the order they were indexed, optionally
    /// restricted to one type.
    pub fn list_blocks(&self, thread_id: &ThreadId, kind: Option<BlockType>) -> Result<Vec<BlockRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks
             WHERE thread_id = ?1 AND (?2 IS NULL OR kind = ?2)
             ORDER BY rowid ASC"
        ))?;
        let rows = stmt.query_map(
            params![thread_id.to_hex(), kind.map(|k| k.as_byte())],
            row_to_block,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_blocks(&self, thread_id: &ThreadId) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM blocks WHERE thread_id = ?1",
            params![thread_id.to_hex()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Indexed blocks of a thread whose parent is `parent` (`None` for
    /// blocks without one), newest first.
    pub fn list_children(&self, thread_id: &ThreadId, parent: Option<&Hash>) -> Result<Vec<BlockRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {BLOCK_COLUMNS} FROM blocks
             WHERE thread_id = ?1 AND parent IS ?2
             ORDER BY date DESC, rowid DESC"
        ))?;
        let rows = stmt.query_map(
            params![thread_id.to_hex(), parent.map(|h| h.to_hex())],
            row_to_block,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_block(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockRecord> {
    let hash: String = row.get(0)?;
    let thread_id: String = row.get(1)?;
    let kind: u8 = row.get(2)?;
    let parent: Option<String> = row.get(3)?;
    let author: String = row.get(4)?;
    let date: String = row.get(5)?;

    let kind = BlockType::from_byte(kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Integer,
            format!("unknown block type: {kind}").into(),
        )
    })?;

    Ok(BlockRecord {
        hash: column(0, Hash::from_hex(&hash))?,
        thread_id: column(1, ThreadId::from_hex(&thread_id))?,
        kind,
        parent: column(3, parent.map(|p| Hash::from_hex(&p)).transpose())?,
        author: column(4, PeerId::from_hex(&author))?,
        date: parse_date(5, &date)?,
    })
}
