//! Bookkeeping for redeemed external invites.

use chrono::Utc;
use rusqlite::params;

use threadlog_shared::types::Hash;

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Claim an invite for redemption.  Returns `false` if it was already
    /// claimed, so concurrent redeemers race on a single insert.
    pub fn claim_invite(&self, id: &Hash) -> Result<bool> {
        let affected = self.conn().execute(
            "INSERT OR IGNORE INTO consumed_invites (id, consumed_at) VALUES (?1, ?2)",
            params![id.to_hex(), Utc::now().to_rfc3339()],
        )?;
        Ok(affected > 0)
    }

    /// Give a claim back after a redemption that failed before committing.
    pub fn release_invite(&self, id: &Hash) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM consumed_invites WHERE id = ?1", params![id.to_hex()])?;
        Ok(affected > 0)
    }

    pub fn is_invite_consumed(&self, id: &Hash) -> Result<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM consumed_invites WHERE id = ?1",
            params![id.to_hex()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}
