//! Local profile settings, stored as key/value rows.

use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

const USERNAME_KEY: &str = "username";

impl Database {
    pub fn get_username(&self) -> Result<Option<String>> {
        Ok(self
            .conn()
            .query_row(
                "SELECT value FROM profile WHERE key = ?1",
                params![USERNAME_KEY],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn set_username(&self, username: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO profile (key, value) VALUES (?1, ?2)
             ON CONFLICT (key) DO UPDATE SET value = excluded.value",
            params![USERNAME_KEY, username],
        )?;
        Ok(())
    }

    pub fn clear_username(&self) -> Result<()> {
        self.conn()
            .execute("DELETE FROM profile WHERE key = ?1", params![USERNAME_KEY])?;
        Ok(())
    }
}
