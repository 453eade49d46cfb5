//! The SQLite index behind every node: threads, indexed blocks, peers,
//! profile, cafe sessions and claimed invites.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::types::Type;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open `path`, creating the file if needed, and bring its schema up to
    /// date before handing it out.
    pub fn open_at(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        tracing::debug!(path = %path.display(), "Opening index");

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// Raw access for statements the typed helpers do not cover.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Platform data directory used when no explicit repo path is configured.
pub fn default_data_dir() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("io", "threadlog", "threadlog").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().to_path_buf())
}

// Row mapper helpers.

pub(crate) fn column<T, E>(idx: usize, res: std::result::Result<T, E>) -> rusqlite::Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    res.map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn parse_date(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    column(
        idx,
        DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)),
    )
}

pub(crate) fn not_found(e: rusqlite::Error) -> StoreError {
    match e {
        rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
        other => StoreError::Sqlite(other),
    }
}
