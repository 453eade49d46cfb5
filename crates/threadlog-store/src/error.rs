use thiserror::Error;

/// Failures of the local index.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No platform data directory to put `threadlog.db` in.
    #[error("No data directory available for the index")]
    NoDataDir,

    #[error("Index I/O: {0}")]
    Io(#[from] std::io::Error),

    /// The requested thread, block or invite is not in the index.
    #[error("Not found in index")]
    NotFound,

    /// Schema upgrade to `version` failed.
    #[error("Schema migration to v{version} failed: {reason}")]
    Migration { version: u32, reason: String },

    /// A JSON-encoded column (peer inboxes) failed to encode or decode.
    #[error("JSON column: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
