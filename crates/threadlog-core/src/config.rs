//! Node configuration loaded from environment variables.
//!
//! All settings have sensible defaults so a node can start with zero
//! configuration.

use std::path::PathBuf;

use threadlog_shared::constants::MAX_BLOCK_SIZE;
use threadlog_shared::types::{Hash, PeerId, ThreadKind};

/// Node configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Directory holding `threadlog.db` and the `blocks/` store.
    /// Env: `THREADLOG_REPO_PATH`
    /// Default: the platform data directory, or `./threadlog` if none.
    pub repo_path: PathBuf,

    /// Largest block the filesystem block store accepts.
    /// Env: `THREADLOG_MAX_BLOCK_SIZE`
    /// Default: 256 KiB
    pub max_block_size: usize,

    /// Capacity of the outbound replication queue.
    /// Env: `THREADLOG_OUTBOX_CAPACITY`
    /// Default: `256`
    pub outbox_capacity: usize,

    /// Whether the node starts without network reachability.
    /// Env: `THREADLOG_START_OFFLINE` (true/false)
    /// Default: `false`
    pub start_offline: bool,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            repo_path: threadlog_store::database::default_data_dir()
                .unwrap_or_else(|_| PathBuf::from("./threadlog")),
            max_block_size: MAX_BLOCK_SIZE,
            outbox_capacity: 256,
            start_offline: false,
        }
    }
}

impl NodeConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("THREADLOG_REPO_PATH") {
            config.repo_path = PathBuf::from(path);
        }

        if let Ok(val) = std::env::var("THREADLOG_MAX_BLOCK_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_block_size = n,
                _ => tracing::warn!(value = %val, "Invalid THREADLOG_MAX_BLOCK_SIZE, using default"),
            }
        }

        if let Ok(val) = std::env::var("THREADLOG_OUTBOX_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.outbox_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid THREADLOG_OUTBOX_CAPACITY, using default"),
            }
        }

        if let Ok(val) = std::env::var("THREADLOG_START_OFFLINE") {
            config.start_offline = val == "true" || val == "1";
        }

        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.repo_path.join("threadlog.db")
    }

    pub fn blocks_path(&self) -> PathBuf {
        self.repo_path.join("blocks")
    }
}

/// Parameters for creating a thread.
#[derive(Debug, Clone)]
pub struct AddThreadConfig {
    /// Caller-chosen key the thread is filed under.
    pub key: String,
    pub name: String,
    pub schema: Option<Hash>,
    pub initiator: PeerId,
    pub kind: ThreadKind,
    /// Commit the genesis JOIN right after creating the thread.
    pub join: bool,
}
