//! Content-addressed block storage.
//!
//! `put` returns the BLAKE3 hash of the stored bytes, `get` fetches bytes by
//! that hash.  [`FsBlockStore`] keeps one file per block named after its hash;
//! [`MemoryBlockStore`] is a process-local map useful for tests and for nodes
//! sharing a store in one process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

use threadlog_shared::types::Hash;

#[derive(Debug, Error)]
pub enum BlockStoreError {
    #[error("Block not found: {0}")]
    NotFound(Hash),

    #[error("Block too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Empty block")]
    Empty,

    #[error("Stored block {0} is corrupt")]
    Corrupt(Hash),

    #[error("Block storage error: {0}")]
    Io(String),
}

#[async_trait]
pub trait BlockStore: Send + Sync {
    /// Store `bytes` and return their content hash.  Storing the same bytes
    /// twice is not an error.
    async fn put(&self, bytes: &[u8]) -> Result<Hash, BlockStoreError>;

    /// Fetch the bytes stored under `hash`.
    async fn get(&self, hash: &Hash) -> Result<Vec<u8>, BlockStoreError>;

    async fn has(&self, hash: &Hash) -> Result<bool, BlockStoreError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    blocks: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl MemoryBlockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlockStore for MemoryBlockStore {
    async fn put(&self, bytes: &[u8]) -> Result<Hash, BlockStoreError> {
        if bytes.is_empty() {
            return Err(BlockStoreError::Empty);
        }
        let hash = Hash::of(bytes);
        self.blocks.write().await.insert(hash, bytes.to_vec());
        Ok(hash)
    }

    async fn get(&self, hash: &Hash) -> Result<Vec<u8>, BlockStoreError> {
        self.blocks
            .read()
            .await
            .get(hash)
            .cloned()
            .ok_or(BlockStoreError::NotFound(*hash))
    }

    async fn has(&self, hash: &Hash) -> Result<bool, BlockStoreError> {
        Ok(self.blocks.read().await.contains_key(hash))
    }
}

// ---------------------------------------------------------------------------
// Filesystem store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct FsBlockStore {
    base_path: PathBuf,
    max_size: usize,
}

impl FsBlockStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, BlockStoreError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            BlockStoreError::Io(format!(
                "Failed to create block directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Block store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    // File names are hex digests, so they cannot escape the base directory.
    fn block_path(&self, hash: &Hash) -> PathBuf {
        self.base_path.join(hash.to_hex())
    }
}

#[async_trait]
impl BlockStore for FsBlockStore {
    async fn put(&self, bytes: &[u8]) -> Result<Hash, BlockStoreError> {
        if bytes.is_empty() {
            return Err(BlockStoreError::Empty);
        }
        if bytes.len() > self.max_size {
            return Err(BlockStoreError::TooLarge {
                size: bytes.len(),
                max: self.max_size,
            });
        }

        let hash = Hash::of(bytes);
        let path = self.block_path(&hash);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(hash);
        }

        // Write under a temporary name first so readers never see a partial block.
        let tmp = self.base_path.join(format!("{}.tmp", hash.to_hex()));
        fs::write(&tmp, bytes)
            .await
            .map_err(|e| BlockStoreError::Io(format!("Failed to write block {}: {}", hash, e)))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| BlockStoreError::Io(format!("Failed to move block {}: {}", hash, e)))?;

        debug!(hash = %hash, size = bytes.len(), "Stored block");
        Ok(hash)
    }

    async fn get(&self, hash: &Hash) -> Result<Vec<u8>, BlockStoreError> {
        let path = self.block_path(hash);

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BlockStoreError::NotFound(*hash))
            }
            Err(e) => {
                return Err(BlockStoreError::Io(format!(
                    "Failed to read block {}: {}",
                    hash, e
                )))
            }
        };

        if Hash::of(&data) != *hash {
            return Err(BlockStoreError::Corrupt(*hash));
        }

        debug!(hash = %hash, size = data.len(), "Retrieved block");
        Ok(data)
    }

    async fn has(&self, hash: &Hash) -> Result<bool, BlockStoreError> {
        fs::try_exists(self.block_path(hash))
            .await
            .map_err(|e| BlockStoreError::Io(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn test_store() -> (FsBlockStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsBlockStore::new(dir.path().to_path_buf(), 1024)
            .await
            .unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_fs_put_and_get() {
        let (store, _dir) = test_store().await;
        let data = b"signed-block-bytes";

        let hash = store.put(data).await.unwrap();
        assert_eq!(hash, Hash::of(data));
        assert_eq!(store.get(&hash).await.unwrap(), data);
        assert!(store.has(&hash).await.unwrap());

        // idempotent
        assert_eq!(store.put(data).await.unwrap(), hash);
    }

    #[tokio::test]
    async fn test_fs_not_found() {
        let (store, _dir) = test_store().await;
        let missing = Hash::of(b"missing");
        assert!(matches!(
            store.get(&missing).await,
            Err(BlockStoreError::NotFound(_))
        ));
        assert!(!store.has(&missing).await.unwrap());
    }

    #[tokio::test]
    async fn test_fs_rejects_empty_and_oversized() {
        let (store, _dir) = test_store().await;
        assert!(matches!(store.put(b"").await, Err(BlockStoreError::Empty)));
        assert!(matches!(
            store.put(&[0u8; 2048]).await,
            Err(BlockStoreError::TooLarge { size: 2048, max: 1024 })
        ));
    }

    #[tokio::test]
    async fn test_fs_detects_corruption() {
        let (store, _dir) = test_store().await;
        let hash = store.put(b"original").await.unwrap();
        std::fs::write(store.base_path().join(hash.to_hex()), b"tampered").unwrap();
        assert!(matches!(
            store.get(&hash).await,
            Err(BlockStoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store() {
        let store = MemoryBlockStore::new();
        let hash = store.put(b"block").await.unwrap();
        assert_eq!(store.get(&hash).await.unwrap(), b"block");
        assert_eq!(store.put(b"block").await.unwrap(), hash);
        assert!(store.has(&hash).await.unwrap());
        assert!(!store.has(&Hash::of(b"other")).await.unwrap());
        assert!(store.get(&Hash::of(b"other")).await.is_err());
    }
}
