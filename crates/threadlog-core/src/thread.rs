//! A single thread log and the state shared by every thread of a node.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::warn;

use threadlog_shared::crypto::SymmetricKey;
use threadlog_shared::identity::Identity;
use threadlog_shared::types::{Hash, PeerId, ThreadId, ThreadKind};
use threadlog_store::{BlockRecord, Database, ThreadRecord};

use crate::block_store::BlockStore;
use crate::error::{Result, ThreadError};
use crate::transport::Transport;

/// Handles every thread of a node works through.
pub(crate) struct NodeContext {
    pub identity: Identity,
    pub datastore: Arc<Mutex<Database>>,
    pub blocks: Arc<dyn BlockStore>,
    pub transport: Arc<dyn Transport>,
}

impl NodeContext {
    /// Lock the datastore.  The guard must be dropped before any `.await`.
    pub fn db(&self) -> Result<MutexGuard<'_, Database>> {
        self.datastore.lock().map_err(|_| ThreadError::LockPoisoned)
    }

    pub fn peer_id(&self) -> PeerId {
        self.identity.peer_id()
    }
}

/// One append-only log.
///
/// Every operation that reads the head and then moves it holds `mux` for its
/// whole duration, so a thread never has two of them interleaved.  That
/// covers commits, remote ingestion with its roster update, history
/// adoption, head reconciliation and roster rebuilds.
pub struct Thread {
    pub id: ThreadId,
    pub key: String,
    pub name: String,
    pub schema: Option<Hash>,
    pub initiator: PeerId,
    pub kind: ThreadKind,
    pub(crate) secret: Identity,
    pub(crate) sym_key: SymmetricKey,
    pub(crate) ctx: Arc<NodeContext>,
    pub(crate) mux: tokio::sync::Mutex<()>,
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Public view of a thread, without key material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub key: String,
    pub name: String,
    pub schema: Option<Hash>,
    pub initiator: PeerId,
    pub kind: ThreadKind,
    pub head: Option<Hash>,
    pub peer_count: usize,
    pub block_count: u64,
}

impl Thread {
    pub(crate) fn from_record(record: &ThreadRecord, ctx: Arc<NodeContext>) -> Self {
        Self {
            id: record.id,
            key: record.key.clone(),
            name: record.name.clone(),
            schema: record.schema,
            initiator: record.initiator,
            kind: record.kind,
            secret: Identity::from_secret_bytes(&record.secret),
            sym_key: record.sym_key,
            ctx,
            mux: tokio::sync::Mutex::new(()),
        }
    }

    pub fn head(&self) -> Result<Option<Hash>> {
        Ok(self.ctx.db()?.get_head(&self.id)?)
    }

    pub fn info(&self) -> Result<ThreadInfo> {
        let db = self.ctx.db()?;
        let head = db.get_head(&self.id)?;
        let me = self.ctx.peer_id();
        let peer_count = db
            .list_thread_peers(&self.id)?
            .iter()
            .filter(|p| p.id != me)
            .count();
        let block_count = db.count_blocks(&self.id)?;

        Ok(ThreadInfo {
            id: self.id,
            key: self.key.clone(),
            name: self.name.clone(),
            schema: self.schema,
            initiator: self.initiator,
            kind: self.kind,
            head,
            peer_count,
            block_count,
        })
    }

    /// Walk the indexed chain from the head back to the first block, newest
    /// first.  Stops early at a parent that is not indexed locally.
    pub fn chain(&self) -> Result<Vec<BlockRecord>> {
        let db = self.ctx.db()?;
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut next = db.get_head(&self.id)?;

        while let Some(hash) = next {
            if !seen.insert(hash) {
                break;
            }
            let record = match db.get_block(&hash) {
                Ok(record) => record,
                Err(threadlog_store::StoreError::NotFound) => break,
                Err(e) => return Err(e.into()),
            };
            next = record.parent;
            out.push(record);
        }
        Ok(out)
    }

    /// Move the head forward along indexed blocks that descend from it.
    ///
    /// This repairs a thread after a partial commit: the block was indexed
    /// but the head write failed.  Among siblings the newest wins.
    pub async fn reconcile_head(&self) -> Result<Option<Hash>> {
        let _lock = self.mux.lock().await;
        let db = self.ctx.db()?;

        let original = db.get_head(&self.id)?;
        let limit = db.count_blocks(&self.id)?;
        let mut head = original;
        let mut steps = 0u64;

        while steps < limit {
            match db.list_children(&self.id, head.as_ref())?.first() {
                Some(child) => head = Some(child.hash),
                None => break,
            }
            steps += 1;
        }

        if head != original {
            if let Some(hash) = head {
                db.set_head(&self.id, &hash)?;
                warn!(thread = %self.id, head = %hash, steps, "Reconciled thread head");
            }
        }
        Ok(head)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{new_thread, test_node};

    #[tokio::test]
    async fn test_debug_leaves_out_key_material() {
        let t = test_node();
        let thread = new_thread(&t.node, "private", true).await;

        let shown = format!("{thread:?}");
        assert!(shown.contains("private thread"));
        assert!(!shown.contains(&format!("{:?}", thread.sym_key)));
        assert!(!shown.contains(&format!("{:?}", thread.secret.secret_bytes())));
    }
}
