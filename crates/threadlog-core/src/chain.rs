//! Commit and ingest paths of a thread's chain.
//!
//! A local commit runs: read head, build the block on top of it, sign, store
//! the bytes, index the block, advance the head.  Each step can fail on its
//! own and the error says how far the commit got:
//!
//! * signing or storing failed: nothing changed,
//! * indexing failed: the bytes are in the block store but unreferenced,
//! * the head write failed: the block is indexed, the head is stale
//!   ([`ThreadError::PartialCommit`]).

use tokio::sync::MutexGuard;
use tracing::{debug, info, warn};

use threadlog_shared::block::{Block, BlockHeader, BlockType, MessagePayload, Payload, SealedBlock};
use threadlog_shared::error::CodecError;
use threadlog_shared::types::Hash;
use threadlog_store::BlockRecord;

use crate::block_store::BlockStoreError;
use crate::error::{Result, ThreadError};
use crate::fanout;
use crate::thread::Thread;

/// Outcome of applying a remote block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ingested {
    pub record: BlockRecord,
    /// `false` if the block was already indexed and nothing changed.
    pub fresh: bool,
    /// Whether the head moved to this block.
    pub advanced: bool,
}

fn record_for(hash: Hash, block: &Block) -> BlockRecord {
    BlockRecord {
        hash,
        thread_id: block.header.thread_id,
        kind: block.block_type(),
        parent: block.header.parent,
        author: block.header.author,
        date: block.header.date,
    }
}

impl Thread {
    /// Build a block on the current head, sign it and put it in the block
    /// store.  The block is not indexed.  `_lock` proves the caller holds
    /// the thread lock.
    pub(crate) async fn store_block(&self, _lock: &MutexGuard<'_, ()>, payload: Payload) -> Result<SealedBlock> {
        let parent = self.ctx.db()?.get_head(&self.id)?;
        let header = BlockHeader::new(self.id, self.ctx.peer_id(), parent);
        let sealed = Block::new(header, payload).seal(&self.ctx.identity)?;

        let stored = self.ctx.blocks.put(&sealed.bytes).await?;
        if stored != sealed.hash {
            return Err(BlockStoreError::Corrupt(sealed.hash).into());
        }
        Ok(sealed)
    }

    /// Full local commit of a chain block: store, index, advance the head.
    pub(crate) async fn commit_locked(&self, lock: &MutexGuard<'_, ()>, payload: Payload) -> Result<SealedBlock> {
        let sealed = self.store_block(lock, payload).await?;
        let record = record_for(sealed.hash, &sealed.block);

        let db = self.ctx.db()?;
        db.record_block(&record)?;
        db.set_head(&self.id, &sealed.hash)
            .map_err(|source| ThreadError::PartialCommit {
                thread_id: self.id,
                hash: sealed.hash,
                source,
            })?;

        debug!(
            thread = %self.id,
            hash = %sealed.hash,
            kind = ?record.kind,
            parent = ?record.parent.map(|p| p.short()),
            "Committed block"
        );
        Ok(sealed)
    }

    /// Lock the thread and commit one chain block.  The caller decides
    /// whether and to whom the block is posted.
    pub(crate) async fn commit(&self, payload: Payload) -> Result<SealedBlock> {
        let lock = self.mux.lock().await;
        self.commit_locked(&lock, payload).await
    }

    /// Send a committed block to every current peer of the thread.
    /// Delivery failures are logged, never returned.
    pub(crate) async fn post_to_peers(&self, sealed: &SealedBlock) -> usize {
        let peers = match self.peers() {
            Ok(peers) => peers,
            Err(e) => {
                warn!(thread = %self.id, hash = %sealed.hash, error = %e, "Could not list peers to post to");
                return 0;
            }
        };
        fanout::post(
            self.ctx.transport.as_ref(),
            self.id,
            sealed.hash,
            &sealed.bytes,
            &peers,
        )
        .await
    }

    /// Append a text message and post it to the thread's peers.
    pub async fn add_message(&self, body: &str) -> Result<Hash> {
        let sealed = self
            .commit(Payload::Message(MessagePayload {
                body: body.to_string(),
            }))
            .await?;
        self.post_to_peers(&sealed).await;
        Ok(sealed.hash)
    }

    /// Decode, verify and apply a remote chain block.
    pub async fn handle_message_block(&self, hash: &Hash, bytes: &[u8]) -> Result<Ingested> {
        let block = Block::open(hash, bytes)?;
        self.ingest_block(hash, bytes, &block).await
    }

    /// Apply an already verified remote block to this thread.
    ///
    /// The block is kept in the block store and indexed.  If its parent is
    /// the current head the head fast-forwards to it.  A block that is
    /// already indexed is a no-op.
    pub(crate) async fn ingest_block(&self, hash: &Hash, bytes: &[u8], block: &Block) -> Result<Ingested> {
        let lock = self.mux.lock().await;
        self.ingest_locked(&lock, hash, bytes, block).await
    }

    /// [`Thread::ingest_block`] for callers that must apply side effects
    /// before the thread lock is released.
    pub(crate) async fn ingest_locked(
        &self,
        _lock: &MutexGuard<'_, ()>,
        hash: &Hash,
        bytes: &[u8],
        block: &Block,
    ) -> Result<Ingested> {
        if block.header.thread_id != self.id {
            return Err(CodecError::WrongThread {
                expected: self.id,
                actual: block.header.thread_id,
            }
            .into());
        }
        let record = record_for(*hash, block);

        let known = self.ctx.db()?.has_block(hash)?;
        if known {
            debug!(thread = %self.id, hash = %hash, "Block already indexed");
            return Ok(Ingested {
                record,
                fresh: false,
                advanced: false,
            });
        }

        self.ctx.blocks.put(bytes).await?;

        let db = self.ctx.db()?;
        let fresh = db.record_block(&record)?;
        let head = db.get_head(&self.id)?;
        let advanced = fresh && record.parent == head;
        if advanced {
            db.set_head(&self.id, hash)
                .map_err(|source| ThreadError::PartialCommit {
                    thread_id: self.id,
                    hash: *hash,
                    source,
                })?;
        }

        info!(
            thread = %self.id,
            hash = %hash,
            kind = ?record.kind,
            author = %record.author,
            advanced,
            "Ingested remote block"
        );
        Ok(Ingested {
            record,
            fresh,
            advanced,
        })
    }

    /// Index the history a new member is invited into and make `tip` the
    /// head, so the member's JOIN extends the inviter's chain.
    ///
    /// Walks parents back from `tip` through the block store until the first
    /// block of the thread or one that is already indexed.  `tip` itself must
    /// be readable; a missing older ancestor only ends the walk.  Returns the
    /// number of blocks indexed.
    pub(crate) async fn adopt_history(&self, tip: Hash) -> Result<usize> {
        let _lock = self.mux.lock().await;

        let mut pending = Vec::new();
        let mut next = Some(tip);
        while let Some(hash) = next {
            let known = self.ctx.db()?.has_block(&hash)?;
            if known {
                break;
            }
            let bytes = match self.ctx.blocks.get(&hash).await {
                Ok(bytes) => bytes,
                Err(BlockStoreError::NotFound(_)) if hash != tip => {
                    warn!(thread = %self.id, hash = %hash, "History incomplete, ancestor not available");
                    break;
                }
                Err(e) => return Err(e.into()),
            };
            let block = Block::open(&hash, &bytes)?;
            if block.header.thread_id != self.id {
                return Err(CodecError::WrongThread {
                    expected: self.id,
                    actual: block.header.thread_id,
                }
                .into());
            }
            if !block.block_type().is_chain() {
                return Err(CodecError::UnexpectedType {
                    expected: BlockType::Message,
                    actual: block.block_type(),
                }
                .into());
            }
            next = block.header.parent;
            pending.push(record_for(hash, &block));
        }

        let db = self.ctx.db()?;
        for record in pending.iter().rev() {
            db.record_block(record)?;
        }
        db.set_head(&self.id, &tip)?;

        info!(thread = %self.id, head = %tip, blocks = pending.len(), "Adopted thread history");
        Ok(pending.len())
    }
}
