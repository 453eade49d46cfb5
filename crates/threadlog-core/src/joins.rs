//! JOIN and LEAVE blocks.

use tracing::{debug, info};

use threadlog_shared::block::{Block, BlockType, JoinPayload, LeavePayload, Payload};
use threadlog_shared::error::CodecError;
use threadlog_shared::types::{Hash, PeerId};

use crate::error::Result;
use crate::thread::Thread;

impl Thread {
    /// Our JOIN content: the inviter plus the local username and the cafes
    /// we hold sessions with.
    fn build_join(&self, inviter: PeerId) -> Result<JoinPayload> {
        let db = self.ctx.db()?;
        let username = db.get_username()?;
        let inboxes = db
            .list_cafe_sessions()?
            .into_iter()
            .map(|s| s.cafe_id)
            .collect();
        Ok(JoinPayload {
            inviter,
            username,
            inboxes,
        })
    }

    /// Commit the first JOIN of a thread we created.  Names ourselves as
    /// inviter, leaves the roster alone and posts nothing.
    pub async fn join_initial(&self) -> Result<Hash> {
        let lock = self.mux.lock().await;
        let payload = self.build_join(self.ctx.peer_id())?;
        let sealed = self.commit_locked(&lock, Payload::Join(payload)).await?;

        debug!(thread = %self.id, hash = %sealed.hash, "Added genesis JOIN");
        Ok(sealed.hash)
    }

    /// Commit a JOIN accepting an invite from `inviter`, add the inviter to
    /// the roster and post the JOIN to every peer.
    ///
    /// The post happens after the thread lock is released; delivery
    /// failures do not fail the join.
    pub async fn join(&self, inviter: PeerId) -> Result<Hash> {
        let sealed = {
            let lock = self.mux.lock().await;
            let payload = self.build_join(inviter)?;
            let sealed = self.commit_locked(&lock, Payload::Join(payload)).await?;
            self.add_peer(inviter);
            sealed
        };

        let delivered = self.post_to_peers(&sealed).await;
        info!(thread = %self.id, hash = %sealed.hash, inviter = %inviter, delivered, "Joined thread");
        Ok(sealed.hash)
    }

    /// Apply a JOIN received from another peer: index it and record its
    /// author with the username and inboxes it announced.  Re-delivery of a
    /// known JOIN changes nothing.  The roster is written under the thread
    /// lock, so a racing LEAVE from the same author lands before or after
    /// the whole JOIN; a JOIN that lands after it is indexed only.
    pub async fn handle_join_block(&self, hash: &Hash, bytes: &[u8]) -> Result<JoinPayload> {
        let block = Block::open(hash, bytes)?;
        self.apply_join(hash, bytes, &block).await
    }

    pub(crate) async fn apply_join(&self, hash: &Hash, bytes: &[u8], block: &Block) -> Result<JoinPayload> {
        let Payload::Join(join) = &block.payload else {
            return Err(CodecError::UnexpectedType {
                expected: BlockType::Join,
                actual: block.block_type(),
            }
            .into());
        };

        let author = block.header.author;
        let lock = self.mux.lock().await;
        let ingested = self.ingest_locked(&lock, hash, bytes, block).await?;
        if ingested.fresh {
            if self.left_since(author, block.header.date) {
                debug!(thread = %self.id, peer = %author, "JOIN arrived after its author left");
            } else {
                self.add_or_update_peer(author, join.username.clone(), join.inboxes.clone());
            }
        }
        Ok(join.clone())
    }

    /// Commit a LEAVE and post it to every peer.
    pub async fn leave(&self) -> Result<Hash> {
        let sealed = self.commit(Payload::Leave(LeavePayload)).await?;
        let delivered = self.post_to_peers(&sealed).await;
        info!(thread = %self.id, hash = %sealed.hash, delivered, "Left thread");
        Ok(sealed.hash)
    }

    /// Apply a LEAVE received from another peer and drop its author from
    /// the roster.
    pub async fn handle_leave_block(&self, hash: &Hash, bytes: &[u8]) -> Result<PeerId> {
        let block = Block::open(hash, bytes)?;
        self.apply_leave(hash, bytes, &block).await
    }

    pub(crate) async fn apply_leave(&self, hash: &Hash, bytes: &[u8], block: &Block) -> Result<PeerId> {
        if block.block_type() != BlockType::Leave {
            return Err(CodecError::UnexpectedType {
                expected: BlockType::Leave,
                actual: block.block_type(),
            }
            .into());
        }
        let author = block.header.author;

        let lock = self.mux.lock().await;
        let ingested = self.ingest_locked(&lock, hash, bytes, block).await?;
        if ingested.fresh {
            self.remove_peer(author);
        }
        Ok(author)
    }
}
