//! Per-thread peer roster.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use tracing::{debug, info, warn};

use threadlog_shared::block::{Block, BlockType, Payload};
use threadlog_shared::types::PeerId;
use threadlog_store::ThreadPeer;

use crate::error::Result;
use crate::thread::Thread;

impl Thread {
    /// Known members of the thread other than the local node.
    pub fn peers(&self) -> Result<Vec<ThreadPeer>> {
        let me = self.ctx.peer_id();
        let peers = self.ctx.db()?.list_thread_peers(&self.id)?;
        Ok(peers.into_iter().filter(|p| p.id != me).collect())
    }

    /// Record `id` as a member if it is not one yet.  An existing entry keeps
    /// its username and inboxes.  Never fails the caller.
    pub(crate) fn add_peer(&self, id: PeerId) {
        if id == self.ctx.peer_id() {
            return;
        }
        let peer = ThreadPeer {
            id,
            thread_id: self.id,
            username: None,
            inboxes: Vec::new(),
        };
        match self.ctx.db().and_then(|db| Ok(db.add_thread_peer(&peer)?)) {
            Ok(true) => debug!(thread = %self.id, peer = %id, "Added peer"),
            Ok(false) => {}
            Err(e) => warn!(thread = %self.id, peer = %id, error = %e, "Failed to add peer"),
        }
    }

    /// Insert or refresh a member from the contents of its JOIN.  Never
    /// fails the caller.
    pub(crate) fn add_or_update_peer(&self, id: PeerId, username: Option<String>, inboxes: Vec<String>) {
        if id == self.ctx.peer_id() {
            return;
        }
        let peer = ThreadPeer {
            id,
            thread_id: self.id,
            username,
            inboxes,
        };
        match self.ctx.db().and_then(|db| Ok(db.upsert_thread_peer(&peer)?)) {
            Ok(()) => debug!(thread = %self.id, peer = %id, "Updated peer"),
            Err(e) => warn!(thread = %self.id, peer = %id, error = %e, "Failed to update peer"),
        }
    }

    pub(crate) fn remove_peer(&self, id: PeerId) {
        match self.ctx.db().and_then(|db| Ok(db.delete_thread_peer(&self.id, &id)?)) {
            Ok(true) => debug!(thread = %self.id, peer = %id, "Removed peer"),
            Ok(false) => {}
            Err(e) => warn!(thread = %self.id, peer = %id, error = %e, "Failed to remove peer"),
        }
    }

    /// Whether `id` has an indexed LEAVE dated at or after `since`.  A JOIN
    /// delivered after its author's LEAVE must not bring the author back.
    /// Lookup errors count as "no".
    pub(crate) fn left_since(&self, id: PeerId, since: DateTime<Utc>) -> bool {
        match self.ctx.db().and_then(|db| Ok(db.list_blocks(&self.id, Some(BlockType::Leave))?)) {
            Ok(leaves) => leaves.iter().any(|r| r.author == id && r.date >= since),
            Err(e) => {
                warn!(thread = %self.id, peer = %id, error = %e, "Failed to look up LEAVE blocks");
                false
            }
        }
    }

    /// Rebuild the roster from the thread's indexed JOIN and LEAVE blocks,
    /// replayed in date order.  Blocks that are missing from the block
    /// store or fail to decode are skipped.  Returns the number of peers.
    pub async fn rebuild_roster(&self) -> Result<usize> {
        let _lock = self.mux.lock().await;
        let me = self.ctx.peer_id();

        let mut records = {
            let db = self.ctx.db()?;
            db.list_blocks(&self.id, None)?
        };
        records.sort_by_key(|r| r.date);

        let mut roster: BTreeMap<PeerId, ThreadPeer> = BTreeMap::new();
        for record in records {
            if !matches!(record.kind, BlockType::Join | BlockType::Leave) {
                continue;
            }
            let block = match self.ctx.blocks.get(&record.hash).await {
                Ok(bytes) => Block::open(&record.hash, &bytes),
                Err(e) => {
                    warn!(thread = %self.id, hash = %record.hash, error = %e, "Skipping unreadable block");
                    continue;
                }
            };
            let block = match block {
                Ok(block) => block,
                Err(e) => {
                    warn!(thread = %self.id, hash = %record.hash, error = %e, "Skipping undecodable block");
                    continue;
                }
            };

            let author = block.header.author;
            match block.payload {
                Payload::Join(join) => {
                    if author == me {
                        if join.inviter != me {
                            roster.entry(join.inviter).or_insert_with(|| ThreadPeer {
                                id: join.inviter,
                                thread_id: self.id,
                                username: None,
                                inboxes: Vec::new(),
                            });
                        }
                    } else {
                        roster.insert(
                            author,
                            ThreadPeer {
                                id: author,
                                thread_id: self.id,
                                username: join.username,
                                inboxes: join.inboxes,
                            },
                        );
                    }
                }
                Payload::Leave(_) => {
                    roster.remove(&author);
                }
                _ => {}
            }
        }

        let db = self.ctx.db()?;
        db.clear_thread_peers(&self.id)?;
        for peer in roster.values() {
            db.upsert_thread_peer(peer)?;
        }

        info!(thread = %self.id, peers = roster.len(), "Rebuilt roster");
        Ok(roster.len())
    }
}
