//! The node: owner of every local thread.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use threadlog_shared::block::{peek_header, Block, BlockType, JoinPayload, Payload};
use threadlog_shared::crypto::{generate_symmetric_key, SymmetricKey};
use threadlog_shared::identity::Identity;
use threadlog_shared::invite::{ExternalInvite, InviteBody, InviteError};
use threadlog_shared::types::{Hash, PeerId, ThreadId};
use threadlog_store::{CafeSession, Database, StoreError, ThreadRecord};

use crate::block_store::{BlockStore, FsBlockStore};
use crate::config::{AddThreadConfig, NodeConfig};
use crate::error::{ErrorKind, Result, ThreadError};
use crate::thread::{NodeContext, Thread};
use crate::transport::Transport;

pub struct Node {
    ctx: Arc<NodeContext>,
    threads: RwLock<HashMap<ThreadId, Arc<Thread>>>,
    started: AtomicBool,
    online: AtomicBool,
}

impl Node {
    /// Build a node over an open datastore and load its threads.  The node
    /// starts stopped and offline.
    pub fn new(
        identity: Identity,
        datastore: Database,
        blocks: Arc<dyn BlockStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let records = datastore.list_threads()?;
        let ctx = Arc::new(NodeContext {
            identity,
            datastore: Arc::new(Mutex::new(datastore)),
            blocks,
            transport,
        });

        let threads = records
            .iter()
            .map(|r| (r.id, Arc::new(Thread::from_record(r, Arc::clone(&ctx)))))
            .collect::<HashMap<_, _>>();
        info!(peer = %ctx.peer_id(), threads = threads.len(), "Node loaded");

        Ok(Self {
            ctx,
            threads: RwLock::new(threads),
            started: AtomicBool::new(false),
            online: AtomicBool::new(false),
        })
    }

    /// Open the repository described by `config`: the SQLite index and the
    /// filesystem block store under `config.repo_path`.
    pub async fn open(config: &NodeConfig, identity: Identity, transport: Arc<dyn Transport>) -> Result<Self> {
        std::fs::create_dir_all(&config.repo_path).map_err(StoreError::Io)?;
        let datastore = Database::open_at(&config.db_path())?;
        let blocks = FsBlockStore::new(config.blocks_path(), config.max_block_size).await?;
        Self::new(identity, datastore, Arc::new(blocks), transport)
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    pub fn start(&self) {
        self.started.store(true, Ordering::SeqCst);
        info!(peer = %self.peer_id(), "Node started");
    }

    pub fn stop(&self) {
        self.online.store(false, Ordering::SeqCst);
        self.started.store(false, Ordering::SeqCst);
        info!(peer = %self.peer_id(), "Node stopped");
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        debug!(online, "Network reachability changed");
    }

    pub fn started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    pub fn online(&self) -> bool {
        self.started() && self.online.load(Ordering::SeqCst)
    }

    fn require_started(&self) -> Result<()> {
        if self.started() {
            Ok(())
        } else {
            Err(ThreadError::Stopped)
        }
    }

    fn require_online(&self) -> Result<()> {
        self.require_started()?;
        if self.online() {
            Ok(())
        } else {
            Err(ThreadError::Offline)
        }
    }

    pub fn peer_id(&self) -> PeerId {
        self.ctx.peer_id()
    }

    /// Direct access to the local index.  Drop the guard before awaiting.
    pub fn datastore(&self) -> Result<MutexGuard<'_, Database>> {
        self.ctx.db()
    }

    // ---------------------------------------------------------------------
    // Threads
    // ---------------------------------------------------------------------

    pub fn threads(&self) -> Vec<Arc<Thread>> {
        match self.threads.read() {
            Ok(map) => map.values().cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn thread(&self, id: &ThreadId) -> Option<Arc<Thread>> {
        self.threads.read().ok()?.get(id).cloned()
    }

    fn require_thread(&self, id: &ThreadId) -> Result<Arc<Thread>> {
        self.thread(id).ok_or(ThreadError::ThreadNotFound(*id))
    }

    /// Persist a thread record and register the thread.
    fn create_thread(&self, record: ThreadRecord) -> Result<Arc<Thread>> {
        let mut threads = self.threads.write().map_err(|_| ThreadError::LockPoisoned)?;
        if threads.contains_key(&record.id) {
            return Err(ThreadError::ThreadExists(record.id));
        }
        self.ctx.db()?.add_thread(&record)?;

        let thread = Arc::new(Thread::from_record(&record, Arc::clone(&self.ctx)));
        threads.insert(record.id, Arc::clone(&thread));
        info!(thread = %record.id, key = %record.key, kind = record.kind.as_str(), "Added thread");
        Ok(thread)
    }

    /// Forget a thread locally: its record, index entries and roster.
    fn discard_thread(&self, id: &ThreadId) -> Result<()> {
        if let Ok(mut threads) = self.threads.write() {
            threads.remove(id);
        }
        self.ctx.db()?.delete_thread(id)?;
        Ok(())
    }

    /// Create a thread keyed by `secret`.  With `config.join` the genesis
    /// JOIN is committed right away.
    pub async fn add_thread(&self, secret: Identity, config: AddThreadConfig) -> Result<Arc<Thread>> {
        self.require_started()?;

        let record = ThreadRecord {
            id: secret.thread_id(),
            key: config.key,
            name: config.name,
            secret: *secret.secret_bytes(),
            sym_key: generate_symmetric_key(),
            schema: config.schema,
            initiator: config.initiator,
            kind: config.kind,
            head: None,
            created_at: Utc::now(),
        };
        let thread = self.create_thread(record)?;

        if config.join {
            thread.join_initial().await?;
        }
        Ok(thread)
    }

    /// Leave a thread and remove it locally.  Returns the LEAVE hash.
    pub async fn remove_thread(&self, id: &ThreadId) -> Result<Hash> {
        self.require_started()?;
        let thread = self.require_thread(id)?;

        let hash = thread.leave().await?;
        self.discard_thread(id)?;
        info!(thread = %id, leave = %hash, "Removed thread");
        Ok(hash)
    }

    // ---------------------------------------------------------------------
    // Invites
    // ---------------------------------------------------------------------

    pub async fn add_invite(&self, thread_id: &ThreadId, invitee: PeerId) -> Result<Hash> {
        self.require_started()?;
        self.require_thread(thread_id)?.add_invite(invitee).await
    }

    pub async fn add_external_invite(&self, thread_id: &ThreadId) -> Result<ExternalInvite> {
        self.require_started()?;
        let (id, key) = self.require_thread(thread_id)?.add_external_invite().await?;
        Ok(ExternalInvite {
            id,
            key,
            inviter: self.username()?,
        })
    }

    /// Accept a direct invite addressed to this node: materialize the
    /// thread and join it.  Returns the JOIN hash.
    pub async fn accept_invite(&self, invite_id: &Hash) -> Result<Hash> {
        self.require_online()?;

        let block = self.fetch_block(invite_id).await?;
        let Payload::Invite(invite) = &block.payload else {
            return Err(InviteError::NotAnInvite(*invite_id).into());
        };
        if invite.invitee != self.peer_id() {
            return Err(InviteError::NotInvitee.into());
        }
        let body = InviteBody::open_sealed(&self.ctx.identity, &invite.sealed)?;
        self.join_from_invite(&block, body).await
    }

    /// Redeem an external invite with its out-of-band key.  Each invite can
    /// be redeemed once per node; a redemption that fails before any JOIN
    /// is committed can be retried.
    pub async fn accept_external_invite(&self, invite_id: &Hash, key: &SymmetricKey) -> Result<Hash> {
        self.require_online()?;

        let claimed = self.ctx.db()?.claim_invite(invite_id)?;
        if !claimed {
            return Err(InviteError::Consumed(*invite_id).into());
        }

        let res = self.redeem_external(invite_id, key).await;
        if let Err(e) = &res {
            if e.kind() != ErrorKind::PartialCommit {
                if let Err(release) = self.ctx.db().and_then(|db| Ok(db.release_invite(invite_id)?)) {
                    warn!(invite = %invite_id, error = %release, "Failed to release invite claim");
                }
            }
        }
        res
    }

    async fn redeem_external(&self, invite_id: &Hash, key: &SymmetricKey) -> Result<Hash> {
        let block = self.fetch_block(invite_id).await?;
        let Payload::ExternalInvite(invite) = &block.payload else {
            return Err(InviteError::NotAnInvite(*invite_id).into());
        };
        let body = InviteBody::decrypt_with(key, &invite.ciphertext)?;
        self.join_from_invite(&block, body).await
    }

    async fn fetch_block(&self, hash: &Hash) -> Result<Block> {
        let bytes = self.ctx.blocks.get(hash).await?;
        Ok(Block::open(hash, &bytes)?)
    }

    async fn join_from_invite(&self, invite: &Block, body: InviteBody) -> Result<Hash> {
        let thread_id = body.thread_id();
        if thread_id != invite.header.thread_id {
            return Err(InviteError::ThreadMismatch.into());
        }

        let record = ThreadRecord {
            id: thread_id,
            key: body.key,
            name: body.name,
            secret: body.thread_secret,
            sym_key: body.thread_key,
            schema: body.schema,
            initiator: body.initiator,
            kind: body.kind,
            head: None,
            created_at: Utc::now(),
        };
        let thread = self.create_thread(record)?;

        match Self::enter_thread(&thread, invite).await {
            Ok(hash) => Ok(hash),
            Err(e) => {
                if e.kind() != ErrorKind::PartialCommit {
                    if let Err(cleanup) = self.discard_thread(&thread_id) {
                        warn!(thread = %thread_id, error = %cleanup, "Failed to discard thread after failed join");
                    }
                }
                Err(e)
            }
        }
    }

    /// Take over the chain the invite was made on, then join.  The invite's
    /// parent is the inviter's head when it invited us, so our JOIN lands on
    /// top of it and the inviter fast-forwards when it ingests the JOIN.
    async fn enter_thread(thread: &Thread, invite: &Block) -> Result<Hash> {
        if let Some(tip) = invite.header.parent {
            thread.adopt_history(tip).await?;
            thread.rebuild_roster().await?;
        }
        thread.join(invite.header.author).await
    }

    // ---------------------------------------------------------------------
    // Remote blocks
    // ---------------------------------------------------------------------

    /// Apply one block received from another peer.
    ///
    /// Invites addressed to us are logged for the user to accept; chain
    /// blocks are routed to their thread's handler.
    pub async fn handle_block(&self, hash: &Hash, bytes: &[u8]) -> Result<Block> {
        let block = Block::open(hash, bytes)?;

        match block.block_type() {
            BlockType::Invite => {
                if let Payload::Invite(invite) = &block.payload {
                    if invite.invitee == self.peer_id() {
                        info!(invite = %hash, thread = %block.header.thread_id, from = %block.header.author, "Received invite");
                        self.ctx.blocks.put(bytes).await?;
                    } else {
                        debug!(invite = %hash, "Ignoring invite addressed to another peer");
                    }
                }
                return Ok(block);
            }
            BlockType::ExternalInvite => {
                debug!(invite = %hash, "Ignoring posted external invite");
                return Ok(block);
            }
            _ => {}
        }

        let thread = self.require_thread(&block.header.thread_id)?;
        match block.block_type() {
            BlockType::Join => {
                thread.apply_join(hash, bytes, &block).await?;
            }
            BlockType::Leave => {
                thread.apply_leave(hash, bytes, &block).await?;
            }
            _ => {
                thread.ingest_block(hash, bytes, &block).await?;
            }
        }
        Ok(block)
    }

    /// Route a remote JOIN to its thread.
    pub async fn handle_remote_join(&self, hash: &Hash, bytes: &[u8]) -> Result<JoinPayload> {
        let header = peek_header(bytes)?;
        self.require_thread(&header.thread_id)?
            .handle_join_block(hash, bytes)
            .await
    }

    /// Apply a batch of remote blocks.  A block that fails is logged and
    /// skipped; the rest are still applied.  Returns how many succeeded.
    pub async fn handle_blocks(&self, blocks: Vec<(Hash, Vec<u8>)>) -> usize {
        let total = blocks.len();
        let mut applied = 0;
        for (hash, bytes) in blocks {
            match self.handle_block(&hash, &bytes).await {
                Ok(_) => applied += 1,
                Err(e) => warn!(hash = %hash, kind = ?e.kind(), error = %e, "Rejected remote block"),
            }
        }
        debug!(applied, total, "Applied remote blocks");
        applied
    }

    // ---------------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------------

    /// Reconcile the head of every thread.  Returns how many heads moved.
    pub async fn reconcile(&self) -> Result<usize> {
        let mut moved = 0;
        for thread in self.threads() {
            let before = thread.head()?;
            if thread.reconcile_head().await? != before {
                moved += 1;
            }
        }
        Ok(moved)
    }

    pub async fn rebuild_roster(&self, thread_id: &ThreadId) -> Result<usize> {
        self.require_thread(thread_id)?.rebuild_roster().await
    }

    // ---------------------------------------------------------------------
    // Profile and cafe sessions
    // ---------------------------------------------------------------------

    pub fn username(&self) -> Result<Option<String>> {
        Ok(self.ctx.db()?.get_username()?)
    }

    pub fn set_username(&self, username: &str) -> Result<()> {
        self.ctx.db()?.set_username(username)?;
        Ok(())
    }

    pub fn add_cafe_session(&self, cafe_id: &str) -> Result<CafeSession> {
        Ok(self.ctx.db()?.add_cafe_session(cafe_id)?)
    }

    pub fn cafe_sessions(&self) -> Result<Vec<CafeSession>> {
        Ok(self.ctx.db()?.list_cafe_sessions()?)
    }

    pub fn remove_cafe_session(&self, cafe_id: &str) -> Result<bool> {
        Ok(self.ctx.db()?.delete_cafe_session(cafe_id)?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use threadlog_shared::block::{JoinPayload, MessagePayload, Payload};
    use threadlog_shared::identity::Identity;
    use threadlog_shared::invite::InviteError;

    use super::*;
    use crate::block_store::MemoryBlockStore;
    use crate::test_utils::{
        clear_failures, fail_on, new_thread, remote_block, test_node, test_node_with, thread_config,
    };
    use crate::transport::ChannelTransport;

    #[tokio::test]
    async fn test_stopped_node_rejects_calls() {
        let t = test_node();
        t.node.stop();

        let err = t
            .node
            .add_thread(Identity::generate(), thread_config("x", t.node.peer_id(), true))
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadError::Stopped));
        assert_eq!(err.kind(), ErrorKind::Precondition);
        assert!(t.node.threads().is_empty());

        let err = t
            .node
            .accept_external_invite(&Hash::of(b"invite"), &[0u8; 32])
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadError::Stopped));
    }

    #[tokio::test]
    async fn test_offline_node_cannot_accept() {
        let t = test_node();
        t.node.set_online(false);
        let invite = Hash::of(b"invite");

        let err = t.node.accept_external_invite(&invite, &[0u8; 32]).await.unwrap_err();
        assert!(matches!(err, ThreadError::Offline));
        assert!(!t.node.datastore().unwrap().is_invite_consumed(&invite).unwrap());

        let err = t.node.accept_invite(&invite).await.unwrap_err();
        assert!(matches!(err, ThreadError::Offline));
    }

    #[tokio::test]
    async fn test_unknown_thread() {
        let t = test_node();
        let missing = Identity::generate().thread_id();

        let err = t.node.add_invite(&missing, Identity::generate().peer_id()).await.unwrap_err();
        assert!(matches!(err, ThreadError::ThreadNotFound(id) if id == missing));

        let remote = Identity::generate();
        let sealed = remote_block(
            &remote,
            missing,
            None,
            Payload::Message(MessagePayload { body: "hi".into() }),
        );
        let err = t.node.handle_block(&sealed.hash, &sealed.bytes).await.unwrap_err();
        assert!(matches!(err, ThreadError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn test_duplicate_thread() {
        let t = test_node();
        let secret = Identity::generate();
        t.node
            .add_thread(secret.clone(), thread_config("a", t.node.peer_id(), true))
            .await
            .unwrap();
        let err = t
            .node
            .add_thread(secret, thread_config("b", t.node.peer_id(), true))
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadError::ThreadExists(_)));
        assert_eq!(t.node.threads().len(), 1);
    }

    #[tokio::test]
    async fn test_join_then_remote_join() {
        let t = test_node();
        let thread = new_thread(&t.node, "scenario", true).await;
        let a = Identity::generate().peer_id();

        let h1 = thread.join(a).await.unwrap();
        assert_eq!(thread.head().unwrap(), Some(h1));
        assert!(t.node.datastore().unwrap().has_block(&h1).unwrap());
        let ids: Vec<PeerId> = thread.peers().unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a]);

        let b = Identity::generate();
        let sealed = remote_block(
            &b,
            thread.id,
            Some(h1),
            Payload::Join(JoinPayload {
                inviter: a,
                username: Some("bob".into()),
                inboxes: vec!["x".into()],
            }),
        );
        let join = t.node.handle_remote_join(&sealed.hash, &sealed.bytes).await.unwrap();
        assert_eq!(join.username.as_deref(), Some("bob"));

        let mut peers = thread.peers().unwrap();
        peers.sort_by_key(|p| p.id != a);
        assert_eq!(peers.len(), 2);
        assert_eq!(peers[0].id, a);
        assert_eq!(peers[1].id, b.peer_id());
        assert_eq!(peers[1].username.as_deref(), Some("bob"));
        assert_eq!(peers[1].inboxes, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_direct_invite_between_nodes() {
        let network = Arc::new(MemoryBlockStore::new());
        let mut alice = test_node_with(network.clone());
        let mut bob = test_node_with(network);
        alice.node.set_username("alice").unwrap();
        bob.node.set_username("bob").unwrap();
        bob.node.add_cafe_session("cafe1").unwrap();

        let thread = new_thread(&alice.node, "shared", true).await;
        let invite = alice.node.add_invite(&thread.id, bob.node.peer_id()).await.unwrap();

        let delivered = alice.outbox.recv().await.unwrap();
        assert_eq!(delivered.recipient, bob.node.peer_id());
        bob.node.handle_block(&delivered.hash, &delivered.bytes).await.unwrap();

        let joined = bob.node.accept_invite(&invite).await.unwrap();
        let bobs_thread = bob.node.thread(&thread.id).unwrap();
        assert_eq!(bobs_thread.head().unwrap(), Some(joined));
        assert_eq!(bobs_thread.name, thread.name);
        let bobs_peers = bobs_thread.peers().unwrap();
        assert_eq!(bobs_peers.len(), 1);
        assert_eq!(bobs_peers[0].id, alice.node.peer_id());

        let posted = bob.outbox.recv().await.unwrap();
        assert_eq!(posted.recipient, alice.node.peer_id());
        assert_eq!(posted.hash, joined);
        alice.node.handle_block(&posted.hash, &posted.bytes).await.unwrap();

        let alices_peers = thread.peers().unwrap();
        assert_eq!(alices_peers.len(), 1);
        assert_eq!(alices_peers[0].id, bob.node.peer_id());
        assert_eq!(alices_peers[0].username.as_deref(), Some("bob"));
        assert_eq!(alices_peers[0].inboxes, vec!["cafe1".to_string()]);
    }

    #[tokio::test]
    async fn test_invited_member_shares_the_chain() {
        let network = Arc::new(MemoryBlockStore::new());
        let mut alice = test_node_with(network.clone());
        let mut bob = test_node_with(network);

        let thread = new_thread(&alice.node, "shared", true).await;
        let genesis = thread.head().unwrap();
        let invite = alice.node.add_invite(&thread.id, bob.node.peer_id()).await.unwrap();
        let delivered = alice.outbox.recv().await.unwrap();
        bob.node.handle_block(&delivered.hash, &delivered.bytes).await.unwrap();

        let joined = bob.node.accept_invite(&invite).await.unwrap();
        let bobs_thread = bob.node.thread(&thread.id).unwrap();
        let chain = bobs_thread.chain().unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].parent, genesis);

        let posted = bob.outbox.recv().await.unwrap();
        alice.node.handle_block(&posted.hash, &posted.bytes).await.unwrap();
        assert_eq!(thread.head().unwrap(), Some(joined));

        let from_alice = thread.add_message("welcome").await.unwrap();
        let posted = alice.outbox.recv().await.unwrap();
        assert_eq!(posted.recipient, bob.node.peer_id());
        bob.node.handle_block(&posted.hash, &posted.bytes).await.unwrap();
        assert_eq!(bobs_thread.head().unwrap(), Some(from_alice));

        let from_bob = bobs_thread.add_message("thanks").await.unwrap();
        let posted = bob.outbox.recv().await.unwrap();
        alice.node.handle_block(&posted.hash, &posted.bytes).await.unwrap();
        assert_eq!(thread.head().unwrap(), Some(from_bob));

        let alices: Vec<Hash> = thread.chain().unwrap().iter().map(|r| r.hash).collect();
        let bobs: Vec<Hash> = bobs_thread.chain().unwrap().iter().map(|r| r.hash).collect();
        assert_eq!(alices.len(), 4);
        assert_eq!(alices, bobs);
    }

    #[tokio::test]
    async fn test_invite_for_someone_else() {
        let network = Arc::new(MemoryBlockStore::new());
        let alice = test_node_with(network.clone());
        let carol = test_node_with(network);

        let thread = new_thread(&alice.node, "shared", true).await;
        let invite = alice
            .node
            .add_invite(&thread.id, Identity::generate().peer_id())
            .await
            .unwrap();

        let err = carol.node.accept_invite(&invite).await.unwrap_err();
        assert!(matches!(err, ThreadError::Invite(InviteError::NotInvitee)));
        assert!(carol.node.threads().is_empty());
    }

    #[tokio::test]
    async fn test_external_invite_is_single_use() {
        let network = Arc::new(MemoryBlockStore::new());
        let alice = test_node_with(network.clone());
        let bob = test_node_with(network);
        alice.node.set_username("alice").unwrap();

        let thread = new_thread(&alice.node, "public", true).await;
        let invite = alice.node.add_external_invite(&thread.id).await.unwrap();
        assert_eq!(invite.inviter.as_deref(), Some("alice"));

        let joined = bob.node.accept_external_invite(&invite.id, &invite.key).await.unwrap();
        let bobs_thread = bob.node.thread(&thread.id).unwrap();
        assert_eq!(bobs_thread.head().unwrap(), Some(joined));
        assert_eq!(bobs_thread.info().unwrap().block_count, 2);

        let err = bob
            .node
            .accept_external_invite(&invite.id, &invite.key)
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadError::Invite(InviteError::Consumed(_))));
        assert_eq!(err.kind(), ErrorKind::Invite);
        assert_eq!(bobs_thread.head().unwrap(), Some(joined));
        assert_eq!(bobs_thread.info().unwrap().block_count, 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_redemptions_of_one_invite() {
        let network = Arc::new(MemoryBlockStore::new());
        let alice = test_node_with(network.clone());
        let bob = test_node_with(network);

        let thread = new_thread(&alice.node, "public", true).await;
        let invite = alice.node.add_external_invite(&thread.id).await.unwrap();

        let (first, second) = tokio::join!(
            bob.node.accept_external_invite(&invite.id, &invite.key),
            bob.node.accept_external_invite(&invite.id, &invite.key),
        );
        let (joined, err) = match (first, second) {
            (Ok(hash), Err(err)) | (Err(err), Ok(hash)) => (hash, err),
            (a, b) => panic!("expected exactly one redemption, got {a:?} and {b:?}"),
        };
        assert!(matches!(
            err,
            ThreadError::Invite(InviteError::Consumed(_)) | ThreadError::ThreadExists(_)
        ));

        let bobs_thread = bob.node.thread(&thread.id).unwrap();
        assert_eq!(bobs_thread.head().unwrap(), Some(joined));
        assert_eq!(bobs_thread.info().unwrap().block_count, 2);
        assert!(bob.node.datastore().unwrap().is_invite_consumed(&invite.id).unwrap());
    }

    #[tokio::test]
    async fn test_wrong_key_releases_claim() {
        let network = Arc::new(MemoryBlockStore::new());
        let alice = test_node_with(network.clone());
        let bob = test_node_with(network);

        let thread = new_thread(&alice.node, "public", true).await;
        let invite = alice.node.add_external_invite(&thread.id).await.unwrap();

        let err = bob
            .node
            .accept_external_invite(&invite.id, &[7u8; 32])
            .await
            .unwrap_err();
        assert!(matches!(err, ThreadError::Invite(InviteError::WrongKey)));
        assert!(!bob.node.datastore().unwrap().is_invite_consumed(&invite.id).unwrap());
        assert!(bob.node.threads().is_empty());

        bob.node.accept_external_invite(&invite.id, &invite.key).await.unwrap();
        assert!(bob.node.datastore().unwrap().is_invite_consumed(&invite.id).unwrap());
    }

    #[tokio::test]
    async fn test_failed_join_discards_thread() {
        let network = Arc::new(MemoryBlockStore::new());
        let alice = test_node_with(network.clone());
        let bob = test_node_with(network);

        let thread = new_thread(&alice.node, "public", true).await;
        let invite = alice.node.add_external_invite(&thread.id).await.unwrap();

        fail_on(&bob.node, "BEFORE INSERT ON blocks");
        let err = bob
            .node
            .accept_external_invite(&invite.id, &invite.key)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Store);
        assert!(bob.node.thread(&thread.id).is_none());
        assert!(bob.node.datastore().unwrap().get_thread(&thread.id).is_err());

        clear_failures(&bob.node);
        bob.node.accept_external_invite(&invite.id, &invite.key).await.unwrap();
        assert!(bob.node.thread(&thread.id).is_some());
    }

    #[tokio::test]
    async fn test_remove_thread() {
        let mut t = test_node();
        let thread = new_thread(&t.node, "leaving", true).await;
        let bob = Identity::generate().peer_id();
        thread.add_peer(bob);

        let leave = t.node.remove_thread(&thread.id).await.unwrap();
        let posted = t.outbox.recv().await.unwrap();
        assert_eq!(posted.hash, leave);
        assert_eq!(posted.recipient, bob);

        assert!(t.node.thread(&thread.id).is_none());
        assert!(t.node.datastore().unwrap().get_thread(&thread.id).is_err());

        let err = t.node.remove_thread(&thread.id).await.unwrap_err();
        assert!(matches!(err, ThreadError::ThreadNotFound(_)));
    }

    #[tokio::test]
    async fn test_bad_block_does_not_stop_batch() {
        let t = test_node();
        let thread = new_thread(&t.node, "batch", true).await;
        let remote = Identity::generate();

        let good = remote_block(
            &remote,
            thread.id,
            thread.head().unwrap(),
            Payload::Message(MessagePayload { body: "ok".into() }),
        );
        let garbage = b"definitely not a block".to_vec();

        let applied = t
            .node
            .handle_blocks(vec![
                (Hash::of(&garbage), garbage),
                (good.hash, good.bytes.clone()),
            ])
            .await;
        assert_eq!(applied, 1);
        assert_eq!(thread.head().unwrap(), Some(good.hash));
    }

    #[tokio::test]
    async fn test_reconcile_after_partial_commit() {
        let t = test_node();
        let thread = new_thread(&t.node, "repair", true).await;

        fail_on(&t.node, "BEFORE UPDATE OF head ON threads");
        let err = thread.add_message("stranded").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PartialCommit);
        clear_failures(&t.node);

        assert_eq!(t.node.reconcile().await.unwrap(), 1);
        assert_eq!(t.node.reconcile().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_loads_threads() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            repo_path: dir.path().to_path_buf(),
            ..NodeConfig::default()
        };
        let identity = Identity::generate();

        let (id, head) = {
            let (transport, _rx) = ChannelTransport::new(8);
            let node = Node::open(&config, identity.clone(), Arc::new(transport)).await.unwrap();
            node.start();
            let thread = new_thread(&node, "durable", true).await;
            thread.add_message("persisted").await.unwrap();
            (thread.id, thread.head().unwrap())
        };

        let (transport, _rx) = ChannelTransport::new(8);
        let node = Node::open(&config, identity, Arc::new(transport)).await.unwrap();
        let thread = node.thread(&id).unwrap();
        assert_eq!(thread.head().unwrap(), head);
        assert_eq!(thread.chain().unwrap().len(), 2);
        assert_eq!(thread.rebuild_roster().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_profile_and_sessions() {
        let t = test_node();
        assert_eq!(t.node.username().unwrap(), None);
        t.node.set_username("alice").unwrap();
        assert_eq!(t.node.username().unwrap().as_deref(), Some("alice"));

        t.node.add_cafe_session("cafe1").unwrap();
        assert_eq!(t.node.cafe_sessions().unwrap().len(), 1);
        assert!(t.node.remove_cafe_session("cafe1").unwrap());
        assert!(t.node.cafe_sessions().unwrap().is_empty());
    }
}
