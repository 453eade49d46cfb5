use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use threadlog_shared::block::{Block, BlockHeader, Payload, SealedBlock};
use threadlog_shared::identity::Identity;
use threadlog_shared::types::{Hash, PeerId, ThreadId, ThreadKind};
use threadlog_store::Database;

use crate::block_store::{BlockStore, BlockStoreError, MemoryBlockStore};
use crate::config::AddThreadConfig;
use crate::node::Node;
use crate::thread::{NodeContext, Thread};
use crate::transport::{ChannelTransport, Outbound};

/// A started, online node over a temporary index.
pub struct TestNode {
    pub node: Node,
    pub blocks: Arc<MemoryBlockStore>,
    pub outbox: mpsc::Receiver<Outbound>,
    _dir: TempDir,
}

pub fn test_node() -> TestNode {
    test_node_with(Arc::new(MemoryBlockStore::new()))
}

/// Nodes built over the same `blocks` see each other's blocks, as peers
/// sharing a content-addressed network would.
pub fn test_node_with(blocks: Arc<MemoryBlockStore>) -> TestNode {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_at(&dir.path().join("threadlog.db")).unwrap();
    let (transport, outbox) = ChannelTransport::new(64);
    let node = Node::new(
        Identity::generate(),
        db,
        blocks.clone(),
        Arc::new(transport),
    )
    .unwrap();
    node.start();
    node.set_online(true);
    TestNode {
        node,
        blocks,
        outbox,
        _dir: dir,
    }
}

pub fn thread_config(key: &str, initiator: PeerId, join: bool) -> AddThreadConfig {
    AddThreadConfig {
        key: key.to_string(),
        name: format!("{key} thread"),
        schema: None,
        initiator,
        kind: ThreadKind::Open,
        join,
    }
}

pub async fn new_thread(node: &Node, key: &str, join: bool) -> Arc<Thread> {
    node.add_thread(Identity::generate(), thread_config(key, node.peer_id(), join))
        .await
        .unwrap()
}

/// A block as another peer would have built it.
pub fn remote_block(author: &Identity, thread_id: ThreadId, parent: Option<Hash>, payload: Payload) -> SealedBlock {
    Block::new(BlockHeader::new(thread_id, author.peer_id(), parent), payload)
        .seal(author)
        .unwrap()
}

static TRIGGERS: AtomicUsize = AtomicUsize::new(0);

/// Make every statement matching `event` (e.g. `BEFORE INSERT ON blocks`)
/// abort.
pub fn fail_on(node: &Node, event: &str) {
    let n = TRIGGERS.fetch_add(1, Ordering::SeqCst);
    node.datastore()
        .unwrap()
        .conn()
        .execute_batch(&format!(
            "CREATE TRIGGER inject_fail_{n} {event} BEGIN SELECT RAISE(ABORT, 'injected failure'); END;"
        ))
        .unwrap();
}

pub fn clear_failures(node: &Node) {
    let db = node.datastore().unwrap();
    let names = {
        let mut stmt = db
            .conn()
            .prepare("SELECT name FROM sqlite_master WHERE type = 'trigger' AND name LIKE 'inject_fail_%'")
            .unwrap();
        let rows = stmt.query_map([], |row| row.get::<_, String>(0)).unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    };
    for name in names {
        db.conn().execute_batch(&format!("DROP TRIGGER {name};")).unwrap();
    }
}

/// A block store whose writes always fail.
pub struct FailingBlockStore;

#[async_trait]
impl BlockStore for FailingBlockStore {
    async fn put(&self, _bytes: &[u8]) -> Result<Hash, BlockStoreError> {
        Err(BlockStoreError::Io("injected failure".into()))
    }

    async fn get(&self, hash: &Hash) -> Result<Vec<u8>, BlockStoreError> {
        Err(BlockStoreError::NotFound(*hash))
    }

    async fn has(&self, _hash: &Hash) -> Result<bool, BlockStoreError> {
        Ok(false)
    }
}

/// The same thread, index and identity, seen through another block store.
pub fn rebind_blocks(thread: &Thread, blocks: Arc<dyn BlockStore>) -> Thread {
    let ctx = Arc::new(NodeContext {
        identity: thread.ctx.identity.clone(),
        datastore: Arc::clone(&thread.ctx.datastore),
        blocks,
        transport: Arc::clone(&thread.ctx.transport),
    });
    let record = thread.ctx.db().unwrap().get_thread(&thread.id).unwrap();
    Thread::from_record(&record, ctx)
}
