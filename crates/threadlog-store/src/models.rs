//! Records persisted in the local thread index.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use threadlog_shared::block::BlockType;
use threadlog_shared::crypto::SymmetricKey;
use threadlog_shared::types::{Hash, PeerId, ThreadId, ThreadKind};

// ---------------------------------------------------------------------------
// Thread
// ---------------------------------------------------------------------------

/// A locally known thread.  Holds key material, so it is never handed out
/// over any serialization boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRecord {
    /// Public half of the thread's signing key.
    pub id: ThreadId,
    /// Caller-chosen key the thread was created under.
    pub key: String,
    /// Human-readable name.
    pub name: String,
    /// Ed25519 secret of the thread's own key pair.
    pub secret: [u8; 32],
    /// Symmetric key handed to members through invites.
    pub sym_key: SymmetricKey,
    /// Content hash of the schema the thread's data follows, if any.
    pub schema: Option<Hash>,
    /// Peer that created the thread.
    pub initiator: PeerId,
    pub kind: ThreadKind,
    /// Content hash of the latest block, `None` before the first commit.
    pub head: Option<Hash>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Block index
// ---------------------------------------------------------------------------

/// Metadata for one indexed block.  Written once and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    pub hash: Hash,
    pub thread_id: ThreadId,
    pub kind: BlockType,
    pub parent: Option<Hash>,
    pub author: PeerId,
    /// Date from the block header (author's clock).
    pub date: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Roster
// ---------------------------------------------------------------------------

/// A member of a thread other than the local node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadPeer {
    pub id: PeerId,
    pub thread_id: ThreadId,
    pub username: Option<String>,
    /// Cafe (relay/mailbox) ids the peer can be reached through.
    pub inboxes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Cafe sessions
// ---------------------------------------------------------------------------

/// An active session with a cafe, i.e. an inbox other peers can reach us at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CafeSession {
    pub cafe_id: String,
    pub created_at: DateTime<Utc>,
}
