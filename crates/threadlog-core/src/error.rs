use thiserror::Error;

use threadlog_shared::error::{CodecError, CryptoError};
use threadlog_shared::invite::InviteError;
use threadlog_shared::types::{Hash, ThreadId};
use threadlog_store::StoreError;

use crate::block_store::BlockStoreError;

#[derive(Error, Debug)]
pub enum ThreadError {
    #[error("Node is not started")]
    Stopped,

    #[error("Node is offline")]
    Offline,

    #[error("Thread not found: {0}")]
    ThreadNotFound(ThreadId),

    #[error("Thread already exists: {0}")]
    ThreadExists(ThreadId),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("Block store error: {0}")]
    BlockStore(#[from] BlockStoreError),

    #[error("Index error: {0}")]
    Index(#[from] StoreError),

    /// The block is stored and indexed but the head still points at its
    /// parent.  The thread needs [`Thread::reconcile_head`] before further
    /// commits can be trusted to link correctly.
    ///
    /// [`Thread::reconcile_head`]: crate::Thread::reconcile_head
    #[error("Head of {thread_id} not advanced to indexed block {hash}: {source}")]
    PartialCommit {
        thread_id: ThreadId,
        hash: Hash,
        #[source]
        source: StoreError,
    },

    #[error("Invite error: {0}")]
    Invite(#[from] InviteError),

    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Datastore lock poisoned")]
    LockPoisoned,
}

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Checked before any mutation; nothing changed.
    Precondition,
    /// A single block was rejected.
    Codec,
    /// Commit aborted before the head moved.
    Store,
    /// Block indexed but head not advanced; reconcile the thread.
    PartialCommit,
    Invite,
    Internal,
}

impl ThreadError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Stopped | Self::Offline | Self::ThreadNotFound(_) | Self::ThreadExists(_) => {
                ErrorKind::Precondition
            }
            Self::Codec(_) => ErrorKind::Codec,
            Self::BlockStore(_) | Self::Index(_) => ErrorKind::Store,
            Self::PartialCommit { .. } => ErrorKind::PartialCommit,
            Self::Invite(_) => ErrorKind::Invite,
            Self::Crypto(_) | Self::LockPoisoned => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, ThreadError>;
