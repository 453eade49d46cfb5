//! # threadlog-core
//!
//! Append-only replicated thread logs.
//!
//! A [`Node`] owns a set of [`Thread`]s.  Each thread is a chain of signed,
//! content-addressed blocks kept in a [`BlockStore`] and indexed in the local
//! [`threadlog_store::Database`].  Every chain-extending operation on a
//! thread runs under that thread's own lock, so one thread never has two
//! commits in flight while distinct threads never contend.

pub mod block_store;
pub mod config;
pub mod error;
pub mod fanout;
pub mod node;
pub mod thread;
pub mod transport;

mod chain;
mod invites;
mod joins;
mod roster;

#[cfg(test)]
mod test_utils;

pub use block_store::{BlockStore, BlockStoreError, FsBlockStore, MemoryBlockStore};
pub use chain::Ingested;
pub use config::{AddThreadConfig, NodeConfig};
pub use error::{ErrorKind, ThreadError};
pub use node::Node;
pub use thread::{Thread, ThreadInfo};
pub use transport::{ChannelTransport, Outbound, Transport, TransportError};
