//! Outbound delivery of blocks to thread peers.
//!
//! The node never waits on remote acknowledgement: a [`Transport`] accepts a
//! block for one recipient and is done.  Retry and backoff, if any, belong to
//! whatever drains the transport.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use threadlog_shared::types::{Hash, PeerId, ThreadId};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport channel closed")]
    Closed,

    #[error("Peer {0} is unreachable")]
    Unreachable(PeerId),
}

/// A block addressed to one peer.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub thread_id: ThreadId,
    pub hash: Hash,
    pub bytes: Vec<u8>,
    pub recipient: PeerId,
    /// Cafe inboxes to fall back on when the recipient is offline.
    pub inboxes: Vec<String>,
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: Outbound) -> Result<(), TransportError>;
}

/// Hands outbound blocks to a background task over a bounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::Sender<Outbound>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: Outbound) -> Result<(), TransportError> {
        self.tx.send(message).await.map_err(|_| TransportError::Closed)
    }
}
