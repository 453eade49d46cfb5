//! Replication fan-out.
//!
//! Pushes a freshly committed block to every given peer at once.  Delivery is
//! best-effort: failures are logged per recipient and never reach the caller.

use futures::future::join_all;
use tracing::{debug, warn};

use threadlog_shared::types::{Hash, ThreadId};
use threadlog_store::ThreadPeer;

use crate::transport::{Outbound, Transport};

/// Send `bytes` to each recipient.  Returns how many deliveries the
/// transport accepted.
pub async fn post(
    transport: &dyn Transport,
    thread_id: ThreadId,
    hash: Hash,
    bytes: &[u8],
    recipients: &[ThreadPeer],
) -> usize {
    if recipients.is_empty() {
        return 0;
    }

    let sends = recipients.iter().map(|peer| {
        let message = Outbound {
            thread_id,
            hash,
            bytes: bytes.to_vec(),
            recipient: peer.id,
            inboxes: peer.inboxes.clone(),
        };
        async move { (peer.id, transport.send(message).await) }
    });

    let mut delivered = 0;
    for (peer, res) in join_all(sends).await {
        match res {
            Ok(()) => delivered += 1,
            Err(e) => warn!(thread = %thread_id, peer = %peer, hash = %hash, error = %e, "Failed to post block"),
        }
    }

    debug!(
        thread = %thread_id,
        hash = %hash,
        delivered,
        total = recipients.len(),
        "Posted block"
    );
    delivered
}
