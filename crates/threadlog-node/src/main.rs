//! # threadlog-node
//!
//! Runs a single thread-log node:
//! - opens (or creates) the repository at `THREADLOG_REPO_PATH`
//! - loads or generates the node identity
//! - repairs any thread head left stale by an interrupted commit
//! - drains the outbound replication queue until Ctrl+C

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use threadlog_core::{ChannelTransport, Node, NodeConfig};
use threadlog_shared::identity::{Identity, IdentityExport};

const IDENTITY_FILE: &str = "identity.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing (respects RUST_LOG)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,threadlog_core=debug")),
        )
        .init();

    info!("Starting threadlog node v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Configuration and identity
    // -----------------------------------------------------------------------
    let config = NodeConfig::from_env();
    info!(?config, "Loaded configuration");

    std::fs::create_dir_all(&config.repo_path)
        .with_context(|| format!("creating repository at {}", config.repo_path.display()))?;
    let identity = load_or_create_identity(&config.repo_path.join(IDENTITY_FILE))?;

    // -----------------------------------------------------------------------
    // 3. Node
    // -----------------------------------------------------------------------
    let (transport, mut outbox) = ChannelTransport::new(config.outbox_capacity);
    let node = Node::open(&config, identity, Arc::new(transport))
        .await
        .context("opening node")?;
    node.start();
    node.set_online(!config.start_offline);

    let repaired = node.reconcile().await.context("reconciling thread heads")?;
    if repaired > 0 {
        warn!(repaired, "Repaired stale thread heads");
    }
    for thread in node.threads() {
        match thread.info() {
            Ok(info) => info!(
                thread = %info.id,
                name = %info.name,
                kind = info.kind.as_str(),
                blocks = info.block_count,
                peers = info.peer_count,
                "Loaded thread"
            ),
            Err(e) => warn!(thread = %thread.id, error = %e, "Could not read thread"),
        }
    }
    info!(peer = %node.peer_id(), online = node.online(), "Node ready");

    // -----------------------------------------------------------------------
    // 4. Outbound queue
    // -----------------------------------------------------------------------
    // Nothing delivers over the network yet; queued blocks are logged so the
    // queue never fills up.
    let drain = tokio::spawn(async move {
        while let Some(msg) = outbox.recv().await {
            debug!(
                thread = %msg.thread_id,
                hash = %msg.hash,
                recipient = %msg.recipient,
                inboxes = ?msg.inboxes,
                size = msg.bytes.len(),
                "Outbound block"
            );
        }
    });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl+C")?;
    info!("Received Ctrl+C, shutting down");

    node.stop();
    drop(node);
    drain.abort();
    Ok(())
}

fn load_or_create_identity(path: &Path) -> anyhow::Result<Identity> {
    if path.exists() {
        let raw = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        let export: IdentityExport =
            serde_json::from_slice(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let identity = Identity::from_export(&export)
            .with_context(|| format!("loading identity from {}", path.display()))?;
        info!(peer = %identity.peer_id(), "Loaded identity");
        return Ok(identity);
    }

    let identity = Identity::generate();
    let raw = serde_json::to_vec_pretty(&identity.to_export())?;
    std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))?;
    info!(peer = %identity.peer_id(), "Generated new identity");
    Ok(identity)
}
