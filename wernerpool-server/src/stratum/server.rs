//! Stratum TCP server: accept loop and shared pool context.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::node_rpc::NodeRpc;
use crate::stats::StatsStore;
use crate::work::Job;

use super::session;

/// State shared by every session.
pub struct PoolContext {
    /// ASCII marker embedded in each coinbase scriptSig.
    pub pool_tag: String,

    /// Fixed share difficulty assigned to each session at subscribe time.
    pub starting_difficulty: f64,

    pub rpc: Arc<NodeRpc>,
    pub stats: Arc<StatsStore>,

    extranonce_seq: AtomicU32,
}

impl PoolContext {
    pub fn new(
        pool_tag: impl Into<String>,
        starting_difficulty: f64,
        rpc: Arc<NodeRpc>,
        stats: Arc<StatsStore>,
    ) -> Self {
        Self {
            pool_tag: pool_tag.into(),
            starting_difficulty,
            rpc,
            stats,
            extranonce_seq: AtomicU32::new(1),
        }
    }

    /// Next extranonce1. The counter only moves forward, so concurrently
    /// connected sessions can never collide.
    pub fn next_extranonce1(&self) -> u32 {
        self.extranonce_seq.fetch_add(1, Ordering::Relaxed)
    }
}

pub struct StratumServer {
    listener: TcpListener,
    ctx: Arc<PoolContext>,
    jobs: watch::Receiver<Option<Arc<Job>>>,
    session_seq: AtomicU64,
}

impl StratumServer {
    /// Bind the Stratum port. Failure here is fatal for the process.
    pub async fn bind(
        port: u16,
        ctx: Arc<PoolContext>,
        jobs: watch::Receiver<Option<Arc<Job>>>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .with_context(|| format!("failed to bind Stratum port {port}"))?;
        Ok(Self {
            listener,
            ctx,
            jobs,
            session_seq: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self, shutdown: CancellationToken) {
        match self.local_addr() {
            Ok(addr) => info!(%addr, "Stratum server listening"),
            Err(_) => info!("Stratum server listening"),
        }

        let tracker = TaskTracker::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let id = self.session_seq.fetch_add(1, Ordering::Relaxed);
                        info!(session = id, %peer, "Miner connected");
                        tracker.spawn(session::run(
                            id,
                            stream,
                            peer,
                            self.ctx.clone(),
                            self.jobs.clone(),
                            shutdown.clone(),
                        ));
                    }
                    Err(error) => warn!(error = %error, "Failed to accept connection"),
                },
                _ = shutdown.cancelled() => break,
            }
        }

        tracker.close();
        tracker.wait().await;
    }
}
