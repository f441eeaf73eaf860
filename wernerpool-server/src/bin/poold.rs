use std::sync::Arc;

use tokio::signal::unix::{self, SignalKind};
use tokio::sync::watch;
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use wernerpool_server::config::Config;
use wernerpool_server::node_rpc::NodeRpc;
use wernerpool_server::stats::StatsStore;
use wernerpool_server::stratum::{PoolContext, StratumServer};
use wernerpool_server::tracing::{self, prelude::*};
use wernerpool_server::work::TemplateManager;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing::init();

    let config = Config::from_env()?;
    let rpc = Arc::new(NodeRpc::new(&config.node));
    let stats = Arc::new(StatsStore::new());

    match rpc.get_blockchain_info().await {
        Ok(info) => info!(
            chain = info.get("chain").and_then(|v| v.as_str()).unwrap_or("?"),
            blocks = info.get("blocks").and_then(|v| v.as_u64()).unwrap_or(0),
            "Connected to node"
        ),
        Err(error) => warn!(
            error = %error,
            "Node unreachable, template fetches will keep retrying"
        ),
    }

    let (job_tx, job_rx) = watch::channel(None);
    let running = CancellationToken::new();
    let tracker = TaskTracker::new();

    tracker.spawn(TemplateManager::new(rpc.clone(), job_tx).run(running.clone()));
    tracker.close();

    let ctx = Arc::new(PoolContext::new(
        config.pool_name.clone(),
        config.starting_difficulty,
        rpc,
        stats,
    ));
    let server = StratumServer::bind(config.stratum_port, ctx, job_rx).await?;
    info!(
        port = config.stratum_port,
        pool = %config.pool_name,
        network = %config.network,
        difficulty = config.starting_difficulty,
        "Started."
    );
    let mut server_task = tokio::spawn(server.run(running.clone()));

    let mut sigint = unix::signal(SignalKind::interrupt())?;
    let mut sigterm = unix::signal(SignalKind::terminate())?;
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
        result = &mut server_task => {
            running.cancel();
            tracker.wait().await;
            result?;
            anyhow::bail!("stratum server exited unexpectedly");
        }
    }

    trace!("Shutting down.");
    running.cancel();
    let _ = (&mut server_task).await;
    tracker.wait().await;
    info!("Exiting.");
    Ok(())
}
