//! Block template snapshots and the refresh task that publishes jobs.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::node_rpc::NodeRpc;

use super::job::Job;

/// How often the node is asked for a fresh template.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(10);

/// Snapshot of one `getblocktemplate` response.
///
/// Immutable once taken; a refresh replaces the whole template rather than
/// patching it. Only the fields the work pipeline consumes are kept.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockTemplate {
    pub version: i32,

    #[serde(rename = "previousblockhash")]
    pub previous_block_hash: String,

    #[serde(default)]
    pub transactions: Vec<TemplateTx>,

    /// Total coinbase value in satoshis, subsidy plus fees.
    #[serde(rename = "coinbasevalue")]
    pub coinbase_value: u64,

    /// Compact nBits, hex, verbatim from the node.
    pub bits: String,

    pub height: u64,

    pub curtime: u32,

    /// Expanded target, hex; kept only to cross-check `bits`.
    #[serde(default)]
    pub target: String,
}

/// One non-coinbase transaction of the template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateTx {
    /// Raw serialized transaction, hex, appended verbatim to a block.
    pub data: String,

    /// Non-witness transaction id, node-endian hex.
    pub txid: String,

    /// Witness transaction id, node-endian hex.
    pub hash: String,
}

/// Polls the node and publishes the current [`Job`].
///
/// Publication goes through a `watch` channel: readers either see the
/// previous job or the fully constructed new one, never anything in
/// between, and every subscribed session wakes on the change to broadcast
/// `mining.notify` with `clean_jobs = true`. A failed refresh leaves the
/// previous job in place; the next tick retries.
pub struct TemplateManager {
    rpc: Arc<NodeRpc>,
    jobs: watch::Sender<Option<Arc<Job>>>,
    next_job_id: u32,
}

impl TemplateManager {
    pub fn new(rpc: Arc<NodeRpc>, jobs: watch::Sender<Option<Arc<Job>>>) -> Self {
        Self {
            rpc,
            jobs,
            next_job_id: 1,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = self.refresh().await {
                        warn!(error = %error, "Template refresh failed, keeping the previous job");
                    }
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn refresh(&mut self) -> anyhow::Result<()> {
        let template = Arc::new(self.rpc.get_block_template().await?);

        let id = self.next_job_id;
        self.next_job_id = self.next_job_id.wrapping_add(1);
        let job = Arc::new(Job::derive(id, template)?);

        info!(
            job_id = %job.id,
            height = job.template.height,
            transactions = job.template.transactions.len(),
            value_sats = job.template.coinbase_value,
            "Published new job"
        );
        self.jobs.send_replace(Some(job));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_deserializes_from_node_json() {
        let json = serde_json::json!({
            "version": 536870912i64,
            "previousblockhash":
                "00000000000000000002b7e9c7b2aee1e4d4d1a0b28c23f0d0a81c17a1dcdd06",
            "transactions": [{
                "data": "0200000001abcd",
                "txid": "a6f07f0c92b4b4a44fbcd5e64f42f2c9ddd55c3bb6bd4a2e1b9f1f8b7a3d2c1e",
                "hash": "b7e18e1da3c5c5b55fcde6f75a53a3dacee66d4cc7ce5b3f2caf2a9c8b4e3d2f",
                "fee": 1000
            }],
            "coinbasevalue": 312_500_000u64,
            "bits": "17034219",
            "height": 840_000u64,
            "curtime": 1713571200u32,
            "target": "0000000000000000000342190000000000000000000000000000000000000000",
            "mintime": 1713570000u32,
            "mutable": ["time", "transactions", "prevblock"]
        });

        let template: BlockTemplate = serde_json::from_value(json).unwrap();
        assert_eq!(template.height, 840_000);
        assert_eq!(template.bits, "17034219");
        assert_eq!(template.transactions.len(), 1);
        assert_eq!(template.transactions[0].data, "0200000001abcd");
    }

    #[test]
    fn transactions_default_to_empty() {
        let json = serde_json::json!({
            "version": 536870912i64,
            "previousblockhash":
                "00000000000000000002b7e9c7b2aee1e4d4d1a0b28c23f0d0a81c17a1dcdd06",
            "coinbasevalue": 312_500_000u64,
            "bits": "17034219",
            "height": 840_000u64,
            "curtime": 1713571200u32
        });

        let template: BlockTemplate = serde_json::from_value(json).unwrap();
        assert!(template.transactions.is_empty());
        assert!(template.target.is_empty());
    }
}
