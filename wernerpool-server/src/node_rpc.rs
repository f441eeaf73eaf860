//! JSON-RPC client for the backing full node.
//!
//! The node is trusted: responses are deserialized, not re-validated. All
//! calls share one `reqwest` client, whose connection pool and default
//! timeout are the only backpressure and give-up points. A timed-out or
//! failed call surfaces as an error for the caller to log; nothing here
//! retries.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;

use crate::config::NodeConfig;
use crate::work::BlockTemplate;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("node error {code}: {message}")]
    Node { code: i64, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}

#[derive(Debug, serde::Deserialize)]
struct Envelope {
    /// `submitblock` signals acceptance with a JSON null result.
    #[serde(default)]
    result: Value,
    error: Option<NodeError>,
}

#[derive(Debug, serde::Deserialize)]
struct NodeError {
    code: i64,
    message: String,
}

pub struct NodeRpc {
    client: reqwest::Client,
    url: String,
    user: String,
    password: String,
    next_id: AtomicU64,
}

impl NodeRpc {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: format!("http://{}:{}/", config.host, config.port),
            user: config.user.clone(),
            password: config.password.clone(),
            next_id: AtomicU64::new(1),
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "1.0",
            "id": id,
            "method": method,
            "params": params,
        });

        // Bitcoin Core reports RPC-level errors with a non-2xx status and a
        // regular envelope body, so the body is parsed unconditionally.
        let envelope: Envelope = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = envelope.error {
            return Err(RpcError::Node {
                code: error.code,
                message: error.message,
            });
        }
        serde_json::from_value(envelope.result).map_err(|e| RpcError::Malformed(e.to_string()))
    }

    /// Fetch a template with the segwit rule enabled.
    pub async fn get_block_template(&self) -> Result<BlockTemplate, RpcError> {
        self.call("getblocktemplate", json!([{ "rules": ["segwit"] }]))
            .await
    }

    /// Submit a serialized block. `None` means the node accepted it;
    /// `Some(reason)` is the node's rejection string.
    pub async fn submit_block(&self, block_hex: &str) -> Result<Option<String>, RpcError> {
        let result: Value = self.call("submitblock", json!([block_hex])).await?;
        Ok(match result {
            Value::Null => None,
            Value::String(reason) => Some(reason),
            other => Some(other.to_string()),
        })
    }

    pub async fn get_blockchain_info(&self) -> Result<Value, RpcError> {
        self.call("getblockchaininfo", json!([])).await
    }

    pub async fn get_mining_info(&self) -> Result<Value, RpcError> {
        self.call("getmininginfo", json!([])).await
    }

    pub async fn get_network_hashps(&self) -> Result<f64, RpcError> {
        self.call("getnetworkhashps", json!([])).await
    }

    pub async fn get_mempool_info(&self) -> Result<Value, RpcError> {
        self.call("getmempoolinfo", json!([])).await
    }
}
