//! Environment-driven configuration.
//!
//! The pool keeps no state of its own, so configuration is a handful of
//! environment variables read once at startup. Anything unparseable is a
//! startup failure rather than a silently applied default.

use std::env;

use anyhow::{Context, Result, bail};

pub const DEFAULT_STRATUM_PORT: u16 = 3333;
pub const DEFAULT_POOL_NAME: &str = "WERNERPOOL";
pub const DEFAULT_DIFFICULTY: f64 = 64.0;
pub const DEFAULT_NETWORK: &str = "mainnet";
pub const DEFAULT_NODE_RPC_PORT: u16 = 8332;

/// Connection details for the backing full node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    /// TCP port the Stratum server listens on (`STRATUM_PORT`).
    pub stratum_port: u16,

    /// ASCII marker written into every coinbase scriptSig (`POOL_NAME`).
    pub pool_name: String,

    /// Fixed per-session share difficulty (`DIFFICULTY`).
    pub starting_difficulty: f64,

    /// Network label, informational only (`NETWORK`).
    pub network: String,

    /// Node RPC endpoint (`NODE_RPC_HOST`/`PORT`/`USER`/`PASSWORD`).
    pub node: NodeConfig,
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let stratum_port = match var("STRATUM_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("STRATUM_PORT {raw:?} is not a port number"))?,
            None => DEFAULT_STRATUM_PORT,
        };

        let pool_name = var("POOL_NAME").unwrap_or_else(|| DEFAULT_POOL_NAME.to_string());
        // The marker lives inside the coinbase scriptSig, which tops out at
        // 100 bytes including the height push and extranonce region.
        if pool_name.len() > 64 || !pool_name.is_ascii() || pool_name.contains('/') {
            bail!("POOL_NAME must be ASCII without '/' and at most 64 bytes");
        }

        let starting_difficulty = match var("DIFFICULTY") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("DIFFICULTY {raw:?} is not a number"))?,
            None => DEFAULT_DIFFICULTY,
        };
        if !(starting_difficulty > 0.0) {
            bail!("DIFFICULTY must be positive");
        }

        let node_port = match var("NODE_RPC_PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("NODE_RPC_PORT {raw:?} is not a port number"))?,
            None => DEFAULT_NODE_RPC_PORT,
        };

        Ok(Self {
            stratum_port,
            pool_name,
            starting_difficulty,
            network: var("NETWORK").unwrap_or_else(|| DEFAULT_NETWORK.to_string()),
            node: NodeConfig {
                host: var("NODE_RPC_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
                port: node_port,
                user: var("NODE_RPC_USER").context("NODE_RPC_USER is required")?,
                password: var("NODE_RPC_PASSWORD").context("NODE_RPC_PASSWORD is required")?,
            },
        })
    }
}
