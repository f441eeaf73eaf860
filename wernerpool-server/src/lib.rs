//! WernerPool: a solo Bitcoin mining pool server.
//!
//! Speaks Stratum v1 to ASIC miners over TCP, brokers work from a local
//! full node's `getblocktemplate`, validates submitted shares as
//! proof-of-work candidates, and submits network-difficulty shares back to
//! the node as blocks. Every miner is credited individually: a found block
//! pays the full coinbase reward to that miner's own address.

pub mod config;
pub mod node_rpc;
pub mod stats;
pub mod stratum;
pub mod tracing;
pub mod types;
mod u256;
pub mod validator;
pub mod work;
