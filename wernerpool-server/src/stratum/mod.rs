//! Stratum v1 mining server.
//!
//! The wire is JSON-RPC-ish: newline-delimited JSON objects over TCP.
//! Clients walk a small state machine---`mining.configure` (optional),
//! `mining.subscribe`, `mining.authorize`---before they may submit shares,
//! because the coinbase cannot be built until the payout address inside the
//! username is known. Error replies use the legacy code map: 20 internal,
//! 23 low-difficulty share, 24 unauthorized worker.
//!
//! Each connection runs as its own actor task (see [`session`]); the accept
//! loop and the state shared between sessions live in [`server`].

pub mod messages;
pub mod server;
pub mod session;

pub use server::{PoolContext, StratumServer};
