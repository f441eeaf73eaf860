//! In-memory statistics collaborator.
//!
//! The pool core emits share and block events here; the store keeps live
//! per-session snapshots plus per-address lifetime aggregates for the
//! status layer to read. Persistence is someone else's job; everything in
//! this module is process-lifetime state behind locks, and every read is a
//! copy-out so no caller ever holds a lock across I/O.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;
use tracing::{debug, info};

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Copy-out view of one connected worker.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub address: String,
    pub worker: String,
    pub hashrate: f64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub best_difficulty: f64,
    pub last_share_ms: Option<u64>,
    pub connected_at_ms: u64,
}

/// Lifetime aggregates for one payout address.
#[derive(Debug, Clone, Default)]
pub struct AddressTotals {
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub best_difficulty: f64,
    pub blocks_found: u64,
}

#[derive(Debug, Clone)]
pub struct FoundBlock {
    pub address: String,
    pub worker: String,
    pub height: u64,
    pub found_at_ms: u64,
}

#[derive(Default)]
pub struct StatsStore {
    sessions: RwLock<HashMap<u64, WorkerSnapshot>>,
    totals: RwLock<HashMap<String, AddressTotals>>,
    blocks: RwLock<Vec<FoundBlock>>,
}

impl StatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the snapshot for a session. Sessions push a fresh
    /// copy after every state change; the store never reaches into live
    /// session state.
    pub fn update_session(&self, session_id: u64, snapshot: WorkerSnapshot) {
        self.sessions.write().insert(session_id, snapshot);
    }

    pub fn remove_session(&self, session_id: u64) {
        self.sessions.write().remove(&session_id);
    }

    pub fn record_share(
        &self,
        address: &str,
        worker: &str,
        difficulty: f64,
        accepted: bool,
        timestamp_ms: u64,
    ) {
        debug!(address, worker, difficulty, accepted, timestamp_ms, "Share recorded");
        let mut totals = self.totals.write();
        let entry = totals.entry(address.to_string()).or_default();
        if accepted {
            entry.shares_accepted += 1;
        } else {
            entry.shares_rejected += 1;
        }
    }

    pub fn update_best_difficulty(&self, address: &str, difficulty: f64) {
        let mut totals = self.totals.write();
        let entry = totals.entry(address.to_string()).or_default();
        if difficulty > entry.best_difficulty {
            entry.best_difficulty = difficulty;
        }
    }

    pub fn record_block_found(&self, address: &str, worker: &str, height: u64) {
        info!(address, worker, height, "Block found");
        self.totals
            .write()
            .entry(address.to_string())
            .or_default()
            .blocks_found += 1;
        self.blocks.write().push(FoundBlock {
            address: address.to_string(),
            worker: worker.to_string(),
            height,
            found_at_ms: now_ms(),
        });
    }

    pub fn snapshot_sessions(&self) -> Vec<WorkerSnapshot> {
        self.sessions.read().values().cloned().collect()
    }

    pub fn address_totals(&self, address: &str) -> Option<AddressTotals> {
        self.totals.read().get(address).cloned()
    }

    pub fn blocks_found(&self) -> Vec<FoundBlock> {
        self.blocks.read().clone()
    }
}
