//! Per-connection Stratum session actor.
//!
//! Each TCP connection gets one task that owns all of the session's state:
//! protocol flags, counters, and the hashrate estimate. Inbound lines are
//! handled strictly in order, so `set_difficulty` always precedes the first
//! `notify`, which precedes any submit response. Outbound traffic goes
//! through a bounded queue drained by a small writer task; when the socket
//! closes, pending writes are abandoned and the session disappears from the
//! active set.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use serde_json::{Value, json};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::stats::{WorkerSnapshot, now_ms};
use crate::stratum::messages::{self, Method, Request, StratumError, SubmitParams};
use crate::types::HashrateEma;
use crate::validator::{self, AcceptedShare, BlockCandidate, SubmitError, VERSION_ROLLING_MASK};
use crate::work::Job;
use crate::work::address;

use super::server::PoolContext;

/// Bytes of extranonce2 the miner may roll.
pub const EXTRANONCE2_SIZE: usize = 4;

const MAX_LINE_LEN: usize = 16 * 1024;
const OUTBOUND_QUEUE: usize = 64;

/// Drive one connection to completion.
pub(crate) async fn run(
    id: u64,
    stream: TcpStream,
    peer: SocketAddr,
    ctx: Arc<PoolContext>,
    jobs: watch::Receiver<Option<Arc<Job>>>,
    shutdown: CancellationToken,
) {
    if let Err(error) = stream.set_nodelay(true) {
        debug!(%peer, error = %error, "Failed to set TCP_NODELAY");
    }
    let (read_half, write_half) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel(OUTBOUND_QUEUE);
    let writer = tokio::spawn(write_lines(write_half, out_rx));

    let mut session = Session::new(id, ctx, jobs, out_tx);
    session.serve(read_half, peer, shutdown).await;

    session.ctx.stats.remove_session(id);
    writer.abort();
    debug!(session = id, %peer, "Session closed");
}

async fn write_lines(write_half: OwnedWriteHalf, mut rx: mpsc::Receiver<String>) {
    let mut writer = BufWriter::new(write_half);
    while let Some(line) = rx.recv().await {
        if writer.write_all(line.as_bytes()).await.is_err()
            || writer.write_all(b"\n").await.is_err()
            || writer.flush().await.is_err()
        {
            return;
        }
    }
}

struct Session {
    id: u64,
    ctx: Arc<PoolContext>,
    jobs: watch::Receiver<Option<Arc<Job>>>,
    out: mpsc::Sender<String>,

    extranonce1: Option<u32>,
    difficulty: f64,
    subscribed: bool,
    authorized: bool,
    version_rolling: bool,

    address: Option<String>,
    worker_name: String,
    payout_script: Vec<u8>,

    shares_accepted: u64,
    shares_rejected: u64,
    best_difficulty: f64,
    connected_at: Instant,
    connected_at_ms: u64,
    last_share_ms: Option<u64>,
    last_accepted_at: Option<Instant>,
    hashrate: HashrateEma,
}

impl Session {
    fn new(
        id: u64,
        ctx: Arc<PoolContext>,
        jobs: watch::Receiver<Option<Arc<Job>>>,
        out: mpsc::Sender<String>,
    ) -> Self {
        let difficulty = ctx.starting_difficulty;
        Self {
            id,
            ctx,
            jobs,
            out,
            extranonce1: None,
            difficulty,
            subscribed: false,
            authorized: false,
            version_rolling: false,
            address: None,
            worker_name: "default".to_string(),
            payout_script: Vec::new(),
            shares_accepted: 0,
            shares_rejected: 0,
            best_difficulty: 0.0,
            connected_at: Instant::now(),
            connected_at_ms: now_ms(),
            last_share_ms: None,
            last_accepted_at: None,
            hashrate: HashrateEma::new(),
        }
    }

    async fn serve(
        &mut self,
        read_half: OwnedReadHalf,
        peer: SocketAddr,
        shutdown: CancellationToken,
    ) {
        let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LEN));
        loop {
            tokio::select! {
                line = lines.next() => match line {
                    Some(Ok(line)) => self.handle_line(&line).await,
                    Some(Err(error)) => {
                        debug!(session = self.id, %peer, error = %error, "Closing on read error");
                        break;
                    }
                    None => break,
                },
                changed = self.jobs.changed() => {
                    if changed.is_err() {
                        // Template manager gone; the process is shutting down.
                        break;
                    }
                    self.announce_current_job(true).await;
                }
                _ = shutdown.cancelled() => break,
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(error) => {
                debug!(session = self.id, error = %error, "Discarding malformed line");
                return;
            }
        };

        match Method::from(request.method.as_str()) {
            Method::Configure => self.handle_configure(&request).await,
            Method::Subscribe => self.handle_subscribe(&request).await,
            Method::Authorize => self.handle_authorize(&request).await,
            Method::Submit => self.handle_submit(&request).await,
            Method::ExtranonceSubscribe => {
                self.respond(&request.id, Value::Bool(true)).await;
            }
            Method::SuggestDifficulty => {
                // Difficulty is fixed at subscribe time; acknowledged, not applied.
                debug!(session = self.id, "Ignoring mining.suggest_difficulty");
                self.respond(&request.id, Value::Bool(true)).await;
            }
            Method::Unknown(name) => {
                debug!(session = self.id, method = %name, "Acknowledging unknown method");
                if request.id.is_some() {
                    self.respond(&request.id, Value::Bool(true)).await;
                }
            }
        }
    }

    /// `mining.configure`: grant version rolling with our fixed mask,
    /// acknowledge everything else with defaults. Never fails the
    /// connection.
    async fn handle_configure(&mut self, request: &Request) {
        let mut result = serde_json::Map::new();
        let extensions = request
            .params
            .first()
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for extension in extensions.iter().filter_map(Value::as_str) {
            if extension == "version-rolling" {
                self.version_rolling = true;
                result.insert("version-rolling".into(), json!(true));
                result.insert(
                    "version-rolling.mask".into(),
                    json!(format!("{:08x}", VERSION_ROLLING_MASK)),
                );
            } else {
                result.insert(extension.into(), json!(true));
            }
        }
        self.respond(&request.id, Value::Object(result)).await;
    }

    /// `mining.subscribe`: hand out extranonce1 and push the starting
    /// difficulty. No notify yet; the payout address is still unknown.
    async fn handle_subscribe(&mut self, request: &Request) {
        let extranonce1 = match self.extranonce1 {
            Some(value) => value,
            None => {
                let value = self.ctx.next_extranonce1();
                self.extranonce1 = Some(value);
                value
            }
        };
        self.subscribed = true;

        let extranonce1_hex = format!("{:08x}", extranonce1);
        self.respond(
            &request.id,
            messages::subscribe_result(&extranonce1_hex, EXTRANONCE2_SIZE),
        )
        .await;
        self.send(messages::set_difficulty(self.difficulty)).await;
    }

    /// `mining.authorize`: split `address.worker`, derive the payout
    /// script, and send the first notify if work is available.
    async fn handle_authorize(&mut self, request: &Request) {
        if !self.subscribed {
            self.respond_error(&request.id, StratumError::Internal).await;
            return;
        }
        let Some(username) = request.params.first().and_then(Value::as_str) else {
            self.respond_error(&request.id, StratumError::Internal).await;
            return;
        };

        let (address, worker) = match username.split_once('.') {
            Some((address, worker)) if !worker.is_empty() => {
                (address.to_string(), worker.to_string())
            }
            Some((address, _)) => (address.to_string(), "default".to_string()),
            None => (username.to_string(), "default".to_string()),
        };

        self.payout_script = address::script_pubkey(&address);
        if self.payout_script == [0x6a] {
            warn!(
                session = self.id,
                address = %address,
                "Unrecognized payout address, this miner's rewards will be burned"
            );
        }

        info!(session = self.id, address = %address, worker = %worker, "Worker authorized");
        self.address = Some(address);
        self.worker_name = worker;
        self.authorized = true;

        self.respond(&request.id, Value::Bool(true)).await;
        self.push_stats();
        self.announce_current_job(true).await;
    }

    async fn handle_submit(&mut self, request: &Request) {
        if !self.authorized {
            self.respond_error(&request.id, StratumError::Unauthorized)
                .await;
            return;
        }
        let Some(submit) = SubmitParams::from_params(&request.params) else {
            self.respond_error(&request.id, StratumError::Internal).await;
            return;
        };
        let (Some(extranonce1), true) = (self.extranonce1, self.subscribed) else {
            self.respond_error(&request.id, StratumError::Internal).await;
            return;
        };

        let Some(job) = self.jobs.borrow().clone() else {
            debug!(session = self.id, "Share submitted before any job was published");
            self.reject(&request.id, StratumError::Internal, 0.0).await;
            return;
        };

        let builder = job.coinbase_builder(self.payout_script.clone(), &self.ctx.pool_tag);
        let mask = self.version_rolling.then_some(VERSION_ROLLING_MASK);
        match validator::evaluate(&job, &builder, extranonce1, self.difficulty, mask, &submit) {
            Ok(accepted) => {
                self.respond(&request.id, Value::Bool(true)).await;
                self.account_accepted(&accepted);
                if let Some(block) = accepted.block {
                    self.submit_block(block);
                }
            }
            Err(SubmitError::LowDifficulty { share, session }) => {
                debug!(
                    session = self.id,
                    share_difficulty = share,
                    session_difficulty = session,
                    "Low difficulty share"
                );
                self.reject(&request.id, StratumError::LowDifficulty, share)
                    .await;
            }
            Err(SubmitError::UnknownJob(job_id)) => {
                debug!(
                    session = self.id,
                    job_id = %job_id,
                    "Share quotes an unknown or superseded job"
                );
                self.reject(&request.id, StratumError::Internal, 0.0).await;
            }
            // Unparseable fields are a protocol slip, not a rejected share:
            // reply with the error and leave the counters alone.
            Err(SubmitError::Malformed(field)) => {
                debug!(session = self.id, field, "Malformed submission");
                self.respond_error(&request.id, StratumError::Internal).await;
            }
        }
    }

    /// Send `mining.notify` for the current job, if the session is ready
    /// for work and a job exists.
    async fn announce_current_job(&mut self, clean_jobs: bool) {
        if !(self.subscribed && self.authorized) {
            return;
        }
        let Some(job) = self.jobs.borrow_and_update().clone() else {
            return;
        };

        let builder = job.coinbase_builder(self.payout_script.clone(), &self.ctx.pool_tag);
        let (coinbase1, coinbase2) = builder.notify_halves();
        debug!(session = self.id, job_id = %job.id, clean_jobs, "Sending work");
        self.send(messages::notify(
            &job.id,
            &job.prev_hash_wire,
            &hex::encode(coinbase1),
            &hex::encode(coinbase2),
            &job.branch_hex(),
            &job.version_hex,
            &job.nbits_hex,
            &job.ntime_hex,
            clean_jobs,
        ))
        .await;
    }

    fn account_accepted(&mut self, accepted: &AcceptedShare) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_accepted_at.unwrap_or(self.connected_at));
        self.hashrate.observe(accepted.difficulty, dt);
        self.last_accepted_at = Some(now);

        self.shares_accepted += 1;
        self.last_share_ms = Some(now_ms());

        if self.shares_accepted == 1 {
            info!(
                session = self.id,
                difficulty = accepted.difficulty,
                hash = %accepted.hash,
                "First share accepted."
            );
        } else {
            debug!(
                session = self.id,
                difficulty = accepted.difficulty,
                hashrate = %self.hashrate.rate(),
                "Share accepted."
            );
        }

        if let Some(address) = self.address.clone() {
            if accepted.difficulty > self.best_difficulty {
                self.best_difficulty = accepted.difficulty;
                self.ctx
                    .stats
                    .update_best_difficulty(&address, accepted.difficulty);
            }
            self.ctx.stats.record_share(
                &address,
                &self.worker_name,
                accepted.difficulty,
                true,
                now_ms(),
            );
        }
        self.push_stats();
    }

    async fn reject(&mut self, id: &Option<Value>, error: StratumError, difficulty: f64) {
        self.shares_rejected += 1;
        if let Some(address) = self.address.clone() {
            self.ctx
                .stats
                .record_share(&address, &self.worker_name, difficulty, false, now_ms());
        }
        self.push_stats();
        self.respond_error(id, error).await;
    }

    /// Hand the block to the node from a separate task; a slow node must
    /// not stall this session's inbound handling.
    fn submit_block(&self, block: BlockCandidate) {
        info!(
            session = self.id,
            height = block.height,
            hash = %block.hash,
            "Share meets network target, submitting block"
        );
        let rpc = self.ctx.rpc.clone();
        let stats = self.ctx.stats.clone();
        let address = self.address.clone().unwrap_or_default();
        let worker = self.worker_name.clone();
        tokio::spawn(async move {
            match rpc.submit_block(&block.hex).await {
                Ok(None) => {
                    info!(height = block.height, hash = %block.hash, "Block accepted by node")
                }
                Ok(Some(reason)) => {
                    warn!(height = block.height, reason = %reason, "Node rejected block")
                }
                Err(error) => {
                    warn!(height = block.height, error = %error, "Block submission failed")
                }
            }
            stats.record_block_found(&address, &worker, block.height);
        });
    }

    fn push_stats(&self) {
        let Some(address) = &self.address else {
            return;
        };
        self.ctx.stats.update_session(
            self.id,
            WorkerSnapshot {
                address: address.clone(),
                worker: self.worker_name.clone(),
                hashrate: self.hashrate.rate().as_hashes_per_second(),
                shares_accepted: self.shares_accepted,
                shares_rejected: self.shares_rejected,
                best_difficulty: self.best_difficulty,
                last_share_ms: self.last_share_ms,
                connected_at_ms: self.connected_at_ms,
            },
        );
    }

    /// Queue a line for the writer task. A closed or saturated queue means
    /// the connection is going away; the read loop notices separately.
    async fn send(&self, line: String) {
        let _ = self.out.send(line).await;
    }

    async fn respond(&self, id: &Option<Value>, result: Value) {
        self.send(messages::response(id, result)).await;
    }

    async fn respond_error(&self, id: &Option<Value>, error: StratumError) {
        self.send(messages::error_response(id, error)).await;
    }
}
