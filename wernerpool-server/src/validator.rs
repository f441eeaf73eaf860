//! Share validation and block assembly.
//!
//! A submission is judged by rebuilding exactly what the miner hashed: the
//! coinbase with that session's extranonces spliced in, the Merkle root
//! folded from the job's cached branch, and the 80-byte header in consensus
//! serialization. The double-SHA256 of that header is scored against the
//! session target (share) and the network target (block); a network-level
//! share is serialized into a full block for `submitblock`.

use bitcoin::block::{Header, Version};
use bitcoin::hash_types::{BlockHash, TxMerkleNode};
use bitcoin::hashes::Hash;
use thiserror::Error;

use crate::stratum::messages::SubmitParams;
use crate::types::Difficulty;
use crate::u256::U256;
use crate::work::coinbase::{CoinbaseBuilder, EXTRANONCE_LEN, push_compact_size};
use crate::work::job::Job;
use crate::work::merkle;

/// BIP310 version-rolling mask offered to every miner.
pub const VERSION_ROLLING_MASK: u32 = 0x1fffe000;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("unknown job {0:?}")]
    UnknownJob(String),

    #[error("malformed {0} field")]
    Malformed(&'static str),

    #[error("share difficulty {share} below session difficulty {session}")]
    LowDifficulty { share: f64, session: f64 },
}

/// A share that met the session target.
#[derive(Debug, Clone)]
pub struct AcceptedShare {
    /// Difficulty actually achieved by the header hash.
    pub difficulty: f64,
    pub hash: BlockHash,
    /// Present when the share also met the network target.
    pub block: Option<BlockCandidate>,
}

/// A share that is also a valid block, ready for `submitblock`.
#[derive(Debug, Clone)]
pub struct BlockCandidate {
    pub hash: BlockHash,
    pub height: u64,
    pub hex: String,
}

fn parse_u32_hex(field: &'static str, s: &str) -> Result<u32, SubmitError> {
    if s.len() != 8 {
        return Err(SubmitError::Malformed(field));
    }
    u32::from_str_radix(s, 16).map_err(|_| SubmitError::Malformed(field))
}

/// Reassemble the header the miner hashed.
///
/// `version_bits` must already be masked; they are XORed into the job's
/// base version.
fn assemble_header(
    job: &Job,
    merkle_root: [u8; 32],
    ntime: u32,
    nonce: u32,
    version_bits: Option<u32>,
) -> Header {
    let mut version = job.version;
    if let Some(bits) = version_bits {
        version ^= bits as i32;
    }
    Header {
        version: Version::from_consensus(version),
        prev_blockhash: job.prev_blockhash,
        merkle_root: TxMerkleNode::from_byte_array(merkle_root),
        time: ntime,
        bits: job.nbits,
        nonce,
    }
}

/// Score one submission against the session and network targets.
///
/// `job` is the currently published job; a submission quoting any other
/// `job_id` is refused before any bytes are rebuilt. `coinbase` must be
/// the builder for the submitting session's payout script; `version_mask`
/// is the rolling mask negotiated via `mining.configure`, if any.
pub fn evaluate(
    job: &Job,
    coinbase: &CoinbaseBuilder,
    extranonce1: u32,
    session_difficulty: f64,
    version_mask: Option<u32>,
    submit: &SubmitParams,
) -> Result<AcceptedShare, SubmitError> {
    if submit.job_id != job.id {
        return Err(SubmitError::UnknownJob(submit.job_id.clone()));
    }

    let extranonce2 =
        hex::decode(&submit.extranonce2).map_err(|_| SubmitError::Malformed("extranonce2"))?;
    let extranonce2: [u8; 4] = extranonce2
        .try_into()
        .map_err(|_| SubmitError::Malformed("extranonce2"))?;
    let ntime = parse_u32_hex("ntime", &submit.ntime)?;
    let nonce = parse_u32_hex("nonce", &submit.nonce)?;
    let version_bits = match (&submit.version_bits, version_mask) {
        (Some(bits), Some(mask)) => Some(parse_u32_hex("version_bits", bits)? & mask),
        _ => None,
    };

    let mut extranonce = [0u8; EXTRANONCE_LEN];
    extranonce[..4].copy_from_slice(&extranonce1.to_be_bytes());
    extranonce[4..].copy_from_slice(&extranonce2);

    let coinbase_txid = coinbase.txid(&extranonce);
    let merkle_root = merkle::fold_branch(coinbase_txid, &job.merkle_branch);
    let header = assemble_header(job, merkle_root, ntime, nonce, version_bits);
    let hash = header.block_hash();

    let session_target = Difficulty::from_f64(session_difficulty).to_target();
    if U256::from_le_bytes(hash.to_byte_array()) == U256::ZERO {
        // Unscorable; D1 / 0 has no value and a real header never hashes
        // to zero.
        return Err(SubmitError::LowDifficulty {
            share: 0.0,
            session: session_difficulty,
        });
    }

    let share_difficulty = Difficulty::from_share_hash(&hash).as_f64();
    if !session_target.is_met_by(hash) {
        return Err(SubmitError::LowDifficulty {
            share: share_difficulty,
            session: session_difficulty,
        });
    }

    let block = job.network_target.is_met_by(hash).then(|| BlockCandidate {
        hash,
        height: job.template.height,
        hex: assemble_block_hex(job, coinbase, &extranonce, &header),
    });

    Ok(AcceptedShare {
        difficulty: share_difficulty,
        hash,
        block,
    })
}

/// Serialize the full block: header, transaction count, segwit coinbase,
/// then every template transaction verbatim.
fn assemble_block_hex(
    job: &Job,
    coinbase: &CoinbaseBuilder,
    extranonce: &[u8; EXTRANONCE_LEN],
    header: &Header,
) -> String {
    let coinbase_hex = hex::encode(coinbase.serialize_with_witness(extranonce));

    let mut count = Vec::with_capacity(3);
    push_compact_size(&mut count, 1 + job.template.transactions.len() as u64);

    let tx_data_len: usize = job.template.transactions.iter().map(|tx| tx.data.len()).sum();
    let mut block_hex = String::with_capacity(160 + count.len() * 2 + coinbase_hex.len() + tx_data_len);
    block_hex.push_str(&hex::encode(bitcoin::consensus::encode::serialize(header)));
    block_hex.push_str(&hex::encode(count));
    block_hex.push_str(&coinbase_hex);
    for tx in &job.template.transactions {
        block_hex.push_str(&tx.data);
    }
    block_hex
}
