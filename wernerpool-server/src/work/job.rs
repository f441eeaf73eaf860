//! Mining jobs derived from a block template.

use std::str::FromStr;
use std::sync::Arc;

use bitcoin::hash_types::BlockHash;
use bitcoin::hashes::Hash;
use bitcoin::pow::{CompactTarget, Target};
use thiserror::Error;
use tracing::warn;

use super::coinbase::CoinbaseBuilder;
use super::endian;
use super::merkle;
use super::template::BlockTemplate;

#[derive(Debug, Error)]
pub enum JobError {
    #[error("invalid previous block hash {0:?}")]
    PrevHash(String),

    #[error("invalid nBits {0:?}")]
    Bits(String),

    #[error("transaction {index} has an invalid {field} field")]
    TxField { index: usize, field: &'static str },
}

/// One unit of work offered to miners.
///
/// Everything `mining.notify` needs is precomputed here once per template
/// refresh; sessions only splice in their own coinbase halves. The header
/// fields are kept both in wire-hex form (for notify) and parsed form (for
/// header reassembly during share validation), so neither side re-derives
/// the other lossily.
#[derive(Debug, Clone)]
pub struct Job {
    /// 8-hex, monotonically increasing.
    pub id: String,

    /// Previous block hash in internal byte order, for header assembly.
    pub prev_blockhash: BlockHash,

    /// Previous block hash as legacy Stratum miners expect it: bytes
    /// reversed, then every 4-byte word endian-swapped.
    pub prev_hash_wire: String,

    pub version: i32,
    pub version_hex: String,

    pub nbits: CompactTarget,
    /// The template's `bits` field verbatim.
    pub nbits_hex: String,

    pub ntime: u32,
    pub ntime_hex: String,

    /// Sibling hashes for the coinbase at leaf index 0, internal byte order.
    pub merkle_branch: Vec<[u8; 32]>,

    /// BIP-141 witness commitment over the template's wtxids.
    pub witness_commitment: [u8; 32],

    /// Full network target expanded from `nbits`.
    pub network_target: Target,

    /// The template this job was derived from, for block assembly.
    pub template: Arc<BlockTemplate>,
}

fn decode_hash32(
    hex_str: &str,
    index: usize,
    field: &'static str,
) -> Result<[u8; 32], JobError> {
    let bytes = hex::decode(hex_str).map_err(|_| JobError::TxField { index, field })?;
    let display: [u8; 32] = bytes
        .try_into()
        .map_err(|_| JobError::TxField { index, field })?;
    Ok(endian::reverse32(&display))
}

impl Job {
    pub fn derive(id: u32, template: Arc<BlockTemplate>) -> Result<Self, JobError> {
        let prev_blockhash = BlockHash::from_str(&template.previous_block_hash)
            .map_err(|_| JobError::PrevHash(template.previous_block_hash.clone()))?;
        let prev_hash_wire =
            hex::encode(endian::swap_words32(&prev_blockhash.to_byte_array()));

        let bits_consensus = u32::from_str_radix(&template.bits, 16)
            .map_err(|_| JobError::Bits(template.bits.clone()))?;
        let nbits = CompactTarget::from_consensus(bits_consensus);
        let network_target = endian::compact_to_target(nbits);

        if let Ok(target_bytes) = hex::decode(&template.target)
            && let Ok(target_bytes) = <[u8; 32]>::try_from(target_bytes.as_slice())
            && Target::from_be_bytes(target_bytes) != network_target
        {
            warn!(
                bits = %template.bits,
                target = %template.target,
                "Template target disagrees with its nBits, trusting nBits"
            );
        }

        let mut txids = Vec::with_capacity(template.transactions.len());
        let mut wtxids = Vec::with_capacity(template.transactions.len());
        for (index, tx) in template.transactions.iter().enumerate() {
            txids.push(decode_hash32(&tx.txid, index, "txid")?);
            wtxids.push(decode_hash32(&tx.hash, index, "hash")?);
        }

        Ok(Self {
            id: format!("{:08x}", id),
            prev_blockhash,
            prev_hash_wire,
            version: template.version,
            version_hex: format!("{:08x}", template.version as u32),
            nbits,
            nbits_hex: template.bits.clone(),
            ntime: template.curtime,
            ntime_hex: format!("{:08x}", template.curtime),
            merkle_branch: merkle::coinbase_branch(&txids),
            witness_commitment: merkle::witness_commitment(&wtxids),
            network_target,
            template,
        })
    }

    /// Merkle branch as notify wants it: hex, internal byte order.
    pub fn branch_hex(&self) -> Vec<String> {
        self.merkle_branch.iter().map(hex::encode).collect()
    }

    /// Coinbase builder for one session's payout script.
    pub fn coinbase_builder(&self, payout_script: Vec<u8>, pool_tag: &str) -> CoinbaseBuilder {
        CoinbaseBuilder::new(
            self.template.height,
            self.template.coinbase_value,
            payout_script,
            self.witness_commitment,
            pool_tag,
        )
    }
}
