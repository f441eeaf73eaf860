//! Coinbase construction around the miner's extranonce seam.
//!
//! Every connected miner gets its own coinbase: the payout output locks to
//! that miner's address, and the script signature reserves 8 bytes of
//! extranonce space (`extranonce1 || extranonce2`) the miner rolls to vary
//! the Merkle root. `mining.notify` carries the transaction split into two
//! halves around exactly that seam, so the bytes the miner hashes and the
//! bytes the validator rebuilds are identical by construction.

use bitcoin::hashes::{Hash, sha256d};

/// Bytes reserved in the scriptSig for `extranonce1 || extranonce2`.
pub const EXTRANONCE_LEN: usize = 8;

/// BIP-141 commitment header inside the witness output script.
const WITNESS_COMMITMENT_HEADER: [u8; 4] = [0xaa, 0x21, 0xa9, 0xed];

/// Append a Bitcoin CompactSize encoding of `n`.
pub fn push_compact_size(out: &mut Vec<u8>, n: u64) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

/// BIP-34 height push for the start of the coinbase scriptSig.
///
/// Heights below 17 encode as the small-number opcode `0x50 + height`;
/// anything larger is a minimal little-endian push, padded with a trailing
/// zero byte when the top bit of the last data byte is set.
pub fn encode_height(height: u64) -> Vec<u8> {
    if height < 17 {
        return vec![0x50 + height as u8];
    }

    let mut data = Vec::with_capacity(5);
    let mut n = height;
    while n > 0 {
        data.push((n & 0xff) as u8);
        n >>= 8;
    }
    if data.last().is_some_and(|&b| b & 0x80 != 0) {
        data.push(0x00);
    }

    let mut push = Vec::with_capacity(1 + data.len());
    push.push(data.len() as u8);
    push.extend_from_slice(&data);
    push
}

/// Builds the per-miner coinbase transaction.
///
/// Always a version-2 transaction with one null-outpoint input, a payout
/// output and a witness-commitment output, and locktime 0.
#[derive(Debug, Clone)]
pub struct CoinbaseBuilder {
    height: u64,
    value_sats: u64,
    payout_script: Vec<u8>,
    witness_commitment: [u8; 32],
    pool_tag: String,
}

impl CoinbaseBuilder {
    pub fn new(
        height: u64,
        value_sats: u64,
        payout_script: Vec<u8>,
        witness_commitment: [u8; 32],
        pool_tag: impl Into<String>,
    ) -> Self {
        Self {
            height,
            value_sats,
            payout_script,
            witness_commitment,
            pool_tag: pool_tag.into(),
        }
    }

    /// ScriptSig bytes before the extranonce seam: BIP-34 height push, then
    /// the ASCII pool marker framed in slashes.
    fn script_sig_prefix(&self) -> Vec<u8> {
        let mut prefix = encode_height(self.height);
        prefix.push(b'/');
        prefix.extend_from_slice(self.pool_tag.as_bytes());
        prefix.push(b'/');
        prefix
    }

    /// The two `mining.notify` halves.
    ///
    /// `coinbase1` ends with the scriptSig prefix; `coinbase2` begins with
    /// the input sequence. The miner produces the full transaction as
    /// `coinbase1 || extranonce1 || extranonce2 || coinbase2`.
    pub fn notify_halves(&self) -> (Vec<u8>, Vec<u8>) {
        let prefix = self.script_sig_prefix();
        let script_sig_len = prefix.len() + EXTRANONCE_LEN;
        debug_assert!(script_sig_len <= 100, "coinbase scriptSig over consensus limit");

        let mut coinbase1 = Vec::with_capacity(47 + prefix.len());
        coinbase1.extend_from_slice(&2u32.to_le_bytes()); // version 2
        coinbase1.push(0x01); // one input
        coinbase1.extend_from_slice(&[0u8; 32]); // null outpoint
        coinbase1.extend_from_slice(&0xffff_ffffu32.to_le_bytes());
        coinbase1.push(script_sig_len as u8);
        coinbase1.extend_from_slice(&prefix);

        let mut coinbase2 = Vec::with_capacity(64 + self.payout_script.len());
        coinbase2.extend_from_slice(&0xffff_ffffu32.to_le_bytes()); // sequence
        coinbase2.push(0x02); // two outputs

        coinbase2.extend_from_slice(&self.value_sats.to_le_bytes());
        push_compact_size(&mut coinbase2, self.payout_script.len() as u64);
        coinbase2.extend_from_slice(&self.payout_script);

        coinbase2.extend_from_slice(&0u64.to_le_bytes()); // commitment carries no value
        coinbase2.push(38);
        coinbase2.push(0x6a); // OP_RETURN
        coinbase2.push(36);
        coinbase2.extend_from_slice(&WITNESS_COMMITMENT_HEADER);
        coinbase2.extend_from_slice(&self.witness_commitment);

        coinbase2.extend_from_slice(&0u32.to_le_bytes()); // locktime

        (coinbase1, coinbase2)
    }

    /// Non-witness serialization with the extranonce inlined; this is the
    /// byte stream whose double-SHA256 is the coinbase txid.
    pub fn serialize_non_witness(&self, extranonce: &[u8; EXTRANONCE_LEN]) -> Vec<u8> {
        let (coinbase1, coinbase2) = self.notify_halves();
        let mut tx = Vec::with_capacity(coinbase1.len() + EXTRANONCE_LEN + coinbase2.len());
        tx.extend_from_slice(&coinbase1);
        tx.extend_from_slice(extranonce);
        tx.extend_from_slice(&coinbase2);
        tx
    }

    /// Full segwit serialization: marker and flag after the version, and a
    /// single witness stack entry holding the 32-zero reserved value.
    pub fn serialize_with_witness(&self, extranonce: &[u8; EXTRANONCE_LEN]) -> Vec<u8> {
        let non_witness = self.serialize_non_witness(extranonce);

        let mut tx = Vec::with_capacity(non_witness.len() + 40);
        tx.extend_from_slice(&non_witness[..4]); // version
        tx.push(0x00); // marker
        tx.push(0x01); // flag
        tx.extend_from_slice(&non_witness[4..non_witness.len() - 4]); // body
        tx.push(0x01); // one witness item
        tx.push(0x20);
        tx.extend_from_slice(&super::merkle::WITNESS_RESERVED_VALUE);
        tx.extend_from_slice(&non_witness[non_witness.len() - 4..]); // locktime
        tx
    }

    /// Coinbase txid (internal byte order) for the given extranonce.
    pub fn txid(&self, extranonce: &[u8; EXTRANONCE_LEN]) -> [u8; 32] {
        sha256d::Hash::hash(&self.serialize_non_witness(extranonce)).to_byte_array()
    }
}
