//! Byte-order transforms for Stratum wire fields.
//!
//! Three transforms cover every endian flip in the protocol: a plain 32-byte
//! reversal (display hex <-> internal hash order), a per-4-byte-word swap
//! (the extra mangling legacy Stratum applies to `prevhash`), and the
//! compact-bits expansion to a full 256-bit target. Everything else in the
//! crate calls these by name instead of fiddling with bytes locally.

use bitcoin::pow::{CompactTarget, Target};

/// Reverse a 32-byte hash between display order and internal order.
pub fn reverse32(bytes: &[u8; 32]) -> [u8; 32] {
    let mut out = *bytes;
    out.reverse();
    out
}

/// Swap the byte order inside each aligned 4-byte word.
///
/// Legacy Stratum miners expect `prevhash` with its bytes reversed and then
/// each 32-bit word endian-swapped; this is the second half of that
/// transformation.
pub fn swap_words32(bytes: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    for (chunk_out, chunk_in) in out.chunks_exact_mut(4).zip(bytes.chunks_exact(4)) {
        chunk_out[0] = chunk_in[3];
        chunk_out[1] = chunk_in[2];
        chunk_out[2] = chunk_in[1];
        chunk_out[3] = chunk_in[0];
    }
    out
}

/// Expand compact nBits to the full network target.
pub fn compact_to_target(bits: CompactTarget) -> Target {
    Target::from_compact(bits)
}
