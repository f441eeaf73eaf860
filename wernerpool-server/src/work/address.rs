//! Miner payout address to scriptPubKey conversion.
//!
//! Miners name their payout address in the Stratum username, so the pool has
//! to turn an arbitrary string into a locking script without refusing the
//! connection. Legacy Base58 and Bech32 forms are decoded structurally; the
//! checksum is not verified (a miner who mistypes their address burns their
//! own reward, not anyone else's). Anything undecodable becomes a bare
//! `OP_RETURN`, which keeps the coinbase valid while making the miner
//! visibly non-productive.

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BECH32_ALPHABET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Base58Check payload length: version byte, hash160, 4-byte checksum.
const BASE58_PAYLOAD_LEN: usize = 25;

const OP_DUP: u8 = 0x76;
const OP_HASH160: u8 = 0xa9;
const OP_EQUAL: u8 = 0x87;
const OP_EQUALVERIFY: u8 = 0x88;
const OP_CHECKSIG: u8 = 0xac;
const OP_RETURN: u8 = 0x6a;

/// Locking script for the coinbase payout output.
///
/// Never fails: unrecognized or undecodable addresses yield a single-byte
/// `OP_RETURN` script.
pub fn script_pubkey(address: &str) -> Vec<u8> {
    if let Some(script) = try_script_pubkey(address) {
        script
    } else {
        vec![OP_RETURN]
    }
}

fn try_script_pubkey(address: &str) -> Option<Vec<u8>> {
    if address.starts_with('1') {
        let hash = base58_hash160(address)?;
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[OP_DUP, OP_HASH160, 20]);
        script.extend_from_slice(&hash);
        script.extend_from_slice(&[OP_EQUALVERIFY, OP_CHECKSIG]);
        Some(script)
    } else if address.starts_with('3') {
        let hash = base58_hash160(address)?;
        let mut script = Vec::with_capacity(23);
        script.extend_from_slice(&[OP_HASH160, 20]);
        script.extend_from_slice(&hash);
        script.push(OP_EQUAL);
        Some(script)
    } else if address.len() > 3 && address[..3].eq_ignore_ascii_case("bc1") {
        let (version, program) = bech32_program(&address.to_lowercase())?;
        witness_script(version, &program)
    } else {
        None
    }
}

fn witness_script(version: u8, program: &[u8]) -> Option<Vec<u8>> {
    let opcode = match (version, program.len()) {
        (0, 20) | (0, 32) => 0x00,
        (1, 32) => 0x51, // OP_1, taproot
        _ => return None,
    };
    let mut script = Vec::with_capacity(2 + program.len());
    script.push(opcode);
    script.push(program.len() as u8);
    script.extend_from_slice(program);
    Some(script)
}

/// Decode a Base58Check address and extract the 20-byte hash160.
///
/// Big-integer base conversion with leading-`'1'` digits restored as zero
/// bytes. The 4-byte checksum is sliced off without verification.
fn base58_hash160(address: &str) -> Option<[u8; 20]> {
    let decoded = base58_decode(address)?;
    if decoded.len() != BASE58_PAYLOAD_LEN {
        return None;
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&decoded[1..21]);
    Some(hash)
}

fn base58_decode(input: &str) -> Option<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::new();
    for c in input.chars() {
        let digit = BASE58_ALPHABET.find(c)? as u32;
        // bytes = bytes * 58 + digit, big-endian accumulator
        let mut carry = digit;
        for b in bytes.iter_mut().rev() {
            let v = (*b as u32) * 58 + carry;
            *b = (v & 0xff) as u8;
            carry = v >> 8;
        }
        while carry > 0 {
            bytes.insert(0, (carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let zeros = input.chars().take_while(|&c| c == '1').count();
    let mut out = vec![0u8; zeros];
    out.extend_from_slice(&bytes);
    Some(out)
}

/// Decode a Bech32 address into `(witness_version, program)`.
///
/// Splits at the last `'1'`, drops the 6-symbol checksum without verifying
/// it, reads the first 5-bit value as the witness version and repacks the
/// remaining 5-bit groups into bytes MSB-first.
fn bech32_program(address: &str) -> Option<(u8, Vec<u8>)> {
    let (_hrp, data) = address.rsplit_once('1')?;

    let values: Vec<u8> = data
        .chars()
        .map(|c| BECH32_ALPHABET.find(c).map(|i| i as u8))
        .collect::<Option<_>>()?;
    // version symbol + at least the checksum
    if values.len() < 7 {
        return None;
    }

    let payload = &values[..values.len() - 6];
    let (&version, groups) = payload.split_first()?;
    if version > 16 {
        return None;
    }

    let mut program = Vec::with_capacity(groups.len() * 5 / 8);
    let mut acc: u32 = 0;
    let mut bits: u32 = 0;
    for &g in groups {
        acc = (acc << 5) | g as u32;
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            program.push((acc >> bits) as u8);
        }
    }

    Some((version, program))
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal Base58 encoder, used only to build synthetic test addresses.
    fn base58_encode(bytes: &[u8]) -> String {
        let alphabet: Vec<char> = BASE58_ALPHABET.chars().collect();
        let mut digits: Vec<u8> = Vec::new(); // base-58, big-endian
        for &byte in bytes {
            let mut carry = byte as u32;
            for d in digits.iter_mut().rev() {
                let v = (*d as u32) * 256 + carry;
                *d = (v % 58) as u8;
                carry = v / 58;
            }
            while carry > 0 {
                digits.insert(0, (carry % 58) as u8);
                carry /= 58;
            }
        }
        let zeros = bytes.iter().take_while(|&&b| b == 0).count();
        let mut out: String = std::iter::repeat('1').take(zeros).collect();
        out.extend(digits.iter().map(|&d| alphabet[d as usize]));
        out
    }

    #[test]
    fn base58_decode_small_values() {
        // '1' is digit zero, '2' is digit one
        assert_eq!(base58_decode("2").unwrap(), vec![1]);
        assert_eq!(base58_decode("21").unwrap(), vec![58]);
        assert_eq!(base58_decode("11").unwrap(), vec![0, 0]);
        assert_eq!(base58_decode("0"), None); // not in the alphabet
    }

    #[test]
    fn p2pkh_genesis_address() {
        // The block-1 payout address; hash160 is well known.
        let script = script_pubkey("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa");
        let expected =
            hex::decode("76a91462e907b15cbf27d5425399ebf6f0fb50ebb88f1888ac").unwrap();
        assert_eq!(script, expected);
    }

    #[test]
    fn p2sh_roundtrip() {
        // Checksums are not verified, so a synthetic payload works.
        let hash = [0xabu8; 20];
        let mut payload = vec![0x05];
        payload.extend_from_slice(&hash);
        payload.extend_from_slice(&[0, 0, 0, 0]); // unchecked checksum
        let address = base58_encode(&payload);
        assert!(address.starts_with('3'));

        let mut expected = vec![OP_HASH160, 20];
        expected.extend_from_slice(&hash);
        expected.push(OP_EQUAL);
        assert_eq!(script_pubkey(&address), expected);
    }

    #[test]
    fn p2wpkh_reference_vector() {
        let script = script_pubkey("bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4");
        let expected = hex::decode("0014751e76e8199196d454941c45d1b3a323f1433bd6").unwrap();
        assert_eq!(script, expected);
    }

    #[test]
    fn p2wsh_reference_vector() {
        let script = script_pubkey(
            "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3",
        );
        let expected = hex::decode(
            "00201863143c14c5166804bd19203356da136c985678cd4d27a1b8c6329604903262",
        )
        .unwrap();
        assert_eq!(script, expected);
    }

    #[test]
    fn p2tr_reference_vector() {
        let script = script_pubkey(
            "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0",
        );
        let expected = hex::decode(
            "512079be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798",
        )
        .unwrap();
        assert_eq!(script, expected);
    }

    #[test]
    fn decoding_is_idempotent() {
        for address in [
            "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa",
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4",
            "bc1p0xlxvlhemja6c4dqv22uapctqupfhlxm9h8z3k2e72q4k9hcz7vqzk5jj0",
        ] {
            assert_eq!(script_pubkey(address), script_pubkey(address));
        }
    }

    #[test]
    fn unknown_forms_burn_to_op_return() {
        for address in [
            "",
            "not-an-address",
            "ltc1qw508d6qejxtdg4y5r3zarvary0c5xw7kgmn4n9", // wrong chain, no bc1 prefix
            "bc1", // no data part
            "bc1qqq", // too short for version + checksum
            "2NEWpGQ4S1b3oUt8pPKyyrrkaDqTWUDEXh", // testnet prefix
        ] {
            assert_eq!(script_pubkey(address), vec![OP_RETURN], "{address:?}");
        }
    }

    #[test]
    fn unsupported_witness_programs_burn() {
        // A bech32 string whose program length is not 20 or 32 for v0:
        // "bc1" + version q (0) + 10 data symbols + 6 checksum symbols
        // repacks to fewer than 20 bytes.
        assert_eq!(script_pubkey("bc1qqqqqqqqqqqqqqqqq"), vec![OP_RETURN]);
    }
}
