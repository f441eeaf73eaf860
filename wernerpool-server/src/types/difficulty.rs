//! Share difficulty with lossless 256-bit representation.

use std::cmp::Ordering;
use std::fmt;

use bitcoin::hash_types::BlockHash;
use bitcoin::hashes::Hash;
use bitcoin::pow::Target;

use crate::u256::U256;

/// Difficulty of a share or session, stored as the equivalent target.
///
/// Difficulty and target are two views of the same threshold:
///
/// ```text
/// target     = D1 / difficulty
/// difficulty = D1 / target
/// ```
///
/// where `D1` is the difficulty-1 target
/// `0x00000000ffff0000...0000` (`Target::MAX`). Keeping the target instead
/// of a float means share scoring and the session-target comparison are both
/// exact: a header hash meets difficulty `d` iff, read as a little-endian
/// 256-bit integer, it is at most `D1 / d` (integer division).
///
/// Sub-1.0 difficulties (targets above `D1`) are allowed; they only appear
/// in regtest-style setups and tests.
#[derive(Debug, Clone, Copy)]
pub struct Difficulty(Target);

impl Difficulty {
    /// Difficulty 1, the easiest mainnet share.
    pub const ONE: Self = Self(Target::MAX);

    /// Session difficulty from the configured f64 value.
    ///
    /// Values `>= 1.0` truncate to an integer before the target division,
    /// matching the integer `D1 / difficulty` rule. Sub-1.0 values scale the
    /// target up instead, saturating at an all-ones target when the
    /// multiplier overflows 256 bits. Non-positive or non-finite input maps
    /// to difficulty 1.
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() || value <= 0.0 {
            return Self::ONE;
        }

        let d1 = U256::from(Target::MAX);
        if value >= 1.0 {
            let target = d1
                .checked_div(U256::from((value as u64).max(1)))
                .expect("divisor is at least 1");
            Self(Target::from(target))
        } else {
            let multiplier = U256::from((1.0 / value) as u64);
            match d1.checked_mul(multiplier) {
                Some(target) => Self(Target::from(target)),
                None => Self(Target::from(U256::from_be_bytes([0xff; 32]))),
            }
        }
    }

    /// Difficulty achieved by a share hash: `D1 / hash` with the hash read
    /// as a little-endian integer.
    ///
    /// The hash *is* the smallest target it would have satisfied, so this is
    /// lossless. A zero hash cannot be scored this way; callers reject it
    /// before getting here.
    pub fn from_share_hash(hash: &BlockHash) -> Self {
        Self(Target::from_le_bytes(*hash.as_byte_array()))
    }

    pub fn from_target(target: Target) -> Self {
        Self(target)
    }

    /// The target a hash must not exceed to meet this difficulty.
    pub fn to_target(self) -> Target {
        self.0
    }

    /// Lossy float view, for counters and logs.
    pub fn as_f64(self) -> f64 {
        self.0.difficulty_float()
    }
}

impl PartialEq for Difficulty {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Difficulty {}

impl PartialOrd for Difficulty {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Difficulty {
    fn cmp(&self, other: &Self) -> Ordering {
        // Smaller target, higher difficulty.
        other.0.cmp(&self.0)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = self.as_f64();

        if value < 1.0 {
            let s = format!("{:.6}", value);
            return write!(f, "{}", s.trim_end_matches('0').trim_end_matches('.'));
        }

        let (scaled, suffix) = if value >= 1e15 {
            (value / 1e15, "P")
        } else if value >= 1e12 {
            (value / 1e12, "T")
        } else if value >= 1e9 {
            (value / 1e9, "G")
        } else if value >= 1e6 {
            (value / 1e6, "M")
        } else if value >= 1e3 {
            (value / 1e3, "K")
        } else {
            (value, "")
        };

        if scaled >= 100.0 || scaled.fract() == 0.0 {
            write!(f, "{:.0}{}", scaled, suffix)
        } else if scaled >= 10.0 {
            write!(f, "{:.1}{}", scaled, suffix)
        } else {
            write!(f, "{:.2}{}", scaled, suffix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_one_is_d1_target() {
        assert_eq!(Difficulty::from_f64(1.0).to_target(), Target::MAX);
        assert_eq!(Difficulty::ONE.to_target(), Target::MAX);
    }

    #[test]
    fn higher_difficulty_means_smaller_target() {
        let easy = Difficulty::from_f64(64.0);
        let hard = Difficulty::from_f64(4096.0);
        assert!(hard.to_target() < easy.to_target());
        assert!(hard > easy);
    }

    #[test]
    fn bad_input_maps_to_one() {
        assert_eq!(Difficulty::from_f64(0.0), Difficulty::ONE);
        assert_eq!(Difficulty::from_f64(-5.0), Difficulty::ONE);
        assert_eq!(Difficulty::from_f64(f64::NAN), Difficulty::ONE);
    }

    #[test]
    fn share_hash_at_d1_scores_one() {
        // A hash exactly equal to the difficulty-1 target scores 1.
        let hash = BlockHash::from_byte_array(Target::MAX.to_le_bytes());
        let diff = Difficulty::from_share_hash(&hash);
        assert_eq!(diff.as_f64(), 1.0);
    }

    #[test]
    fn smaller_hash_scores_higher() {
        let mut small = [0u8; 32];
        small[0] = 0x01; // tiny little-endian value
        let small = BlockHash::from_byte_array(small);

        let mut big = [0u8; 32];
        big[20] = 0x01;
        let big = BlockHash::from_byte_array(big);

        assert!(Difficulty::from_share_hash(&small) > Difficulty::from_share_hash(&big));
        assert!(Difficulty::from_share_hash(&small).as_f64() > 1_000_000.0);
    }

    #[test]
    fn sub_one_difficulty_raises_target() {
        let diff = Difficulty::from_f64(0.5);
        assert!(diff.to_target() > Target::MAX);

        let expected = U256::from(Target::MAX)
            .checked_mul(U256::from(2u64))
            .unwrap();
        assert_eq!(U256::from(diff.to_target()), expected);
    }

    #[test]
    fn session_target_matches_integer_division() {
        // target(64) == D1 / 64 exactly
        let expected = U256::from(Target::MAX)
            .checked_div(U256::from(64u64))
            .unwrap();
        assert_eq!(U256::from(Difficulty::from_f64(64.0).to_target()), expected);
    }

    #[test]
    fn roundtrip_is_lossless() {
        for value in [1.0, 64.0, 1000.0, 1_000_000.0] {
            let diff = Difficulty::from_f64(value);
            assert_eq!(Difficulty::from_target(diff.to_target()), diff);
        }
    }

    #[test]
    fn display_uses_si_suffixes() {
        assert_eq!(Difficulty::from_f64(1.0).to_string(), "1");
        assert_eq!(Difficulty::from_f64(500.0).to_string(), "500");
        assert_eq!(Difficulty::from_f64(1_500_000.0).to_string(), "1.50M");
        assert_eq!(Difficulty::from_f64(0.5).to_string(), "0.5");
    }
}
