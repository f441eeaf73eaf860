//! 256-bit unsigned arithmetic for target and difficulty math.
//!
//! Thin wrapper over `ruint` that pins down the byte-order conversions the
//! rest of the crate needs. `bitcoin::pow::Target` exposes its value as
//! big-endian or little-endian byte arrays; share hashes arrive as 32-byte
//! little-endian integers. Everything else goes through these conversions so
//! no other module touches raw byte order for arithmetic.

use bitcoin::pow::Target;
use ruint::aliases::U256 as Inner;

/// Unsigned 256-bit integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct U256(Inner);

impl U256 {
    pub const ZERO: Self = Self(Inner::ZERO);

    pub fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(Inner::from_be_bytes(bytes))
    }

    pub fn from_le_bytes(bytes: [u8; 32]) -> Self {
        Self(Inner::from_le_bytes(bytes))
    }

    pub fn to_be_bytes(self) -> [u8; 32] {
        self.0.to_be_bytes::<32>()
    }

    /// Integer division, `None` for a zero divisor.
    pub fn checked_div(self, rhs: Self) -> Option<Self> {
        self.0.checked_div(rhs.0).map(Self)
    }

    /// Multiplication, `None` on 256-bit overflow.
    pub fn checked_mul(self, rhs: Self) -> Option<Self> {
        self.0.checked_mul(rhs.0).map(Self)
    }
}

impl From<u64> for U256 {
    fn from(value: u64) -> Self {
        Self(Inner::from(value))
    }
}

impl From<Target> for U256 {
    fn from(target: Target) -> Self {
        Self::from_be_bytes(target.to_be_bytes())
    }
}

impl From<U256> for Target {
    fn from(value: U256) -> Self {
        Target::from_be_bytes(value.to_be_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_roundtrip() {
        let original = Target::MAX;
        let through = Target::from(U256::from(original));
        assert_eq!(original, through);
    }

    #[test]
    fn byte_order() {
        let mut le = [0u8; 32];
        le[0] = 0x01; // least-significant byte
        assert_eq!(U256::from_le_bytes(le), U256::from(1u64));

        let mut be = [0u8; 32];
        be[31] = 0x01;
        assert_eq!(U256::from_be_bytes(be), U256::from(1u64));
    }

    #[test]
    fn division() {
        let max = U256::from(Target::MAX);
        assert_eq!(max.checked_div(max), Some(U256::from(1u64)));
        assert_eq!(max.checked_div(U256::ZERO), None);
    }

    #[test]
    fn multiplication_overflow() {
        let max = U256::from_be_bytes([0xff; 32]);
        assert_eq!(max.checked_mul(U256::from(2u64)), None);
        assert_eq!(
            U256::from(3u64).checked_mul(U256::from(4u64)),
            Some(U256::from(12u64))
        );
    }
}
