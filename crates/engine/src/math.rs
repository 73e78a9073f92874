//! Checked integer helpers shared across the ledger.

use crate::error::{LedgerError, Result};

/// Basis-point denominator (1 bp = 0.01%).
pub const BPS_DENOM: u128 = 10_000;

/// `amount * bps / 10_000`, checked on the multiply.
#[inline]
pub fn apply_bps(amount: u128, bps: u64) -> Result<u128> {
    amount
        .checked_mul(bps as u128)
        .map(|v| v / BPS_DENOM)
        .ok_or(LedgerError::Overflow)
}

/// `a * b / d`, floor division, checked multiply and zero divisor.
#[inline]
pub fn mul_div(a: u128, b: u128, d: u128) -> Result<u128> {
    if d == 0 {
        return Err(LedgerError::Overflow);
    }
    a.checked_mul(b).map(|v| v / d).ok_or(LedgerError::Overflow)
}

#[inline]
pub fn checked_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or(LedgerError::Overflow)
}

#[inline]
pub fn checked_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or(LedgerError::Overflow)
}

/// Minimum of three values.
#[inline]
pub fn min3(a: u128, b: u128, c: u128) -> u128 {
    core::cmp::min(a, core::cmp::min(b, c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_bps() {
        assert_eq!(apply_bps(10_000, 500).unwrap(), 500); // 5%
        assert_eq!(apply_bps(100, 500).unwrap(), 5);
        assert_eq!(apply_bps(3, 500).unwrap(), 0); // floors
        assert_eq!(apply_bps(u128::MAX, 2), Err(LedgerError::Overflow));
    }

    #[test]
    fn test_mul_div() {
        assert_eq!(mul_div(7, 3, 2).unwrap(), 10);
        assert_eq!(mul_div(1, 1, 0), Err(LedgerError::Overflow));
        assert_eq!(mul_div(u128::MAX, 2, 1), Err(LedgerError::Overflow));
    }

    #[test]
    fn test_min3() {
        assert_eq!(min3(3, 1, 2), 1);
        assert_eq!(min3(1, 1, 1), 1);
        assert_eq!(min3(5, 9, 2), 2);
    }
}

// ═══════════════════════════════════════════════════════════════
// KANI FORMAL VERIFICATION PROOFS
// ═══════════════════════════════════════════════════════════════

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// H1: apply_bps never exceeds the input for bps <= 10_000
    #[kani::proof]
    #[kani::unwind(2)]
    fn h1_bps_bounded() {
        let amount: u128 = kani::any();
        let bps: u64 = kani::any();

        kani::assume(amount < u128::MAX / 10_000);
        kani::assume(bps <= 10_000);

        let out = apply_bps(amount, bps).unwrap();
        assert!(out <= amount, "H1: bps share exceeds whole");
    }

    /// H2: mul_div floor result is exact quotient of the wide product
    #[kani::proof]
    #[kani::unwind(2)]
    fn h2_mul_div_floor() {
        let a: u128 = kani::any();
        let b: u128 = kani::any();
        let d: u128 = kani::any();

        kani::assume(d > 0);
        kani::assume(a < (1u128 << 64) && b < (1u128 << 64));

        let out = mul_div(a, b, d).unwrap();
        assert!(out == (a * b) / d, "H2: floor division mismatch");
    }

    /// H3: min3 returns one of its arguments and is a lower bound
    #[kani::proof]
    #[kani::unwind(2)]
    fn h3_min3_lower_bound() {
        let a: u128 = kani::any();
        let b: u128 = kani::any();
        let c: u128 = kani::any();

        let m = min3(a, b, c);
        assert!(m <= a && m <= b && m <= c, "H3: not a lower bound");
        assert!(m == a || m == b || m == c, "H3: not an argument");
    }
}
