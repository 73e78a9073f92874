//! Proportional-accrual index with dust-free remainder carry.
//!
//! One primitive backs three distributions per pool: fee accrual
//! (positive yield to depositors), maintenance decay (reduces effective
//! position value), and active-credit splitting (routes a share of
//! penalty proceeds to open borrowers by weight). The three instances
//! share no state.
//!
//! The index is a cumulative per-unit-of-weight counter: accruing
//! `amount` against a weight total advances `value` by
//! `amount * SCALE / total`, carrying the sub-unit modulus in
//! `remainder` so that repeated accruals distribute the exact
//! cumulative amount to within one unit system-wide.

use crate::error::{LedgerError, Result};

/// Fixed-point scale for index arithmetic (1e18).
pub const SCALE: u128 = 1_000_000_000_000_000_000;

/// A `(value, remainder)` accrual pair.
///
/// `value` is monotonically non-decreasing. After every successful
/// accrual, `remainder` is strictly less than the weight total it was
/// produced against.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccrualIndex {
    pub value: u128,
    pub remainder: u128,
}

impl AccrualIndex {
    pub const fn new() -> Self {
        Self { value: 0, remainder: 0 }
    }

    /// Distribute `amount` across `total` units of weight.
    ///
    /// With `total == 0` this is a no-op: there is nobody to distribute
    /// to, and the amount is an accepted, documented loss path rather
    /// than a deferred credit.
    ///
    /// # Invariants
    /// * `value` never decreases.
    /// * On return with `total > 0`, `remainder < total`.
    pub fn accrue(&mut self, total: u128, amount: u128) -> Result<()> {
        if total == 0 || amount == 0 {
            return Ok(());
        }

        let scaled = amount
            .checked_mul(SCALE)
            .and_then(|v| v.checked_add(self.remainder))
            .ok_or(LedgerError::Overflow)?;

        let delta = scaled / total;
        self.value = self
            .value
            .checked_add(delta)
            .ok_or(LedgerError::Overflow)?;
        self.remainder = scaled % total;
        Ok(())
    }

    /// Amount owed to `weight` units that last settled at `checkpoint`.
    ///
    /// Pure view; `settle` and `pending_view` callers both go through
    /// here so the two can never disagree.
    pub fn pending(&self, weight: u128, checkpoint: u128) -> Result<u128> {
        let delta = self
            .value
            .checked_sub(checkpoint)
            .ok_or(LedgerError::Overflow)?;
        weight
            .checked_mul(delta)
            .map(|v| v / SCALE)
            .ok_or(LedgerError::Overflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_total_is_noop() {
        let mut idx = AccrualIndex::new();
        idx.accrue(0, 1_000).unwrap();
        assert_eq!(idx, AccrualIndex::new());
    }

    #[test]
    fn test_even_distribution() {
        let mut idx = AccrualIndex::new();
        // 1000 units of weight, three accruals of 1: divides evenly.
        for _ in 0..3 {
            idx.accrue(1_000, 1).unwrap();
        }
        assert_eq!(idx.remainder, 0);
        assert_eq!(idx.pending(1_000, 0).unwrap(), 3);
    }

    #[test]
    fn test_dust_carry() {
        const ETHER: u128 = 1_000_000_000_000_000_000;
        let mut idx = AccrualIndex::new();

        // 3 ether of weight: a 1-wei accrual cannot move the index.
        idx.accrue(3 * ETHER, 1).unwrap();
        assert_eq!(idx.value, 0);
        assert_eq!(idx.remainder, SCALE);

        idx.accrue(3 * ETHER, 1).unwrap();
        assert_eq!(idx.value, 0);
        assert_eq!(idx.remainder, 2 * SCALE);

        // The third wei tips the carry over one full unit of index.
        idx.accrue(3 * ETHER, 1).unwrap();
        assert_eq!(idx.value, 1);
        assert_eq!(idx.remainder, 0);

        // Which pays each wei back out: 3 ether * 1 / SCALE = 3.
        assert_eq!(idx.pending(3 * ETHER, 0).unwrap(), 3);
    }

    #[test]
    fn test_remainder_strictly_below_total() {
        let mut idx = AccrualIndex::new();
        let total = 7_777u128;
        for amount in 1..50u128 {
            idx.accrue(total, amount).unwrap();
            assert!(idx.remainder < total);
        }
    }

    #[test]
    fn test_monotonic() {
        let mut idx = AccrualIndex::new();
        let mut last = 0u128;
        for amount in [5u128, 0, 1, 999, 3] {
            idx.accrue(1_234, amount).unwrap();
            assert!(idx.value >= last);
            last = idx.value;
        }
    }

    #[test]
    fn test_pending_checkpoint_delta() {
        let mut idx = AccrualIndex::new();
        idx.accrue(100, 50).unwrap();
        let ckpt = idx.value;
        assert_eq!(idx.pending(100, ckpt).unwrap(), 0);

        idx.accrue(100, 10).unwrap();
        assert_eq!(idx.pending(100, ckpt).unwrap(), 10);
        // A stale checkpoint sees the whole history.
        assert_eq!(idx.pending(100, 0).unwrap(), 60);
    }
}

// ═══════════════════════════════════════════════════════════════
// KANI FORMAL VERIFICATION PROOFS
// ═══════════════════════════════════════════════════════════════

#[cfg(kani)]
mod kani_proofs {
    use super::*;

    /// X1: accrual never decreases the index value
    #[kani::proof]
    #[kani::unwind(2)]
    fn x1_monotonic() {
        let mut idx = AccrualIndex {
            value: kani::any(),
            remainder: kani::any(),
        };
        let total: u128 = kani::any();
        let amount: u128 = kani::any();

        kani::assume(amount < (1u128 << 64));
        kani::assume(idx.value < (1u128 << 64));
        kani::assume(idx.remainder < (1u128 << 64));

        let before = idx.value;
        if idx.accrue(total, amount).is_ok() {
            assert!(idx.value >= before, "X1: index decreased");
        }
    }

    /// X2: after a successful accrual the remainder is below the total
    #[kani::proof]
    #[kani::unwind(2)]
    fn x2_remainder_bound() {
        let mut idx = AccrualIndex {
            value: kani::any(),
            remainder: kani::any(),
        };
        let total: u128 = kani::any();
        let amount: u128 = kani::any();

        kani::assume(total > 0);
        kani::assume(amount > 0 && amount < (1u128 << 32));
        kani::assume(idx.value < (1u128 << 64));
        kani::assume(idx.remainder < (1u128 << 64));

        if idx.accrue(total, amount).is_ok() {
            assert!(idx.remainder < total, "X2: remainder not below total");
        }
    }

    /// X3: one accrual step conserves the scaled amount exactly
    #[kani::proof]
    #[kani::unwind(2)]
    fn x3_single_step_conservation() {
        let mut idx = AccrualIndex::new();
        let total: u128 = kani::any();
        let amount: u128 = kani::any();

        kani::assume(total > 0 && total < (1u128 << 32));
        kani::assume(amount > 0 && amount < (1u128 << 32));

        idx.accrue(total, amount).unwrap();

        // delta * total + remainder == amount * SCALE
        let redistributed = idx.value * total + idx.remainder;
        assert!(redistributed == amount * SCALE, "X3: scaled amount leaked");
    }
}
