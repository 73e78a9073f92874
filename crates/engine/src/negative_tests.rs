//! Negative-path tests: every rejected operation must leave the pool
//! bit-identical to its pre-call snapshot.
//!
//! Each case stages a pool, snapshots it, drives one operation into a
//! specific error, and asserts both the error variant and the absence
//! of any state change.

use crate::config::{GovParams, PoolConfig, EPOCH_SECS};
use crate::error::LedgerError;
use crate::pool::{FeeSource, Pool};
use crate::position::PositionKey;

fn key(n: u64) -> PositionKey {
    PositionKey::from_u64(n)
}

/// Run `op` against a snapshot of `pool`, assert it fails with `want`,
/// and assert the pool is unchanged.
fn assert_rejected<F>(pool: &mut Pool, want: LedgerError, op: F)
where
    F: FnOnce(&mut Pool) -> Result<(), LedgerError>,
{
    let before = pool.clone();
    assert_eq!(op(pool), Err(want));
    assert_eq!(*pool, before, "rejected operation mutated the pool");
}

fn funded_pool() -> Pool {
    let mut pool = Pool::new(PoolConfig::relaxed(), 0);
    pool.deposit(key(1), 10_000).unwrap();
    pool.deposit(key(2), 5_000).unwrap();
    pool
}

#[test]
fn test_n1_zero_amounts_rejected() {
    let mut pool = funded_pool();
    let gov = GovParams::relaxed();

    assert_rejected(&mut pool, LedgerError::ZeroAmount, |p| p.deposit(key(1), 0));
    assert_rejected(&mut pool, LedgerError::ZeroAmount, |p| p.withdraw(key(1), 0, 0));
    assert_rejected(&mut pool, LedgerError::ZeroAmount, |p| {
        p.accrue_fee(0, FeeSource::Yield)
    });
    assert_rejected(&mut pool, LedgerError::ZeroAmount, |p| {
        p.open_rolling(key(1), 0, 1_000, EPOCH_SECS, 0, 0)
    });
    assert_rejected(&mut pool, LedgerError::ZeroAmount, |p| {
        p.open_fixed(key(1), 0, 0, 0, 0).map(|_| ())
    });
    assert_rejected(&mut pool, LedgerError::ZeroAmount, |p| {
        p.make_payment(key(1), 0, 0, &gov).map(|_| ())
    });
}

#[test]
fn test_n2_below_minimum_deposit() {
    let mut pool = Pool::new(
        PoolConfig { min_deposit: 100, ..PoolConfig::relaxed() },
        0,
    );
    assert_rejected(&mut pool, LedgerError::BelowMinimum, |p| p.deposit(key(1), 99));
    pool.deposit(key(1), 100).unwrap();
}

#[test]
fn test_n3_unknown_position() {
    let mut pool = funded_pool();
    assert_rejected(&mut pool, LedgerError::UnknownPosition, |p| {
        p.withdraw(key(99), 1, 0)
    });
    assert_rejected(&mut pool, LedgerError::UnknownPosition, |p| p.settle(key(99)));
    assert_rejected(&mut pool, LedgerError::UnknownPosition, |p| {
        p.cleanup_membership(key(99))
    });
    assert_rejected(&mut pool, LedgerError::UnknownPosition, |p| {
        p.open_rolling(key(99), 100, 1_000, EPOCH_SECS, 0, 0)
    });
}

#[test]
fn test_n4_withdraw_over_principal() {
    let mut pool = funded_pool();
    assert_rejected(&mut pool, LedgerError::InsufficientSolvency, |p| {
        p.withdraw(key(2), 5_001, 0)
    });
}

#[test]
fn test_n5_withdraw_blocked_by_seizure_exposure() {
    let mut pool = funded_pool();
    pool.open_rolling(key(1), 1_000, 1_000, EPOCH_SECS, 0, 0).unwrap();

    // Exposure: 1000 debt + min(5% of 10_000, 1000) = 1500. Principal
    // may not drop below it.
    assert_rejected(&mut pool, LedgerError::InsufficientSolvency, |p| {
        p.withdraw(key(1), 8_501, 0)
    });
    pool.withdraw(key(1), 8_500, 0).unwrap();
}

#[test]
fn test_n6_external_debt_counts_toward_ltv() {
    let mut pool = funded_pool();
    // LTV 80% of 10_000 = 8_000 debt ceiling.
    assert_rejected(&mut pool, LedgerError::InsufficientSolvency, |p| {
        p.open_rolling(key(1), 1_000, 1_000, EPOCH_SECS, 7_001, 0)
    });
    pool.open_rolling(key(1), 1_000, 1_000, EPOCH_SECS, 7_000, 0).unwrap();
}

#[test]
fn test_n7_double_rolling_rejected() {
    let mut pool = funded_pool();
    pool.open_rolling(key(1), 500, 1_000, EPOCH_SECS, 0, 0).unwrap();
    assert_rejected(&mut pool, LedgerError::RollingAlreadyActive, |p| {
        p.open_rolling(key(1), 500, 1_000, EPOCH_SECS, 0, 0)
    });
}

#[test]
fn test_n8_rolling_ops_require_active_line() {
    let mut pool = funded_pool();
    let gov = GovParams::relaxed();
    assert_rejected(&mut pool, LedgerError::RollingNotActive, |p| {
        p.make_payment(key(1), 10, 0, &gov).map(|_| ())
    });
    assert_rejected(&mut pool, LedgerError::RollingNotActive, |p| {
        p.expand_rolling(key(1), 10, 0)
    });
    assert_rejected(&mut pool, LedgerError::RollingNotActive, |p| {
        p.close_rolling(key(1), 10)
    });
    assert_rejected(&mut pool, LedgerError::RollingNotActive, |p| {
        p.penalize_rolling(key(1), 0, &gov).map(|_| ())
    });
}

#[test]
fn test_n9_rate_above_cap() {
    let mut pool = funded_pool();
    let cap = pool.config.max_rolling_apy_bps;
    assert_rejected(&mut pool, LedgerError::RateAboveCap, |p| {
        p.open_rolling(key(1), 500, cap + 1, EPOCH_SECS, 0, 0)
    });
}

#[test]
fn test_n10_payment_below_floor() {
    let mut pool = funded_pool();
    // 10% minimum payment on 1000 remaining.
    let gov = GovParams { min_payment_bps: 1_000, ..GovParams::relaxed() };
    pool.open_rolling(key(1), 1_000, 1_000, EPOCH_SECS, 0, 0).unwrap();

    assert_rejected(&mut pool, LedgerError::PaymentTooSmall, |p| {
        p.make_payment(key(1), 99, 0, &gov).map(|_| ())
    });
    pool.make_payment(key(1), 100, 0, &gov).unwrap();
}

#[test]
fn test_n11_payoff_smaller_than_floor_accepted() {
    let mut pool = funded_pool();
    let gov = GovParams { min_payment_bps: 1_000, ..GovParams::relaxed() };
    pool.open_rolling(key(1), 1_000, 1_000, EPOCH_SECS, 0, 0).unwrap();
    pool.make_payment(key(1), 995, 0, &gov).unwrap();

    // Remaining 5: below any floor, but a full payoff always clears.
    pool.make_payment(key(1), 5, 0, &gov).unwrap();
    assert!(!pool.position(key(1)).unwrap().rolling.active);
}

#[test]
fn test_n12_close_rolling_requires_full_payoff() {
    let mut pool = funded_pool();
    pool.open_rolling(key(1), 1_000, 1_000, EPOCH_SECS, 0, 0).unwrap();
    assert_rejected(&mut pool, LedgerError::PaymentTooSmall, |p| {
        p.close_rolling(key(1), 999)
    });
    pool.close_rolling(key(1), 1_000).unwrap();
}

#[test]
fn test_n13_penalize_before_threshold() {
    let mut pool = funded_pool();
    let gov = GovParams::relaxed(); // penalty_epochs: 3
    pool.open_rolling(key(1), 1_000, 1_000, EPOCH_SECS, 0, 0).unwrap();

    // Two whole intervals missed: delinquent, not yet penalizable.
    assert_rejected(&mut pool, LedgerError::NotYetPenalizable, |p| {
        p.penalize_rolling(key(1), 2 * EPOCH_SECS, &gov).map(|_| ())
    });
    pool.penalize_rolling(key(1), 3 * EPOCH_SECS, &gov).unwrap();
}

#[test]
fn test_n14_invalid_term_index() {
    let mut pool = funded_pool();
    let menu_len = pool.config.term_menu.len();
    assert_rejected(&mut pool, LedgerError::InvalidTermIndex, |p| {
        p.open_fixed(key(1), 100, menu_len, 0, 0).map(|_| ())
    });
}

#[test]
fn test_n15_fixed_wrong_borrower_and_missing() {
    let mut pool = funded_pool();
    let gov = GovParams::relaxed();
    let id = pool.open_fixed(key(1), 100, 0, 0, 0).unwrap();

    assert_rejected(&mut pool, LedgerError::WrongBorrower, |p| {
        p.repay_fixed(key(2), id, 50).map(|_| ())
    });
    assert_rejected(&mut pool, LedgerError::WrongBorrower, |p| {
        p.penalize_fixed(key(2), id, u64::MAX, &gov).map(|_| ())
    });
    assert_rejected(&mut pool, LedgerError::LoanNotFound, |p| {
        p.repay_fixed(key(1), id + 1, 50).map(|_| ())
    });
}

#[test]
fn test_n16_fixed_closed_loan_rejected() {
    let mut pool = funded_pool();
    let gov = GovParams::relaxed();
    let id = pool.open_fixed(key(1), 100, 0, 0, 0).unwrap();
    pool.repay_fixed(key(1), id, 100).unwrap();

    assert_rejected(&mut pool, LedgerError::LoanClosed, |p| {
        p.repay_fixed(key(1), id, 1).map(|_| ())
    });
    assert_rejected(&mut pool, LedgerError::LoanClosed, |p| {
        p.penalize_fixed(key(1), id, u64::MAX, &gov).map(|_| ())
    });
}

#[test]
fn test_n17_fixed_penalty_before_expiry() {
    let mut pool = funded_pool();
    let gov = GovParams::relaxed();
    let id = pool.open_fixed(key(1), 100, 0, 0, 0).unwrap();
    let expiry = pool.fixed_loan(key(1), id).unwrap().expiry;

    // At expiry exactly is still too early; strictly after is not.
    assert_rejected(&mut pool, LedgerError::NotExpired, |p| {
        p.penalize_fixed(key(1), id, expiry, &gov).map(|_| ())
    });
    pool.penalize_fixed(key(1), id, expiry + 1, &gov).unwrap();
}

#[test]
fn test_n18_membership_blocked_reports_reason() {
    let mut pool = funded_pool();
    assert_rejected(
        &mut pool,
        LedgerError::MembershipBlocked("principal outstanding"),
        |p| p.cleanup_membership(key(2)),
    );

    pool.withdraw(key(2), 5_000, 0).unwrap();
    pool.set_encumbrance(key(2), 0, 0, 0, 0).unwrap();
    pool.cleanup_membership(key(2)).unwrap();
}

#[test]
fn test_n19_encumbrance_blocks_membership_and_withdraw() {
    let mut pool = funded_pool();
    pool.set_encumbrance(key(2), 2_000, 0, 0, 0).unwrap();

    assert_rejected(&mut pool, LedgerError::InsufficientSolvency, |p| {
        p.withdraw(key(2), 3_001, 0)
    });
    pool.withdraw(key(2), 3_000, 0).unwrap();

    assert_rejected(
        &mut pool,
        LedgerError::MembershipBlocked("principal outstanding"),
        |p| p.cleanup_membership(key(2)),
    );
}

#[test]
fn test_n20_borrowed_out_tokens_stay_accounted() {
    let mut pool = Pool::new(PoolConfig::relaxed(), 0);
    let gov = GovParams::relaxed();
    pool.deposit(key(1), 10_000).unwrap();
    pool.open_rolling(key(1), 8_000, 1_000, EPOCH_SECS, 0, 0).unwrap();
    assert_eq!(pool.tracked_balance, 2_000);

    // At the loan-to-value edge no principal may leave, even though
    // some tokens remain in the pool.
    assert_rejected(&mut pool, LedgerError::InsufficientSolvency, |p| {
        p.withdraw(key(1), 1, 0)
    });

    // Paying down debt restores headroom: 6_000 remaining against
    // 7_500 principal sits exactly at the 80% ceiling.
    pool.make_payment(key(1), 2_000, 0, &gov).unwrap();
    assert_eq!(pool.tracked_balance, 4_000);
    pool.withdraw(key(1), 2_500, 0).unwrap();
    assert_eq!(pool.tracked_balance, 1_500);
}
