//! Per-position ledger records and loan instruments.

use crate::error::{LedgerError, Result};
use crate::math::apply_bps;
use crate::config::PENALTY_RATE_BPS;

/// Opaque position identity, derived from an owned token by the
/// identity collaborator. The ledger never inspects the bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PositionKey(pub [u8; 32]);

impl PositionKey {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Convenience constructor for tests and simulations.
    pub const fn from_u64(n: u64) -> Self {
        let b = n.to_le_bytes();
        let mut key = [0u8; 32];
        key[0] = b[0];
        key[1] = b[1];
        key[2] = b[2];
        key[3] = b[3];
        key[4] = b[4];
        key[5] = b[5];
        key[6] = b[6];
        key[7] = b[7];
        Self(key)
    }
}

/// Stable loan handle, unique per pool.
pub type LoanId = u64;

/// One depositor/borrower record in one pool.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Position {
    /// Deposited collateral value.
    pub principal: u128,

    /// Fee-index value at last settlement.
    pub fee_checkpoint: u128,

    /// Maintenance-index value at last settlement.
    pub maintenance_checkpoint: u128,

    /// Settled-but-uncompounded yield.
    pub accrued_yield: u128,

    /// Externally locked principal (consumed, not owned, here).
    pub locked: u128,

    /// Principal lent out through external direct loans.
    pub lent_out: u128,

    /// Principal held in external escrow.
    pub escrowed: u128,

    /// The single rolling credit line slot.
    pub rolling: RollingCreditLoan,

    /// Number of open fixed-term loans (registry holds the ids).
    pub fixed_open: u64,
}

impl Position {
    /// Principal committed to obligations outside the core loan types.
    pub fn encumbrance(&self) -> u128 {
        self.locked
            .saturating_add(self.lent_out)
            .saturating_add(self.escrowed)
    }
}

/// Revolving credit line. At most one per position per pool; the slot
/// is zeroed (`active == false`) on close or penalty rather than
/// removed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RollingCreditLoan {
    pub principal: u128,
    pub principal_remaining: u128,

    /// Position's total principal at open - the penalty base, not the
    /// borrowed amount.
    pub principal_at_open: u128,

    pub apy_bps: u64,
    pub opened_at: u64,
    pub last_payment_ts: u64,

    /// Whole payment epochs missed, accumulated at payment time.
    pub missed_payments: u64,

    pub payment_interval_secs: u64,

    /// Active-credit index value at last settlement of this line.
    pub credit_checkpoint: u128,

    pub active: bool,
}

impl RollingCreditLoan {
    /// Payment epochs owed since the last payment, capped at the
    /// loan's elapsed schedule.
    pub fn epochs_due(&self, now: u64) -> u64 {
        if self.payment_interval_secs == 0 {
            return 0;
        }
        let since_payment = now.saturating_sub(self.last_payment_ts) / self.payment_interval_secs;
        let since_open = now.saturating_sub(self.opened_at) / self.payment_interval_secs;
        core::cmp::min(since_payment, since_open)
    }

    /// Missed payments as seen by the delinquency and penalty gates:
    /// the recorded count plus whatever has silently elapsed since the
    /// last payment. Lazy, so an absent borrower can be penalized
    /// without a bookkeeping payment first.
    pub fn effective_missed(&self, now: u64) -> u64 {
        self.missed_payments.saturating_add(self.epochs_due(now))
    }
}

/// Term loan with a per-loan penalty base. Multiple may be open per
/// position; ids are enumerated through the loan registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedTermLoan {
    pub principal: u128,
    pub principal_remaining: u128,
    pub principal_at_open: u128,
    pub apy_bps: u64,
    pub opened_at: u64,
    pub expiry: u64,
    pub closed: bool,
}

/// Capability view shared by the default engine: both loan kinds
/// expose their outstanding debt and penalty base through it, so the
/// seizure/penalty arithmetic is written exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Obligation {
    pub outstanding_debt: u128,
    pub penalty_base: u128,
}

impl Obligation {
    pub fn of_rolling(loan: &RollingCreditLoan) -> Self {
        Self {
            outstanding_debt: loan.principal_remaining,
            penalty_base: loan.principal_at_open,
        }
    }

    pub fn of_fixed(loan: &FixedTermLoan) -> Self {
        Self {
            outstanding_debt: loan.principal_remaining,
            penalty_base: loan.principal_at_open,
        }
    }

    /// Penalty actually applied on default: 5% of the penalty base,
    /// never more than the outstanding debt.
    pub fn penalty_applied(&self) -> Result<u128> {
        let penalty = apply_bps(self.penalty_base, PENALTY_RATE_BPS)?;
        Ok(core::cmp::min(penalty, self.outstanding_debt))
    }

    /// Principal seized on default: debt plus applied penalty.
    pub fn total_seized(&self) -> Result<u128> {
        self.outstanding_debt
            .checked_add(self.penalty_applied()?)
            .ok_or(LedgerError::Overflow)
    }

    /// Worst-case seizure if this obligation defaulted right now; used
    /// by solvency checks on withdrawals.
    pub fn seizure_exposure(&self) -> Result<u128> {
        self.total_seized()
    }
}
