//! The per-pool ledger and every top-level operation on it.
//!
//! One `Pool` owns all state for one underlying-asset context: totals,
//! the three accrual indices, position records, open fixed-term loans,
//! and the loan registry. Every subsystem mutates the pool through
//! `&mut self` methods; callers never hold a duplicate copy.
//!
//! All methods are transactional: state is staged on cloned records and
//! local totals, validated, and only then committed. The one documented
//! partial completion is the maintenance payout, which is capped and
//! carries its shortfall in `pending_maintenance`.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::config::{
    GovParams, PoolConfig, EPOCH_SECS, ENFORCER_SHARE_DIV, FALLBACK_MAINTENANCE_RATE_BPS,
};
use crate::error::{LedgerError, Result};
use crate::index::AccrualIndex;
use crate::math::{apply_bps, checked_add, checked_sub, min3, mul_div};
use crate::position::{
    FixedTermLoan, LoanId, Obligation, Position, PositionKey, RollingCreditLoan,
};
use crate::registry::LoanRegistry;

/// Provenance tag for fee accruals. The ledger treats all sources
/// identically; the tag exists for observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeeSource {
    /// Ordinary yield routed to depositors.
    Yield,
    /// Residual penalty proceeds from a default.
    PenaltyResidual,
    /// Anything pushed in from outside the core.
    External,
}

/// Rolling credit line state as seen by the delinquency gates.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RollingStatus {
    Inactive,
    Active,
    Delinquent,
    Penalizable,
}

/// Result of one maintenance enforcement pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaintenanceOutcome {
    /// Whole epochs consumed.
    pub epochs: u64,
    /// Fee newly accrued into `pending_maintenance`.
    pub fee_accrued: u128,
    /// Amount actually paid to the foundation receiver.
    pub paid: u128,
}

/// Full accounting of one default settlement. By construction
/// `enforcer_share + treasury_share + active_credit_share +
/// fee_index_share == penalty_applied`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DefaultOutcome {
    pub outstanding_debt: u128,
    pub penalty_applied: u128,
    pub total_seized: u128,
    pub enforcer_share: u128,
    pub treasury_share: u128,
    pub active_credit_share: u128,
    pub fee_index_share: u128,
}

/// Penalty, seizure, and the four-way split for one obligation,
/// independent of any pool state. Splits are computed on successive
/// remainders, so the four shares reassemble the applied penalty
/// exactly. A missing treasury folds its cut back into the rest.
pub fn preview_default(obligation: Obligation, gov: &GovParams) -> Result<DefaultOutcome> {
    let penalty_applied = obligation.penalty_applied()?;
    let total_seized = obligation.total_seized()?;

    let enforcer_share = penalty_applied / ENFORCER_SHARE_DIV;
    let mut rem = penalty_applied - enforcer_share;

    let treasury_share = match gov.treasury {
        Some(_) => apply_bps(rem, gov.treasury_bps)?,
        None => 0,
    };
    rem -= treasury_share;

    let active_credit_share = apply_bps(rem, gov.active_credit_bps)?;
    let fee_index_share = rem - active_credit_share;

    Ok(DefaultOutcome {
        outstanding_debt: obligation.outstanding_debt,
        penalty_applied,
        total_seized,
        enforcer_share,
        treasury_share,
        active_credit_share,
        fee_index_share,
    })
}

/// An open fixed-term loan and the position that owes it. Loan ids are
/// pool-unique, so ownership lives beside the loan and a mismatched
/// caller is distinguishable from a missing loan.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FixedEntry {
    owner: PositionKey,
    loan: FixedTermLoan,
}

/// One pool's complete ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Pool {
    /// Immutable pool configuration.
    pub config: PoolConfig,

    /// Sum of live principal across positions. Maintenance decay
    /// reaches this total through the same settle rule as the positions
    /// themselves, so the two never diverge.
    pub total_deposits: u128,

    /// Ledger's belief about this pool's token holdings. May lag the
    /// real balance; never another pool's.
    pub tracked_balance: u128,

    /// Accrued-but-unpaid maintenance.
    pub pending_maintenance: u128,

    /// Timestamp of the last whole maintenance epoch consumed.
    pub last_maintenance_ts: u64,

    /// Depositor yield index.
    pub fee_index: AccrualIndex,

    /// Maintenance decay index.
    pub maintenance_index: AccrualIndex,

    /// Active-credit index, weighted by open rolling principal.
    pub active_credit_index: AccrualIndex,

    /// Current weight total behind the active-credit index.
    pub rolling_principal_total: u128,

    /// Next fixed-term loan id.
    pub next_loan_id: LoanId,

    /// Position records, keyed by opaque identity.
    pub positions: BTreeMap<PositionKey, Position>,

    fixed_loans: BTreeMap<LoanId, FixedEntry>,
    registry: LoanRegistry,
}

impl Pool {
    pub fn new(config: PoolConfig, created_at: u64) -> Self {
        Self {
            config,
            total_deposits: 0,
            tracked_balance: 0,
            pending_maintenance: 0,
            last_maintenance_ts: created_at,
            fee_index: AccrualIndex::new(),
            maintenance_index: AccrualIndex::new(),
            active_credit_index: AccrualIndex::new(),
            rolling_principal_total: 0,
            next_loan_id: 1,
            positions: BTreeMap::new(),
            fixed_loans: BTreeMap::new(),
            registry: LoanRegistry::new(),
        }
    }

    // ========================================================================
    // Views
    // ========================================================================

    pub fn position(&self, key: PositionKey) -> Option<&Position> {
        self.positions.get(&key)
    }

    pub fn fixed_loan(&self, key: PositionKey, id: LoanId) -> Option<&FixedTermLoan> {
        self.fixed_loans
            .get(&id)
            .filter(|entry| entry.owner == key)
            .map(|entry| &entry.loan)
    }

    /// Open fixed-term loan ids for a position, paginated; see the
    /// registry for the walk semantics.
    pub fn loans_by_position(
        &self,
        key: PositionKey,
        offset: u64,
        limit: u64,
    ) -> (Vec<LoanId>, u64) {
        self.registry.loans_by_position(key, offset, limit)
    }

    /// What `settle` would credit, without mutating: settled cache plus
    /// the fee-index delta since the position's checkpoint.
    pub fn pending_yield(&self, key: PositionKey) -> Result<u128> {
        let pos = self.positions.get(&key).ok_or(LedgerError::UnknownPosition)?;
        let pending = self
            .fee_index
            .pending(pos.principal, pos.fee_checkpoint)?;
        checked_add(pos.accrued_yield, pending)
    }

    /// Total debt touching a position: rolling remaining, all open
    /// fixed-term remaining, plus externally-supplied direct-loan debt.
    pub fn total_debt(&self, key: PositionKey, external_debt: u128) -> Result<u128> {
        let pos = self.positions.get(&key).ok_or(LedgerError::UnknownPosition)?;
        let mut debt = external_debt;
        if pos.rolling.active {
            debt = checked_add(debt, pos.rolling.principal_remaining)?;
        }
        let (ids, _) = self.registry.loans_by_position(key, 0, u64::MAX);
        for id in ids {
            if let Some(entry) = self.fixed_loans.get(&id) {
                debt = checked_add(debt, entry.loan.principal_remaining)?;
            }
        }
        Ok(debt)
    }

    pub fn rolling_status(&self, key: PositionKey, now: u64, gov: &GovParams) -> RollingStatus {
        let Some(pos) = self.positions.get(&key) else {
            return RollingStatus::Inactive;
        };
        if !pos.rolling.active {
            return RollingStatus::Inactive;
        }
        let missed = pos.rolling.effective_missed(now);
        if missed >= gov.penalty_epochs {
            RollingStatus::Penalizable
        } else if missed >= gov.delinquency_epochs {
            RollingStatus::Delinquent
        } else {
            RollingStatus::Active
        }
    }

    /// Sum of recorded principal, for conservation checks. Equal to
    /// `total_deposits` at every step.
    pub fn sum_of_principal(&self) -> u128 {
        self.positions.values().map(|p| p.principal).sum()
    }

    pub fn position_keys(&self) -> Vec<PositionKey> {
        self.positions.keys().copied().collect()
    }

    // ========================================================================
    // Internal settlement plumbing
    // ========================================================================

    /// Apply fee credit and maintenance decay to a staged position.
    /// Idempotent against unchanged indices. Returns the decay taken
    /// from principal; the committing caller subtracts the same amount
    /// from `total_deposits`, so the total and the principal sum move
    /// in lockstep.
    fn settle_staged(&self, pos: &mut Position) -> Result<u128> {
        let fee_add = self
            .fee_index
            .pending(pos.principal, pos.fee_checkpoint)?;
        let decay = core::cmp::min(
            self.maintenance_index
                .pending(pos.principal, pos.maintenance_checkpoint)?,
            pos.principal,
        );

        pos.accrued_yield = checked_add(pos.accrued_yield, fee_add)?;
        pos.principal -= decay;
        pos.fee_checkpoint = self.fee_index.value;
        pos.maintenance_checkpoint = self.maintenance_index.value;
        Ok(decay)
    }

    /// Credit the active-credit share earned by a staged rolling line
    /// since its checkpoint. Must run before `principal_remaining`
    /// changes, because remaining principal is the index weight.
    fn settle_credit_staged(&self, pos: &mut Position) -> Result<()> {
        if !pos.rolling.active {
            return Ok(());
        }
        let pending = self.active_credit_index.pending(
            pos.rolling.principal_remaining,
            pos.rolling.credit_checkpoint,
        )?;
        pos.accrued_yield = checked_add(pos.accrued_yield, pending)?;
        pos.rolling.credit_checkpoint = self.active_credit_index.value;
        Ok(())
    }

    /// Roll settled yield into principal. Returns the new pool total.
    /// Runs automatically before any debt increase.
    fn compound_staged(&self, pos: &mut Position) -> Result<u128> {
        let yield_amount = pos.accrued_yield;
        pos.principal = checked_add(pos.principal, yield_amount)?;
        pos.accrued_yield = 0;
        checked_add(self.total_deposits, yield_amount)
    }

    /// Worst-case seizure across every open obligation of a staged
    /// position.
    fn seizure_exposure(&self, key: PositionKey, pos: &Position) -> Result<u128> {
        let mut exposure = 0u128;
        if pos.rolling.active {
            exposure = checked_add(
                exposure,
                Obligation::of_rolling(&pos.rolling).seizure_exposure()?,
            )?;
        }
        let (ids, _) = self.registry.loans_by_position(key, 0, u64::MAX);
        for id in ids {
            if let Some(entry) = self.fixed_loans.get(&id) {
                exposure = checked_add(
                    exposure,
                    Obligation::of_fixed(&entry.loan).seizure_exposure()?,
                )?;
            }
        }
        Ok(exposure)
    }

    /// The solvency gate from the ledger invariant: principal covers
    /// encumbrance plus worst-case seizure, and total debt stays under
    /// the loan-to-value ceiling.
    fn check_solvency(
        &self,
        key: PositionKey,
        pos: &Position,
        extra_debt: u128,
        extra_exposure: u128,
        external_debt: u128,
    ) -> Result<()> {
        let exposure = checked_add(self.seizure_exposure(key, pos)?, extra_exposure)?;
        let committed = checked_add(pos.encumbrance(), exposure)?;
        if pos.principal < committed {
            return Err(LedgerError::InsufficientSolvency);
        }

        let mut debt = checked_add(external_debt, extra_debt)?;
        if pos.rolling.active {
            debt = checked_add(debt, pos.rolling.principal_remaining)?;
        }
        let (ids, _) = self.registry.loans_by_position(key, 0, u64::MAX);
        for id in ids {
            if let Some(entry) = self.fixed_loans.get(&id) {
                debt = checked_add(debt, entry.loan.principal_remaining)?;
            }
        }

        let debt_scaled = debt.checked_mul(10_000).ok_or(LedgerError::Overflow)?;
        let ceiling = pos
            .principal
            .checked_mul(self.config.loan_to_value_bps as u128)
            .ok_or(LedgerError::Overflow)?;
        if debt_scaled > ceiling {
            return Err(LedgerError::InsufficientSolvency);
        }
        Ok(())
    }

    // ========================================================================
    // Deposits, withdrawals, settlement
    // ========================================================================

    /// Credit a deposit. `net_received` is what the transfer
    /// collaborator actually collected, never the requested amount, so
    /// fee-deducting tokens cannot overstate the ledger.
    pub fn deposit(&mut self, key: PositionKey, net_received: u128) -> Result<()> {
        if net_received == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if net_received < self.config.min_deposit {
            return Err(LedgerError::BelowMinimum);
        }

        let (mut pos, decay) = match self.positions.get(&key) {
            Some(existing) => {
                let mut staged = existing.clone();
                // Settle before the weight changes.
                let decay = self.settle_staged(&mut staged)?;
                (staged, decay)
            }
            None => (
                Position {
                    // New members start checkpointed at the current
                    // index values; history before joining is not
                    // theirs.
                    fee_checkpoint: self.fee_index.value,
                    maintenance_checkpoint: self.maintenance_index.value,
                    ..Position::default()
                },
                0,
            ),
        };

        pos.principal = checked_add(pos.principal, net_received)?;
        let new_total =
            checked_sub(checked_add(self.total_deposits, net_received)?, decay)?;
        let new_tracked = checked_add(self.tracked_balance, net_received)?;

        self.positions.insert(key, pos);
        self.total_deposits = new_total;
        self.tracked_balance = new_tracked;
        Ok(())
    }

    /// Withdraw principal. Settles outstanding index deltas first, then
    /// verifies the post-withdraw position still covers its
    /// obligations.
    pub fn withdraw(
        &mut self,
        key: PositionKey,
        amount: u128,
        external_debt: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        let decay = self.settle_staged(&mut pos)?;

        if pos.principal < amount {
            return Err(LedgerError::InsufficientSolvency);
        }
        pos.principal -= amount;
        self.check_solvency(key, &pos, 0, 0, external_debt)?;

        if self.tracked_balance < amount {
            return Err(LedgerError::InsufficientTrackedBalance);
        }

        self.positions.insert(key, pos);
        self.total_deposits =
            checked_sub(self.total_deposits, checked_add(amount, decay)?)?;
        self.tracked_balance -= amount;
        Ok(())
    }

    /// Settle a position against the fee and maintenance indices.
    /// Calling twice with no intervening accrual is a no-op.
    pub fn settle(&mut self, key: PositionKey) -> Result<()> {
        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        let decay = self.settle_staged(&mut pos)?;
        self.settle_credit_staged(&mut pos)?;
        self.positions.insert(key, pos);
        self.total_deposits = checked_sub(self.total_deposits, decay)?;
        Ok(())
    }

    /// Accrue a fee amount across current depositors. With zero
    /// deposits the distribution is a documented no-op (the tokens
    /// still arrive and are tracked).
    pub fn accrue_fee(&mut self, amount: u128, _source: FeeSource) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let new_tracked = checked_add(self.tracked_balance, amount)?;
        self.fee_index.accrue(self.total_deposits, amount)?;
        self.tracked_balance = new_tracked;
        Ok(())
    }

    /// Settle and roll cached yield into principal. Runs implicitly
    /// before any debt increase; exposed for depositors who want to
    /// compound without borrowing. Returns the amount rolled.
    pub fn compound_yield(&mut self, key: PositionKey) -> Result<u128> {
        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        let decay = self.settle_staged(&mut pos)?;
        self.settle_credit_staged(&mut pos)?;
        let rolled = pos.accrued_yield;
        let new_total = checked_sub(self.compound_staged(&mut pos)?, decay)?;
        self.positions.insert(key, pos);
        self.total_deposits = new_total;
        Ok(rolled)
    }

    /// Clear a position's membership record, along with the member's
    /// closed loan records. Succeeds only when nothing is owed in
    /// either direction; otherwise names the blocking obligation.
    pub fn cleanup_membership(&mut self, key: PositionKey) -> Result<()> {
        let pos = self
            .positions
            .get(&key)
            .ok_or(LedgerError::UnknownPosition)?;

        if pos.principal != 0 {
            return Err(LedgerError::MembershipBlocked("principal outstanding"));
        }
        if pos.accrued_yield != 0 {
            return Err(LedgerError::MembershipBlocked("unsettled yield"));
        }
        if pos.rolling.active {
            return Err(LedgerError::MembershipBlocked("active rolling credit line"));
        }
        if pos.fixed_open != 0 {
            return Err(LedgerError::MembershipBlocked("open fixed-term loans"));
        }
        if pos.encumbrance() != 0 {
            return Err(LedgerError::MembershipBlocked("outstanding encumbrance"));
        }

        // `fixed_open` is zero here, so everything left under this key
        // is a closed loan retained for queries during membership.
        self.fixed_loans.retain(|_, entry| entry.owner != key);
        self.positions.remove(&key);
        Ok(())
    }

    /// Record externally-held obligations (locks, direct lending,
    /// escrow). The core consumes these for solvency; it never creates
    /// them.
    pub fn set_encumbrance(
        &mut self,
        key: PositionKey,
        locked: u128,
        lent_out: u128,
        escrowed: u128,
        external_debt: u128,
    ) -> Result<()> {
        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        let decay = self.settle_staged(&mut pos)?;
        pos.locked = locked;
        pos.lent_out = lent_out;
        pos.escrowed = escrowed;
        self.check_solvency(key, &pos, 0, 0, external_debt)?;
        self.positions.insert(key, pos);
        self.total_deposits = checked_sub(self.total_deposits, decay)?;
        Ok(())
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Advance maintenance by whole epochs and pay out what the pool
    /// can afford.
    ///
    /// The fee is charged against current deposits and recorded in
    /// `pending_maintenance`; the matching principal decay flows
    /// through the maintenance index and reaches each position (and
    /// the deposit total) as it settles. Payment is capped at
    /// `min(pending, tracked, available)` - the only partial
    /// completion in the ledger - and withheld entirely when no
    /// foundation receiver is configured. `available_asset_balance` is
    /// the real token balance the transfer collaborator can see; the
    /// cap is what keeps pools from draining each other when they
    /// share an asset.
    pub fn enforce_maintenance(
        &mut self,
        now: u64,
        gov: &GovParams,
        available_asset_balance: u128,
    ) -> Result<MaintenanceOutcome> {
        let elapsed = now.saturating_sub(self.last_maintenance_ts);
        let epochs = elapsed / EPOCH_SECS;
        if epochs == 0 {
            return Ok(MaintenanceOutcome::default());
        }

        let rate_bps = if self.config.maintenance_rate_bps != 0 {
            self.config.maintenance_rate_bps
        } else if gov.default_maintenance_rate_bps != 0 {
            gov.default_maintenance_rate_bps
        } else {
            FALLBACK_MAINTENANCE_RATE_BPS
        };

        // fee = deposits * rate_bps * epochs / (365 * 10_000), capped
        // so decay can never exceed what exists.
        let annual = mul_div(self.total_deposits, rate_bps as u128, 10_000)?;
        let fee = core::cmp::min(
            mul_div(annual, epochs as u128, 365)?,
            self.total_deposits,
        );

        // The accrual base equals the principal the decay will later
        // settle against; the total itself shrinks only at settle.
        self.maintenance_index.accrue(self.total_deposits, fee)?;
        self.pending_maintenance = checked_add(self.pending_maintenance, fee)?;
        self.last_maintenance_ts += epochs * EPOCH_SECS;

        let paid = if gov.foundation.is_some() {
            let paid = min3(
                self.pending_maintenance,
                self.tracked_balance,
                available_asset_balance,
            );
            self.pending_maintenance -= paid;
            self.tracked_balance -= paid;
            paid
        } else {
            0
        };

        Ok(MaintenanceOutcome { epochs, fee_accrued: fee, paid })
    }

    // ========================================================================
    // Rolling credit
    // ========================================================================

    /// Open the position's rolling credit line.
    pub fn open_rolling(
        &mut self,
        key: PositionKey,
        amount: u128,
        apy_bps: u64,
        payment_interval_secs: u64,
        external_debt: u128,
        now: u64,
    ) -> Result<()> {
        if amount == 0 || payment_interval_secs == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if amount < self.config.min_loan_amount {
            return Err(LedgerError::BelowMinimum);
        }
        if apy_bps > self.config.max_rolling_apy_bps {
            return Err(LedgerError::RateAboveCap);
        }

        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        if pos.rolling.active {
            return Err(LedgerError::RollingAlreadyActive);
        }

        let decay = self.settle_staged(&mut pos)?;
        // Auto-compound before increasing debt.
        let new_total = checked_sub(self.compound_staged(&mut pos)?, decay)?;

        let new_loan = RollingCreditLoan {
            principal: amount,
            principal_remaining: amount,
            principal_at_open: pos.principal,
            apy_bps,
            opened_at: now,
            last_payment_ts: now,
            missed_payments: 0,
            payment_interval_secs,
            credit_checkpoint: self.active_credit_index.value,
            active: true,
        };
        let exposure = Obligation::of_rolling(&new_loan).seizure_exposure()?;
        self.check_solvency(key, &pos, amount, exposure, external_debt)?;

        if self.tracked_balance < amount {
            return Err(LedgerError::InsufficientTrackedBalance);
        }

        pos.rolling = new_loan;
        self.positions.insert(key, pos);
        self.total_deposits = new_total;
        self.tracked_balance -= amount;
        self.rolling_principal_total = checked_add(self.rolling_principal_total, amount)?;
        Ok(())
    }

    /// Apply a rolling payment. The applied amount goes entirely to
    /// remaining principal; interest on rolling credit is
    /// rate-tracking only. Anything beyond the remaining principal
    /// stays with the payer and never enters the pool. Missed epochs
    /// since the last payment are recorded before the clock resets.
    pub fn make_payment(
        &mut self,
        key: PositionKey,
        net_received: u128,
        now: u64,
        gov: &GovParams,
    ) -> Result<u128> {
        if net_received == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        if !pos.rolling.active {
            return Err(LedgerError::RollingNotActive);
        }

        let decay = self.settle_staged(&mut pos)?;
        self.settle_credit_staged(&mut pos)?;

        let remaining = pos.rolling.principal_remaining;
        let floor = apply_bps(remaining, gov.min_payment_bps)?;
        if net_received < floor && net_received < remaining {
            return Err(LedgerError::PaymentTooSmall);
        }

        // One payment covers one scheduled epoch; the rest were missed.
        let due = pos.rolling.epochs_due(now);
        pos.rolling.missed_payments = pos
            .rolling
            .missed_payments
            .saturating_add(due.saturating_sub(1));
        pos.rolling.last_payment_ts = now;

        let applied = core::cmp::min(net_received, remaining);
        pos.rolling.principal_remaining = remaining - applied;
        let paid_off = pos.rolling.principal_remaining == 0;
        if paid_off {
            pos.rolling = RollingCreditLoan::default();
        }

        self.positions.insert(key, pos);
        self.total_deposits = checked_sub(self.total_deposits, decay)?;
        self.tracked_balance = checked_add(self.tracked_balance, applied)?;
        self.rolling_principal_total = checked_sub(self.rolling_principal_total, applied)?;
        Ok(applied)
    }

    /// Draw further principal on an open rolling line, under the same
    /// solvency gate as opening. The penalty base keeps its snapshot
    /// from open.
    pub fn expand_rolling(
        &mut self,
        key: PositionKey,
        amount: u128,
        external_debt: u128,
    ) -> Result<()> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        if !pos.rolling.active {
            return Err(LedgerError::RollingNotActive);
        }

        let decay = self.settle_staged(&mut pos)?;
        self.settle_credit_staged(&mut pos)?;
        let new_total = checked_sub(self.compound_staged(&mut pos)?, decay)?;

        // Stage the expanded line, then gate on the enlarged exposure.
        pos.rolling.principal = checked_add(pos.rolling.principal, amount)?;
        pos.rolling.principal_remaining =
            checked_add(pos.rolling.principal_remaining, amount)?;
        self.check_solvency(key, &pos, 0, 0, external_debt)?;

        if self.tracked_balance < amount {
            return Err(LedgerError::InsufficientTrackedBalance);
        }

        self.positions.insert(key, pos);
        self.total_deposits = new_total;
        self.tracked_balance -= amount;
        self.rolling_principal_total = checked_add(self.rolling_principal_total, amount)?;
        Ok(())
    }

    /// Explicit payoff: the net amount must cover the full remaining
    /// principal; the slot is zeroed. Only the remaining principal
    /// enters the pool; any surplus stays with the payer.
    pub fn close_rolling(&mut self, key: PositionKey, net_received: u128) -> Result<()> {
        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        if !pos.rolling.active {
            return Err(LedgerError::RollingNotActive);
        }

        let decay = self.settle_staged(&mut pos)?;
        self.settle_credit_staged(&mut pos)?;

        let remaining = pos.rolling.principal_remaining;
        if net_received < remaining {
            return Err(LedgerError::PaymentTooSmall);
        }

        pos.rolling = RollingCreditLoan::default();
        self.positions.insert(key, pos);
        self.total_deposits = checked_sub(self.total_deposits, decay)?;
        self.tracked_balance = checked_add(self.tracked_balance, remaining)?;
        self.rolling_principal_total = checked_sub(self.rolling_principal_total, remaining)?;
        Ok(())
    }

    /// Seize on a defaulted rolling line. Permissionless once the
    /// missed-payment count reaches the penalty threshold; the caller
    /// earns the enforcer share.
    pub fn penalize_rolling(
        &mut self,
        key: PositionKey,
        now: u64,
        gov: &GovParams,
    ) -> Result<DefaultOutcome> {
        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        if !pos.rolling.active {
            return Err(LedgerError::RollingNotActive);
        }
        if pos.rolling.effective_missed(now) < gov.penalty_epochs {
            return Err(LedgerError::NotYetPenalizable);
        }

        let decay = self.settle_staged(&mut pos)?;
        self.settle_credit_staged(&mut pos)?;

        let obligation = Obligation::of_rolling(&pos.rolling);
        let outcome = self.compute_default(&pos, obligation, gov)?;
        let remaining = pos.rolling.principal_remaining;
        pos.rolling = RollingCreditLoan::default();

        self.commit_default(key, pos, &outcome)?;
        self.total_deposits = checked_sub(self.total_deposits, decay)?;
        // The defaulted line stops counting toward active credit
        // before the penalty share is distributed.
        self.rolling_principal_total = checked_sub(self.rolling_principal_total, remaining)?;
        self.distribute_penalty(&outcome)?;
        Ok(outcome)
    }

    // ========================================================================
    // Fixed-term loans
    // ========================================================================

    /// Open a fixed-term loan from the pool's menu. Returns the new
    /// loan id, registered under the borrower's position.
    pub fn open_fixed(
        &mut self,
        key: PositionKey,
        amount: u128,
        term_index: usize,
        external_debt: u128,
        now: u64,
    ) -> Result<LoanId> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        if amount < self.config.min_loan_amount {
            return Err(LedgerError::BelowMinimum);
        }
        let offer = *self
            .config
            .term_menu
            .get(term_index)
            .ok_or(LedgerError::InvalidTermIndex)?;

        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        let decay = self.settle_staged(&mut pos)?;
        let new_total = checked_sub(self.compound_staged(&mut pos)?, decay)?;

        // Each loan snapshots its own penalty base: two loans opened at
        // different times on the same position carry different bases.
        let loan = FixedTermLoan {
            principal: amount,
            principal_remaining: amount,
            principal_at_open: pos.principal,
            apy_bps: offer.apy_bps,
            opened_at: now,
            expiry: now
                .checked_add(offer.duration_secs)
                .ok_or(LedgerError::Overflow)?,
            closed: false,
        };
        let exposure = Obligation::of_fixed(&loan).seizure_exposure()?;
        self.check_solvency(key, &pos, amount, exposure, external_debt)?;

        if self.tracked_balance < amount {
            return Err(LedgerError::InsufficientTrackedBalance);
        }

        let id = self.next_loan_id;
        self.registry.add(key, id)?;
        self.next_loan_id += 1;
        pos.fixed_open += 1;
        self.fixed_loans.insert(id, FixedEntry { owner: key, loan });
        self.positions.insert(key, pos);
        self.total_deposits = new_total;
        self.tracked_balance -= amount;
        Ok(id)
    }

    /// Apply a partial or full repayment. The loan closes and leaves
    /// the registry when remaining principal reaches zero. Returns the
    /// amount applied to the loan; anything beyond it stays with the
    /// payer.
    pub fn repay_fixed(
        &mut self,
        key: PositionKey,
        id: LoanId,
        net_received: u128,
    ) -> Result<u128> {
        if net_received == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let entry = self.fixed_loans.get(&id).ok_or(LedgerError::LoanNotFound)?;
        if entry.owner != key {
            return Err(LedgerError::WrongBorrower);
        }
        if entry.loan.closed {
            return Err(LedgerError::LoanClosed);
        }

        let mut loan = entry.loan;
        let applied = core::cmp::min(net_received, loan.principal_remaining);
        loan.principal_remaining -= applied;

        let new_tracked = checked_add(self.tracked_balance, applied)?;
        if loan.principal_remaining == 0 {
            loan.closed = true;
            self.registry.remove(key, id)?;
            if let Some(pos) = self.positions.get_mut(&key) {
                pos.fixed_open = pos.fixed_open.saturating_sub(1);
            }
        }
        self.fixed_loans.insert(id, FixedEntry { owner: key, loan });
        self.tracked_balance = new_tracked;
        Ok(applied)
    }

    /// Seize on an expired, unpaid fixed-term loan. Callable by anyone
    /// once past expiry; the `(position, loan)` pair must name a loan
    /// of that borrower.
    pub fn penalize_fixed(
        &mut self,
        key: PositionKey,
        id: LoanId,
        now: u64,
        gov: &GovParams,
    ) -> Result<DefaultOutcome> {
        let entry = self.fixed_loans.get(&id).ok_or(LedgerError::LoanNotFound)?;
        if entry.owner != key {
            return Err(LedgerError::WrongBorrower);
        }
        if entry.loan.closed {
            return Err(LedgerError::LoanClosed);
        }
        if now <= entry.loan.expiry {
            return Err(LedgerError::NotExpired);
        }
        let mut loan = entry.loan;

        let mut pos = self
            .positions
            .get(&key)
            .cloned()
            .ok_or(LedgerError::UnknownPosition)?;
        let decay = self.settle_staged(&mut pos)?;

        let obligation = Obligation::of_fixed(&loan);
        let outcome = self.compute_default(&pos, obligation, gov)?;

        loan.principal_remaining = 0;
        loan.closed = true;
        pos.fixed_open = pos.fixed_open.saturating_sub(1);

        self.registry.remove(key, id)?;
        self.fixed_loans.insert(id, FixedEntry { owner: key, loan });
        self.commit_default(key, pos, &outcome)?;
        self.total_deposits = checked_sub(self.total_deposits, decay)?;
        self.distribute_penalty(&outcome)?;
        Ok(outcome)
    }

    // ========================================================================
    // Shared default settlement
    // ========================================================================

    /// Gate a computed default against this pool: the position must
    /// cover the seizure and the pool must cover the immediate
    /// payouts. Fails without effect.
    fn compute_default(
        &self,
        pos: &Position,
        obligation: Obligation,
        gov: &GovParams,
    ) -> Result<DefaultOutcome> {
        let outcome = preview_default(obligation, gov)?;

        let committed = checked_add(pos.encumbrance(), outcome.total_seized)?;
        if pos.principal < committed {
            return Err(LedgerError::InsufficientPrincipal);
        }
        let outflow = checked_add(outcome.enforcer_share, outcome.treasury_share)?;
        if self.tracked_balance < outflow {
            return Err(LedgerError::InsufficientTrackedBalance);
        }
        Ok(outcome)
    }

    /// Apply the seizure: principal and the pool total shrink by the
    /// seized amount; the enforcer and treasury payouts leave the
    /// tracked balance.
    fn commit_default(
        &mut self,
        key: PositionKey,
        mut pos: Position,
        outcome: &DefaultOutcome,
    ) -> Result<()> {
        pos.principal = checked_sub(pos.principal, outcome.total_seized)?;
        self.total_deposits = checked_sub(self.total_deposits, outcome.total_seized)?;
        self.tracked_balance = checked_sub(
            self.tracked_balance,
            checked_add(outcome.enforcer_share, outcome.treasury_share)?,
        )?;
        self.positions.insert(key, pos);
        Ok(())
    }

    /// Route the retained penalty shares through their indices, against
    /// the post-seizure totals so remaining participants' share
    /// reflects the shrunk pool.
    fn distribute_penalty(&mut self, outcome: &DefaultOutcome) -> Result<()> {
        self.active_credit_index
            .accrue(self.rolling_principal_total, outcome.active_credit_share)?;
        self.fee_index
            .accrue(self.total_deposits, outcome.fee_index_share)?;
        Ok(())
    }
}
