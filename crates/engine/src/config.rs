//! Pool configuration and call-time governance parameters.

use arrayvec::ArrayVec;

use crate::position::PositionKey;

/// Maintenance epoch length: one day. Fractional epochs accrue nothing
/// until a full epoch has elapsed.
pub const EPOCH_SECS: u64 = 86_400;

/// Fixed default penalty rate: 5% of the penalty base.
pub const PENALTY_RATE_BPS: u64 = 500;

/// Share of an applied penalty paid to whoever triggers the default.
pub const ENFORCER_SHARE_DIV: u128 = 10;

/// Fallback annual maintenance rate when neither the pool nor the
/// governance default sets one: 1%.
pub const FALLBACK_MAINTENANCE_RATE_BPS: u64 = 100;

/// One entry of a pool's fixed-term menu.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TermOffer {
    pub duration_secs: u64,
    pub apy_bps: u64,
}

/// Immutable per-pool configuration, validated by governance before a
/// pool is created and never changed afterwards.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Minimum accepted deposit (net amount).
    pub min_deposit: u128,

    /// Minimum principal for any loan.
    pub min_loan_amount: u128,

    /// Debt ceiling as a fraction of principal, in basis points.
    pub loan_to_value_bps: u64,

    /// Annual maintenance rate in basis points; 0 defers to the
    /// governance default.
    pub maintenance_rate_bps: u64,

    /// Cap on rolling-credit APY requests.
    pub max_rolling_apy_bps: u64,

    /// Fixed-term menu: (duration, rate) pairs borrowers pick from.
    pub term_menu: ArrayVec<TermOffer, 8>,
}

impl PoolConfig {
    /// A permissive configuration for tests and simulations.
    pub fn relaxed() -> Self {
        let mut term_menu = ArrayVec::new();
        term_menu.push(TermOffer { duration_secs: 30 * EPOCH_SECS, apy_bps: 800 });
        term_menu.push(TermOffer { duration_secs: 90 * EPOCH_SECS, apy_bps: 1_100 });
        Self {
            min_deposit: 1,
            min_loan_amount: 1,
            loan_to_value_bps: 8_000,
            maintenance_rate_bps: 0,
            max_rolling_apy_bps: 5_000,
            term_menu,
        }
    }
}

/// Governance values read at call time. These are mutable protocol-wide
/// settings owned by a governance collaborator; the ledger only ever
/// reads the snapshot it is handed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GovParams {
    /// Treasury receiver; `None` folds the treasury cut back into the
    /// depositor share on defaults.
    pub treasury: Option<PositionKey>,

    /// Treasury share of penalty proceeds, in basis points of the
    /// post-enforcer remainder.
    pub treasury_bps: u64,

    /// Active-credit share of penalty proceeds, in basis points of the
    /// remainder after enforcer and treasury cuts.
    pub active_credit_bps: u64,

    /// Foundation receiver for maintenance payouts; `None` withholds
    /// payment (fees still accrue).
    pub foundation: Option<PositionKey>,

    /// Annual maintenance rate used when the pool sets none.
    pub default_maintenance_rate_bps: u64,

    /// Minimum rolling payment as basis points of remaining principal.
    pub min_payment_bps: u64,

    /// Missed epochs before a rolling line is considered delinquent.
    pub delinquency_epochs: u64,

    /// Missed epochs before a rolling line may be penalized. Always
    /// >= `delinquency_epochs` in any sane configuration; the ledger
    /// does not enforce an ordering between the two.
    pub penalty_epochs: u64,
}

impl GovParams {
    pub fn relaxed() -> Self {
        Self {
            treasury: None,
            treasury_bps: 1_000,
            active_credit_bps: 2_500,
            foundation: None,
            default_maintenance_rate_bps: 100,
            min_payment_bps: 100,
            delinquency_epochs: 1,
            penalty_epochs: 3,
        }
    }
}
