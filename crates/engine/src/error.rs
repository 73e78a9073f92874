//! Ledger error taxonomy.
//!
//! Four classes, mirrored by the variants below: validation errors
//! (rejected before any state write), solvency errors, state-machine
//! errors (wrong loan state or ownership), and resource shortfalls.
//! Apart from the capped maintenance payout, an error always means the
//! operation had no observable effect.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerError {
    // --- Validation ---
    /// Amount is zero.
    ZeroAmount,

    /// Amount is below the pool's configured minimum.
    BelowMinimum,

    /// Arithmetic overflow.
    Overflow,

    /// Fixed-term menu index out of range.
    InvalidTermIndex,

    /// Rolling-credit payment below the minimum-payment floor.
    PaymentTooSmall,

    /// Requested APY exceeds the pool's rate cap.
    RateAboveCap,

    // --- Solvency ---
    /// Operation would leave the position under-collateralized.
    InsufficientSolvency,

    /// Position principal cannot cover the seizure plus encumbrance.
    InsufficientPrincipal,

    // --- State machine ---
    /// Position has no record in this pool.
    UnknownPosition,

    /// A rolling credit line is already open.
    RollingAlreadyActive,

    /// No active rolling credit line.
    RollingNotActive,

    /// Fixed-term loan is already closed.
    LoanClosed,

    /// No such loan for this position.
    LoanNotFound,

    /// Loan id already registered for this position.
    LoanAlreadyExists,

    /// Rolling loan has not missed enough payments to be penalized.
    NotYetPenalizable,

    /// Fixed-term loan has not reached expiry.
    NotExpired,

    /// The (position, loan) pair does not name a loan of that borrower.
    WrongBorrower,

    /// Membership cannot be cleared; the reason names the blocking
    /// obligation.
    MembershipBlocked(&'static str),

    // --- Resource shortfall ---
    /// Tracked token balance cannot cover the transfer-bearing step.
    InsufficientTrackedBalance,
}

pub type Result<T> = core::result::Result<T, LedgerError>;
