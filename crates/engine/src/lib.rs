//! Accounting core for a multi-pool lending protocol.
//!
//! This crate implements the ledger that backs deposits, proportional
//! yield distribution, maintenance decay, and the rolling-credit /
//! fixed-term loan lifecycles, including default seizure and penalty
//! settlement. It guarantees:
//!
//! 1. Exact accounting - every distributed unit is either credited to a
//!    position or carried in an explicit sub-unit remainder; no value is
//!    lost to rounding beyond one unit per pool per accrual event.
//! 2. Atomicity - every operation either completes or leaves the ledger
//!    untouched (the single documented exception is the capped
//!    maintenance payout, which carries its shortfall forward).
//! 3. Solvency - no operation may leave a position's principal below
//!    its encumbrance plus the seizure exposure of its open loans.
//! 4. Isolation - pools never read or debit each other's balances, even
//!    when they share an underlying asset.
//!
//! Identity resolution, token transfers, and governance validation are
//! external collaborators: callers pass opaque position keys and the
//! *net* amounts actually received, never requested amounts.

#![cfg_attr(not(test), no_std)]
#![forbid(unsafe_code)]

#[cfg(kani)]
extern crate kani;

extern crate alloc;

pub mod config;
pub mod error;
pub mod index;
pub mod math;
pub mod pool;
pub mod position;
pub mod registry;

#[cfg(test)]
mod negative_tests;

pub use config::{GovParams, PoolConfig, TermOffer, EPOCH_SECS, PENALTY_RATE_BPS};
pub use error::{LedgerError, Result};
pub use index::{AccrualIndex, SCALE};
pub use pool::{preview_default, DefaultOutcome, FeeSource, MaintenanceOutcome, Pool, RollingStatus};
pub use position::{FixedTermLoan, LoanId, Obligation, Position, PositionKey, RollingCreditLoan};
pub use registry::LoanRegistry;
