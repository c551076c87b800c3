//! Pure state-transition functions for fixed-maturity pools.
//!
//! Nothing in here stores state, moves tokens or reads a clock: every
//! function takes the current reserves and `now` and returns either the
//! complete result of a transition or an [`EngineError`].

use crate::domain::Timestamp;

pub mod accounting;
pub mod borrow;
pub mod error;
pub mod fee;
pub mod invariant;
pub mod lend;
pub mod mint;

pub use accounting::{repay, Repayment};
pub use borrow::{
    borrow_given_collateral, borrow_given_debt, borrow_given_percent, BorrowOutcome,
    BorrowRequest,
};
pub use error::EngineError;
pub use fee::FeeQuote;
pub use lend::{lend_given_bond, lend_given_insurance, lend_given_percent, LendOutcome, LendRequest};
pub use mint::{add_liquidity, initialize, new_liquidity, MintOutcome};

/// `2^32`: a percent parameter of one.
pub const PERCENT_ONE: u64 = 1 << 32;
/// `2^31`: the percent at which the pinned leg switches.
pub const PERCENT_HALF: u64 = 1 << 31;

/// Seconds left until `maturity`.
pub fn duration(maturity: Timestamp, now: Timestamp) -> Result<u64, EngineError> {
    if now >= maturity {
        return Err(EngineError::MaturityElapsed);
    }
    Ok(maturity.as_secs() - now.as_secs())
}
