use thiserror::Error;

use crate::math::MathError;

/// Rejection reasons for a pool state transition.
///
/// Every engine function either returns a complete result or one of these;
/// no partially computed deltas ever escape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Math(#[from] MathError),
    #[error("constant product invariant violated")]
    InvariantViolation,
    #[error("interest rate below pool minimum")]
    RateBelowMinimum,
    #[error("pool maturity has elapsed")]
    MaturityElapsed,
    #[error("repay amount exceeds outstanding debt")]
    RepayExceedsDebt,
    #[error("unknown position")]
    UnknownPosition,
    #[error("percent must be within [0, 2^32]")]
    PercentOutOfRange,
    #[error("amount must be non-zero")]
    ZeroAmount,
    #[error("pool reserve is empty")]
    EmptyReserve,
}

impl EngineError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Math(MathError::Overflow) => "overflow",
            EngineError::Math(MathError::Underflow) => "underflow",
            EngineError::Math(MathError::DivisionByZero) => "division_by_zero",
            EngineError::InvariantViolation => "invariant_violation",
            EngineError::RateBelowMinimum => "rate_below_minimum",
            EngineError::MaturityElapsed => "maturity_elapsed",
            EngineError::RepayExceedsDebt => "repay_exceeds_debt",
            EngineError::UnknownPosition => "unknown_position",
            EngineError::PercentOutOfRange => "percent_out_of_range",
            EngineError::ZeroAmount => "zero_amount",
            EngineError::EmptyReserve => "empty_reserve",
        }
    }
}
