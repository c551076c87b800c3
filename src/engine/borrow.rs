//! Borrow transitions: asset leaves the pool, rate and collateral grow.

use crate::domain::{FeeConfig, PoolState, Timestamp};
use crate::math::{div_up, mul_div_up, sqrt_up, to_u128, MathError, U256};

use super::accounting;
use super::fee::{quote_borrow, x_decrease};
use super::invariant::{check_borrow, reduced_reserve, solve_borrow, Leg};
use super::{duration, EngineError, PERCENT_HALF, PERCENT_ONE};

/// How the borrower pins the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BorrowRequest {
    /// Borrow `asset_out`, owing at most `debt_in`.
    GivenDebt { asset_out: u128, debt_in: u128 },
    /// Borrow `asset_out`, locking at most `collateral_in`.
    GivenCollateral {
        asset_out: u128,
        collateral_in: u128,
    },
    /// Borrow `asset_out`, splitting the price between rate and collateral.
    /// `0` is all collateral, `2^32` all rate.
    GivenPercent { asset_out: u128, percent: u64 },
}

impl BorrowRequest {
    pub fn asset_out(&self) -> u128 {
        match *self {
            BorrowRequest::GivenDebt { asset_out, .. }
            | BorrowRequest::GivenCollateral { asset_out, .. }
            | BorrowRequest::GivenPercent { asset_out, .. } => asset_out,
        }
    }
}

/// Reserve deltas of a borrow, before acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowDeltas {
    pub x_decrease: u128,
    pub y_increase: u128,
    pub z_increase: u128,
}

/// An accepted borrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BorrowOutcome {
    pub x_decrease: u128,
    pub y_increase: u128,
    pub z_increase: u128,
    pub debt: u128,
    pub collateral: u128,
    /// Part of `x_decrease` above `asset_out` kept by the pool.
    pub pool_fee: u128,
    pub protocol_fee: u128,
}

impl BorrowOutcome {
    /// Reserves after this borrow.
    pub fn apply(&self, state: &PoolState) -> Result<PoolState, EngineError> {
        Ok(PoolState {
            x: state
                .x
                .checked_sub(self.x_decrease)
                .ok_or(MathError::Underflow)?,
            y: state
                .y
                .checked_add(self.y_increase)
                .ok_or(MathError::Overflow)?,
            z: state
                .z
                .checked_add(self.z_increase)
                .ok_or(MathError::Overflow)?,
        })
    }
}

/// Compute the deltas a request implies without running the acceptance
/// checks.
pub fn solve(
    state: &PoolState,
    fees: &FeeConfig,
    request: BorrowRequest,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<BorrowDeltas, EngineError> {
    let duration = duration(maturity, now)?;
    if state.has_empty_reserve() {
        return Err(EngineError::EmptyReserve);
    }
    let asset_out = request.asset_out();
    if asset_out == 0 {
        return Err(EngineError::ZeroAmount);
    }

    let dx = x_decrease(asset_out, fees, duration)?;
    let new_x = reduced_reserve(state, dx)?;

    let pinned = match request {
        BorrowRequest::GivenDebt { debt_in, .. } => {
            let interest = debt_in.checked_sub(dx).ok_or(MathError::Underflow)?;
            Leg::Rate(to_u128(
                (U256::from(interest) << 32usize) / U256::from(duration),
            )?)
        }
        BorrowRequest::GivenCollateral { collateral_in, .. } => {
            let base = to_u128(div_up(
                U256::from(state.z) * U256::from(dx),
                U256::from(new_x),
            )?)?;
            let extra = collateral_in
                .checked_sub(base)
                .ok_or(MathError::Underflow)?;
            Leg::Collateral(to_u128(
                (U256::from(extra) << 25usize) / U256::from(duration),
            )?)
        }
        BorrowRequest::GivenPercent { percent, .. } => {
            if percent > PERCENT_ONE {
                return Err(EngineError::PercentOutOfRange);
            }
            if percent <= PERCENT_HALF {
                let mid = midpoint_increase(state.y, state.x, new_x)?;
                Leg::Rate(to_u128(mul_div_up(
                    mid,
                    U256::from(percent),
                    U256::from(PERCENT_HALF),
                )?)?)
            } else {
                let mid = midpoint_increase(state.z, state.x, new_x)?;
                Leg::Collateral(to_u128(mul_div_up(
                    mid,
                    U256::from(PERCENT_ONE - percent),
                    U256::from(PERCENT_HALF),
                )?)?)
            }
        }
    };

    let legs = solve_borrow(state, dx, pinned)?;
    Ok(BorrowDeltas {
        x_decrease: dx,
        y_increase: legs.dy,
        z_increase: legs.dz,
    })
}

/// `sqrt_up(ceil(r^2 * x / x')) - r`: the increase of `r` that alone would
/// restore the product when `x` drops to `x'`.
fn midpoint_increase(reserve: u128, x: u128, new_x: u128) -> Result<U256, EngineError> {
    let r = U256::from(reserve);
    let squared_scaled = mul_div_up(r * r, U256::from(x), U256::from(new_x))?;
    Ok(sqrt_up(squared_scaled)
        .checked_sub(r)
        .ok_or(MathError::Underflow)?)
}

/// Solve, accept and account a borrow.
pub fn borrow(
    state: &PoolState,
    fees: &FeeConfig,
    request: BorrowRequest,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<BorrowOutcome, EngineError> {
    let deltas = solve(state, fees, request, maturity, now)?;
    check_borrow(state, deltas.x_decrease, deltas.y_increase, deltas.z_increase)?;

    let duration = duration(maturity, now)?;
    let quote = quote_borrow(request.asset_out(), fees, duration)?;
    let debt = accounting::debt(deltas.x_decrease, deltas.y_increase, duration)?;
    let collateral = accounting::collateral(
        state,
        deltas.x_decrease,
        deltas.z_increase,
        duration,
    )?;

    Ok(BorrowOutcome {
        x_decrease: deltas.x_decrease,
        y_increase: deltas.y_increase,
        z_increase: deltas.z_increase,
        debt,
        collateral,
        pool_fee: quote.pool_fee,
        protocol_fee: quote.protocol_fee,
    })
}

pub fn borrow_given_debt(
    state: &PoolState,
    fees: &FeeConfig,
    asset_out: u128,
    debt_in: u128,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<BorrowOutcome, EngineError> {
    borrow(
        state,
        fees,
        BorrowRequest::GivenDebt { asset_out, debt_in },
        maturity,
        now,
    )
}

pub fn borrow_given_collateral(
    state: &PoolState,
    fees: &FeeConfig,
    asset_out: u128,
    collateral_in: u128,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<BorrowOutcome, EngineError> {
    borrow(
        state,
        fees,
        BorrowRequest::GivenCollateral {
            asset_out,
            collateral_in,
        },
        maturity,
        now,
    )
}

pub fn borrow_given_percent(
    state: &PoolState,
    fees: &FeeConfig,
    asset_out: u128,
    percent: u64,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<BorrowOutcome, EngineError> {
    borrow(
        state,
        fees,
        BorrowRequest::GivenPercent { asset_out, percent },
        maturity,
        now,
    )
}
