//! Constant product acceptance checks and the leg solver.
//!
//! Reserves are compared as `x * (y << 16) * (z << 16)`; the `<< 16` gives
//! the trading fee (expressed out of `0x10000`) room to act on the rate and
//! collateral legs without losing precision.

use crate::domain::PoolState;
use crate::math::{div_up_wide, mul_wide, wide_to_u128, MathError, U256, U512};

use super::EngineError;

/// Trading fee charged on the rate and collateral legs, out of `0x10000`.
pub const TRADING_FEE: u128 = 100;

const FEE_UNIT: u128 = 0x10000;
/// Multiplier applied to legs moving into the pool.
const FEE_IN: u128 = FEE_UNIT - TRADING_FEE;
/// Multiplier applied to legs moving out of the pool, also the rate floor base.
const FEE_OUT: u128 = FEE_UNIT + TRADING_FEE;

/// The leg a parameterization fixes; the solver derives the other one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    Rate(u128),
    Collateral(u128),
}

/// Rate and collateral deltas of a trade, before accounting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Legs {
    pub dy: u128,
    pub dz: u128,
}

fn scaled(reserve: u128) -> U256 {
    U256::from(reserve) << 16usize
}

fn product(state: &PoolState) -> Result<U512, EngineError> {
    let xy = U512::from(U256::from(state.x)) * U512::from(scaled(state.y));
    Ok(mul_wide(xy, U512::from(scaled(state.z)))?)
}

/// `x - dx`; a borrow may never take the whole asset reserve.
pub(crate) fn reduced_reserve(state: &PoolState, dx: u128) -> Result<u128, EngineError> {
    if dx >= state.x {
        return Err(EngineError::InvariantViolation);
    }
    Ok(state.x - dx)
}

/// `x + dx`.
pub(crate) fn raised_reserve(state: &PoolState, dx: u128) -> Result<u128, EngineError> {
    state
        .x
        .checked_add(dx)
        .ok_or(EngineError::Math(MathError::Overflow))
}

fn borrow_adjusted(reserve: u128, delta: u128) -> U256 {
    scaled(reserve) + U256::from(FEE_IN) * U256::from(delta)
}

fn lend_adjusted(reserve: u128, delta: u128) -> Result<U256, EngineError> {
    let decrease = U256::from(FEE_OUT) * U256::from(delta);
    let base = scaled(reserve);
    if decrease > base {
        return Err(EngineError::InvariantViolation);
    }
    Ok(base - decrease)
}

fn dominates(
    state: &PoolState,
    new_x: u128,
    y_adjusted: U256,
    z_adjusted: U256,
) -> Result<bool, EngineError> {
    let xy = U512::from(U256::from(new_x)) * U512::from(y_adjusted);
    let after = mul_wide(xy, U512::from(z_adjusted))?;
    Ok(after >= product(state)?)
}

/// `((dx * y) << 12) / (x' * FEE_OUT)` in 512 bits.
fn rate_floor_parts(state: &PoolState, dx: u128, new_x: u128) -> (U512, U512) {
    let numerator = U512::from(U256::from(dx) * U256::from(state.y)) << 12usize;
    let denominator = U512::from(U256::from(new_x)) * U512::from(FEE_OUT);
    (numerator, denominator)
}

/// Smallest rate increase a borrow of `dx` must pay.
pub fn min_borrow_rate(state: &PoolState, dx: u128) -> Result<u128, EngineError> {
    let new_x = reduced_reserve(state, dx)?;
    let (numerator, denominator) = rate_floor_parts(state, dx, new_x);
    Ok(wide_to_u128(div_up_wide(numerator, denominator)?)?)
}

/// Smallest rate decrease a lend of `dx` must take.
pub fn min_lend_rate(state: &PoolState, dx: u128) -> Result<u128, EngineError> {
    let new_x = raised_reserve(state, dx)?;
    let (numerator, denominator) = rate_floor_parts(state, dx, new_x);
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero.into());
    }
    Ok(wide_to_u128(numerator / denominator)?)
}

/// Accept or reject a borrow moving `x` down by `dx` and `y`, `z` up by
/// `dy`, `dz`.
pub fn check_borrow(state: &PoolState, dx: u128, dy: u128, dz: u128) -> Result<(), EngineError> {
    let new_x = reduced_reserve(state, dx)?;
    if !dominates(
        state,
        new_x,
        borrow_adjusted(state.y, dy),
        borrow_adjusted(state.z, dz),
    )? {
        return Err(EngineError::InvariantViolation);
    }
    if dy < min_borrow_rate(state, dx)? {
        return Err(EngineError::RateBelowMinimum);
    }
    Ok(())
}

/// Accept or reject a lend moving `x` up by `dx` and `y`, `z` down by
/// `dy`, `dz`.
pub fn check_lend(state: &PoolState, dx: u128, dy: u128, dz: u128) -> Result<(), EngineError> {
    let new_x = raised_reserve(state, dx)?;
    let y_adjusted = lend_adjusted(state.y, dy)?;
    let z_adjusted = lend_adjusted(state.z, dz)?;
    if !dominates(state, new_x, y_adjusted, z_adjusted)? {
        return Err(EngineError::InvariantViolation);
    }
    if dy < min_lend_rate(state, dx)? {
        return Err(EngineError::RateBelowMinimum);
    }
    Ok(())
}

/// Smallest adjusted value the free leg needs for the product to hold.
fn required_adjusted(
    state: &PoolState,
    new_x: u128,
    pinned_adjusted: U256,
) -> Result<U512, EngineError> {
    let denominator = U512::from(U256::from(new_x)) * U512::from(pinned_adjusted);
    if denominator.is_zero() {
        return Err(EngineError::InvariantViolation);
    }
    Ok(div_up_wide(product(state)?, denominator)?)
}

fn smallest_increase(
    state: &PoolState,
    new_x: u128,
    pinned_adjusted: U256,
    free_reserve: u128,
) -> Result<u128, EngineError> {
    let required = required_adjusted(state, new_x, pinned_adjusted)?;
    let base = U512::from(scaled(free_reserve));
    if required <= base {
        return Ok(0);
    }
    Ok(wide_to_u128(div_up_wide(required - base, U512::from(FEE_IN))?)?)
}

fn largest_decrease(
    state: &PoolState,
    new_x: u128,
    pinned_adjusted: U256,
    free_reserve: u128,
) -> Result<u128, EngineError> {
    let required = required_adjusted(state, new_x, pinned_adjusted)?;
    let base = U512::from(scaled(free_reserve));
    if required > base {
        return Err(MathError::Underflow.into());
    }
    Ok(wide_to_u128((base - required) / U512::from(FEE_OUT))?)
}

/// Derive the free leg of a borrow.
///
/// A pinned rate gets the smallest collateral increase that satisfies the
/// product. A pinned collateral gets the smallest rate increase that
/// satisfies the product, raised to the minimum rate if below it.
pub fn solve_borrow(state: &PoolState, dx: u128, pinned: Leg) -> Result<Legs, EngineError> {
    let new_x = reduced_reserve(state, dx)?;

    match pinned {
        Leg::Rate(dy) => {
            let dz = smallest_increase(state, new_x, borrow_adjusted(state.y, dy), state.z)?;
            Ok(Legs { dy, dz })
        }
        Leg::Collateral(dz) => {
            let dy = smallest_increase(state, new_x, borrow_adjusted(state.z, dz), state.y)?;
            let dy = dy.max(min_borrow_rate(state, dx)?);
            Ok(Legs { dy, dz })
        }
    }
}

/// Derive the free leg of a lend: the largest decrease the product allows.
pub fn solve_lend(state: &PoolState, dx: u128, pinned: Leg) -> Result<Legs, EngineError> {
    let new_x = raised_reserve(state, dx)?;

    match pinned {
        Leg::Rate(dy) => {
            let dz = largest_decrease(state, new_x, lend_adjusted(state.y, dy)?, state.z)?;
            Ok(Legs { dy, dz })
        }
        Leg::Collateral(dz) => {
            let dy = largest_decrease(state, new_x, lend_adjusted(state.z, dz)?, state.y)?;
            Ok(Legs { dy, dz })
        }
    }
}
