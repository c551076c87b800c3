//! Liquidity provision: pool creation and proportional deposits.

use crate::domain::{PoolState, Timestamp};
use crate::math::{mul_div_down, to_u128, MathError, U256};

use super::accounting;
use super::{duration, EngineError};

/// Reserve growth and obligations of a liquidity deposit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MintOutcome {
    pub x_increase: u128,
    pub y_increase: u128,
    pub z_increase: u128,
    pub liquidity_out: u128,
    /// Asset the provider owes at maturity.
    pub debt: u128,
    /// Collateral the provider locks.
    pub collateral: u128,
}

impl MintOutcome {
    /// Reserves after this deposit.
    pub fn apply(&self, state: &PoolState) -> Result<PoolState, EngineError> {
        Ok(PoolState {
            x: state
                .x
                .checked_add(self.x_increase)
                .ok_or(MathError::Overflow)?,
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

/// Opening reserves of a new pool.
///
/// `x = asset_in`, `y = ((debt_in - asset_in) << 32) / d` and
/// `z = (collateral_in << 25) / (d + 2^25)`.
pub fn initialize(
    asset_in: u128,
    debt_in: u128,
    collateral_in: u128,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<PoolState, EngineError> {
    let duration = duration(maturity, now)?;
    if asset_in == 0 {
        return Err(EngineError::ZeroAmount);
    }

    let interest = debt_in.checked_sub(asset_in).ok_or(MathError::Underflow)?;
    let y = to_u128((U256::from(interest) << 32usize) / U256::from(duration))?;
    let z = to_u128(
        (U256::from(collateral_in) << 25usize)
            / (U256::from(duration) + (U256::one() << 25usize)),
    )?;

    let state = PoolState::new(asset_in, y, z);
    if state.has_empty_reserve() {
        return Err(EngineError::EmptyReserve);
    }
    Ok(state)
}

/// First deposit into a pool: opening reserves, liquidity minted and the
/// provider's obligation.
pub fn new_liquidity(
    asset_in: u128,
    debt_in: u128,
    collateral_in: u128,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<MintOutcome, EngineError> {
    let state = initialize(asset_in, debt_in, collateral_in, maturity, now)?;
    let duration = duration(maturity, now)?;

    Ok(MintOutcome {
        x_increase: state.x,
        y_increase: state.y,
        z_increase: state.z,
        liquidity_out: to_u128(U256::from(asset_in) << 16usize)?,
        debt: accounting::debt(state.x, state.y, duration)?,
        collateral: accounting::liquidity_collateral(state.z, duration)?,
    })
}

/// Deposit `asset_in` into an existing pool, growing every reserve in
/// proportion.
pub fn add_liquidity(
    state: &PoolState,
    total_liquidity: u128,
    asset_in: u128,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<MintOutcome, EngineError> {
    let duration = duration(maturity, now)?;
    if state.has_empty_reserve() {
        return Err(EngineError::EmptyReserve);
    }

    let proportional = |reserve: u128| -> Result<u128, EngineError> {
        Ok(to_u128(mul_div_down(
            U256::from(reserve),
            U256::from(asset_in),
            U256::from(state.x),
        )?)?)
    };

    let y_increase = proportional(state.y)?;
    let z_increase = proportional(state.z)?;
    let liquidity_out = proportional(total_liquidity)?;
    if liquidity_out == 0 {
        return Err(EngineError::ZeroAmount);
    }

    Ok(MintOutcome {
        x_increase: asset_in,
        y_increase,
        z_increase,
        liquidity_out,
        debt: accounting::debt(asset_in, y_increase, duration)?,
        collateral: accounting::liquidity_collateral(z_increase, duration)?,
    })
}
