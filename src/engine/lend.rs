//! Lend transitions: asset enters the pool, rate and collateral shrink.

use crate::domain::{FeeConfig, PoolState, Timestamp};
use crate::math::{div_up, mul_div_down, mul_div_up, sqrt_up, to_u128, MathError, U256};

use super::accounting;
use super::fee::{quote_lend, x_increase};
use super::invariant::{check_lend, raised_reserve, solve_lend, Leg};
use super::{duration, EngineError, PERCENT_HALF, PERCENT_ONE};

/// How the lender pins the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LendRequest {
    /// Lend `asset_in`, expecting `bond_out` back at maturity.
    GivenBond { asset_in: u128, bond_out: u128 },
    /// Lend `asset_in`, expecting `insurance_out` collateral cover.
    GivenInsurance {
        asset_in: u128,
        insurance_out: u128,
    },
    /// Lend `asset_in`, splitting the return between bond and insurance.
    /// `0` is all insurance, `2^32` all bond.
    GivenPercent { asset_in: u128, percent: u64 },
}

impl LendRequest {
    pub fn asset_in(&self) -> u128 {
        match *self {
            LendRequest::GivenBond { asset_in, .. }
            | LendRequest::GivenInsurance { asset_in, .. }
            | LendRequest::GivenPercent { asset_in, .. } => asset_in,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendDeltas {
    pub x_increase: u128,
    pub y_decrease: u128,
    pub z_decrease: u128,
}

/// An accepted lend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendOutcome {
    pub x_increase: u128,
    pub y_decrease: u128,
    pub z_decrease: u128,
    pub bond: u128,
    pub insurance: u128,
    /// Part of `asset_in` above `x_increase` kept by the pool.
    pub pool_fee: u128,
    pub protocol_fee: u128,
}

impl LendOutcome {
    /// Reserves after this lend.
    pub fn apply(&self, state: &PoolState) -> Result<PoolState, EngineError> {
        Ok(PoolState {
            x: state
                .x
                .checked_add(self.x_increase)
                .ok_or(MathError::Overflow)?,
            y: state
                .y
                .checked_sub(self.y_decrease)
                .ok_or(MathError::Underflow)?,
            z: state
                .z
                .checked_sub(self.z_decrease)
                .ok_or(MathError::Underflow)?,
        })
    }
}

/// Compute the deltas a request implies without running the acceptance
/// checks.
pub fn solve(
    state: &PoolState,
    fees: &FeeConfig,
    request: LendRequest,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<LendDeltas, EngineError> {
    let duration = duration(maturity, now)?;
    if state.has_empty_reserve() {
        return Err(EngineError::EmptyReserve);
    }
    let asset_in = request.asset_in();
    if asset_in == 0 {
        return Err(EngineError::ZeroAmount);
    }

    let dx = x_increase(asset_in, fees, duration)?;
    let new_x = raised_reserve(state, dx)?;

    let pinned = match request {
        LendRequest::GivenBond { bond_out, .. } => {
            let interest = bond_out.checked_sub(dx).ok_or(MathError::Underflow)?;
            Leg::Rate(to_u128(div_up(
                U256::from(interest) << 32usize,
                U256::from(duration),
            )?)?)
        }
        LendRequest::GivenInsurance { insurance_out, .. } => {
            let base = to_u128(mul_div_down(
                U256::from(state.z),
                U256::from(dx),
                U256::from(new_x),
            )?)?;
            let extra = insurance_out
                .checked_sub(base)
                .ok_or(MathError::Underflow)?;
            Leg::Collateral(to_u128(div_up(
                U256::from(extra) << 25usize,
                U256::from(duration),
            )?)?)
        }
        LendRequest::GivenPercent { percent, .. } => {
            if percent > PERCENT_ONE {
                return Err(EngineError::PercentOutOfRange);
            }
            if percent <= PERCENT_HALF {
                let mid = midpoint_decrease(state.y, state.x, new_x)?;
                Leg::Rate(to_u128(mul_div_down(
                    mid,
                    U256::from(percent),
                    U256::from(PERCENT_HALF),
                )?)?)
            } else {
                let mid = midpoint_decrease(state.z, state.x, new_x)?;
                Leg::Collateral(to_u128(mul_div_down(
                    mid,
                    U256::from(PERCENT_ONE - percent),
                    U256::from(PERCENT_HALF),
                )?)?)
            }
        }
    };

    let legs = solve_lend(state, dx, pinned)?;
    Ok(LendDeltas {
        x_increase: dx,
        y_decrease: legs.dy,
        z_decrease: legs.dz,
    })
}

/// `r - sqrt_up(ceil(r^2 * x / x'))`: the decrease of `r` that alone would
/// restore the product when `x` grows to `x'`.
fn midpoint_decrease(reserve: u128, x: u128, new_x: u128) -> Result<U256, EngineError> {
    let r = U256::from(reserve);
    let squared_scaled = mul_div_up(r * r, U256::from(x), U256::from(new_x))?;
    Ok(r.checked_sub(sqrt_up(squared_scaled))
        .ok_or(MathError::Underflow)?)
}

/// Solve, accept and account a lend.
pub fn lend(
    state: &PoolState,
    fees: &FeeConfig,
    request: LendRequest,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<LendOutcome, EngineError> {
    let deltas = solve(state, fees, request, maturity, now)?;
    check_lend(state, deltas.x_increase, deltas.y_decrease, deltas.z_decrease)?;

    let duration = duration(maturity, now)?;
    let quote = quote_lend(request.asset_in(), fees, duration)?;
    let bond = accounting::bond(deltas.x_increase, deltas.y_decrease, duration)?;
    let insurance =
        accounting::insurance(state, deltas.x_increase, deltas.z_decrease, duration)?;

    Ok(LendOutcome {
        x_increase: deltas.x_increase,
        y_decrease: deltas.y_decrease,
        z_decrease: deltas.z_decrease,
        bond,
        insurance,
        pool_fee: quote.pool_fee,
        protocol_fee: quote.protocol_fee,
    })
}

pub fn lend_given_bond(
    state: &PoolState,
    fees: &FeeConfig,
    asset_in: u128,
    bond_out: u128,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<LendOutcome, EngineError> {
    lend(
        state,
        fees,
        LendRequest::GivenBond { asset_in, bond_out },
        maturity,
        now,
    )
}

pub fn lend_given_insurance(
    state: &PoolState,
    fees: &FeeConfig,
    asset_in: u128,
    insurance_out: u128,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<LendOutcome, EngineError> {
    lend(
        state,
        fees,
        LendRequest::GivenInsurance {
            asset_in,
            insurance_out,
        },
        maturity,
        now,
    )
}

pub fn lend_given_percent(
    state: &PoolState,
    fees: &FeeConfig,
    asset_in: u128,
    percent: u64,
    maturity: Timestamp,
    now: Timestamp,
) -> Result<LendOutcome, EngineError> {
    lend(
        state,
        fees,
        LendRequest::GivenPercent { asset_in, percent },
        maturity,
        now,
    )
}
