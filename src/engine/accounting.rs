//! Debt, collateral, bond and insurance amounts for accepted deltas.
//!
//! Borrower-side amounts round up, lender-side amounts round down.

use crate::domain::PoolState;
use crate::math::{div_up, mul_div_down, shift_right_up, to_u128, MathError, U256};

use super::EngineError;

fn sum(a: U256, b: u128) -> Result<u128, EngineError> {
    Ok(to_u128(a)?
        .checked_add(b)
        .ok_or(MathError::Overflow)?)
}

/// Asset owed at maturity by a borrower: `ceil(dy * d / 2^32) + dx`.
pub fn debt(dx: u128, dy: u128, duration: u64) -> Result<u128, EngineError> {
    let interest = shift_right_up(U256::from(dy) * U256::from(duration), 32);
    sum(interest, dx)
}

/// Collateral locked by a borrower:
/// `ceil(dz * d / 2^25) + ceil(z * dx / (x - dx))`.
pub fn collateral(
    state: &PoolState,
    dx: u128,
    dz: u128,
    duration: u64,
) -> Result<u128, EngineError> {
    let remaining = state.x.checked_sub(dx).ok_or(MathError::Underflow)?;
    let premium = shift_right_up(U256::from(dz) * U256::from(duration), 25);
    let base = to_u128(div_up(
        U256::from(state.z) * U256::from(dx),
        U256::from(remaining),
    )?)?;
    sum(premium, base)
}

/// Asset owed to a lender at maturity: `floor(dy * d / 2^32) + dx`.
pub fn bond(dx: u128, dy: u128, duration: u64) -> Result<u128, EngineError> {
    let interest = (U256::from(dy) * U256::from(duration)) >> 32usize;
    sum(interest, dx)
}

/// Collateral cover owed to a lender:
/// `floor(dz * d / 2^25) + floor(z * dx / (x + dx))`.
pub fn insurance(
    state: &PoolState,
    dx: u128,
    dz: u128,
    duration: u64,
) -> Result<u128, EngineError> {
    let grown = state.x.checked_add(dx).ok_or(MathError::Overflow)?;
    let premium = (U256::from(dz) * U256::from(duration)) >> 25usize;
    let base = to_u128(mul_div_down(
        U256::from(state.z),
        U256::from(dx),
        U256::from(grown),
    )?)?;
    sum(premium, base)
}

/// Collateral a liquidity provider locks: `dz + ceil(dz * d / 2^25)`.
pub fn liquidity_collateral(dz: u128, duration: u64) -> Result<u128, EngineError> {
    let premium = shift_right_up(U256::from(dz) * U256::from(duration), 25);
    sum(premium, dz)
}

/// Result of repaying part or all of a debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repayment {
    pub remaining_debt: u128,
    pub remaining_collateral: u128,
    pub released_collateral: u128,
}

impl Repayment {
    pub fn is_settled(&self) -> bool {
        self.remaining_debt == 0
    }
}

/// Repay `amount` against `(debt, collateral)`.
///
/// A partial repay releases collateral pro rata, rounded down; repaying the
/// whole debt releases everything that remains.
pub fn repay(debt: u128, collateral: u128, amount: u128) -> Result<Repayment, EngineError> {
    if amount == 0 {
        return Err(EngineError::ZeroAmount);
    }
    if amount > debt {
        return Err(EngineError::RepayExceedsDebt);
    }

    let released = if amount == debt {
        collateral
    } else {
        to_u128(mul_div_down(
            U256::from(collateral),
            U256::from(amount),
            U256::from(debt),
        )?)?
    };

    Ok(Repayment {
        remaining_debt: debt - amount,
        remaining_collateral: collateral - released,
        released_collateral: released,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DURATION: u64 = 31_526_000;

    #[test]
    fn borrower_amounts_round_up() {
        let state = PoolState::new(10_000, 272_428, 515);
        assert_eq!(debt(500, 895, DURATION).unwrap(), 507);
        assert_eq!(collateral(&state, 500, 946, DURATION).unwrap(), 917);
        assert_eq!(debt(500, 0, DURATION).unwrap(), 500);
    }

    #[test]
    fn lender_amounts_round_down() {
        let state = PoolState::new(10_000, 272_428, 515);
        assert_eq!(bond(1000, 13_624, DURATION).unwrap(), 1100);
        assert_eq!(insurance(&state, 1000, 22, DURATION).unwrap(), 66);
        assert_eq!(bond(1000, 1, DURATION).unwrap(), 1000);
    }

    #[test]
    fn liquidity_collateral_includes_premium() {
        assert_eq!(liquidity_collateral(515, 31_531_000).unwrap(), 999);
        assert_eq!(liquidity_collateral(0, DURATION).unwrap(), 0);
    }

    #[test]
    fn partial_repay_releases_pro_rata() {
        let repayment = repay(552, 42, 276).unwrap();
        assert_eq!(
            repayment,
            Repayment {
                remaining_debt: 276,
                remaining_collateral: 21,
                released_collateral: 21,
            }
        );
        assert!(!repayment.is_settled());
    }

    #[test]
    fn partial_repay_rounds_release_down() {
        let repayment = repay(3, 2, 1).unwrap();
        assert_eq!(repayment.released_collateral, 0);
        assert_eq!(repayment.remaining_collateral, 2);
    }

    #[test]
    fn full_repay_releases_everything() {
        let repayment = repay(507, 917, 507).unwrap();
        assert!(repayment.is_settled());
        assert_eq!(repayment.released_collateral, 917);
        assert_eq!(repayment.remaining_collateral, 0);
    }

    #[test]
    fn repay_rejections() {
        assert_eq!(repay(507, 917, 0), Err(EngineError::ZeroAmount));
        assert_eq!(repay(507, 917, 508), Err(EngineError::RepayExceedsDebt));
        assert_eq!(repay(0, 0, 1), Err(EngineError::RepayExceedsDebt));
    }
}
