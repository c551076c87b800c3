use proptest::prelude::*;
use tenorpool::engine::invariant::{
    check_borrow, check_lend, min_borrow_rate, solve_borrow, solve_lend, Leg, TRADING_FEE,
};
use tenorpool::engine::{
    borrow_given_collateral, borrow_given_debt, borrow_given_percent, lend_given_bond,
    lend_given_insurance, lend_given_percent, BorrowOutcome, EngineError, LendOutcome,
    PERCENT_ONE,
};
use tenorpool::math::{mul_div_down, mul_div_up, sqrt_up, U256, U512};
use tenorpool::{FeeConfig, PoolState, Timestamp};

const FEE_UNIT: u128 = 0x10000;
const MATURITY: Timestamp = Timestamp(31_536_000);
const NOW: Timestamp = Timestamp(0);

fn pool_state() -> impl Strategy<Value = PoolState> {
    (1_000u128..1_000_000_000_000, 1u128..1_000_000_000_000_000, 1u128..1_000_000_000_000)
        .prop_map(|(x, y, z)| PoolState::new(x, y, z))
}

fn fee_config() -> impl Strategy<Value = FeeConfig> {
    (0u64..2_000, 0u64..1_000).prop_map(|(fee, protocol_fee)| FeeConfig::new(fee, protocol_fee))
}

fn triple(x: u128, y: U256, z: U256) -> U512 {
    U512::from(U256::from(x)) * U512::from(y) * U512::from(z)
}

fn scaled(reserve: u128) -> U256 {
    U256::from(reserve) << 16usize
}

/// `x * (y << 16) * (z << 16)` of the reserves before the trade.
fn scaled_product(state: &PoolState) -> U512 {
    triple(state.x, scaled(state.y), scaled(state.z))
}

/// Fee-adjusted product after a borrow, or `None` if the asset reserve
/// would be emptied.
fn borrow_product(state: &PoolState, dx: u128, dy: u128, dz: u128) -> Option<U512> {
    if dx >= state.x {
        return None;
    }
    let fee_in = U256::from(FEE_UNIT - TRADING_FEE);
    let y = scaled(state.y) + fee_in * U256::from(dy);
    let z = scaled(state.z) + fee_in * U256::from(dz);
    Some(triple(state.x - dx, y, z))
}

/// Fee-adjusted product after a lend, or `None` if a leg would go negative.
fn lend_product(state: &PoolState, dx: u128, dy: u128, dz: u128) -> Option<U512> {
    let fee_out = U256::from(FEE_UNIT + TRADING_FEE);
    let y = scaled(state.y).checked_sub(fee_out * U256::from(dy))?;
    let z = scaled(state.z).checked_sub(fee_out * U256::from(dz))?;
    Some(triple(state.x + dx, y, z))
}

/// Plain `x' * y' * z' >= x * y * z` on the reserves themselves.
fn raw_product_holds(before: &PoolState, after: &PoolState) -> bool {
    let product =
        |s: &PoolState| triple(s.x, U256::from(s.y), U256::from(s.z));
    product(after) >= product(before)
}

fn assert_borrow_holds(state: &PoolState, outcome: &BorrowOutcome) -> Result<(), TestCaseError> {
    let after = borrow_product(state, outcome.x_decrease, outcome.y_increase, outcome.z_increase);
    prop_assert!(matches!(after, Some(p) if p >= scaled_product(state)));
    prop_assert!(raw_product_holds(state, &outcome.apply(state).unwrap()));
    Ok(())
}

fn assert_lend_holds(state: &PoolState, outcome: &LendOutcome) -> Result<(), TestCaseError> {
    let after = lend_product(state, outcome.x_increase, outcome.y_decrease, outcome.z_decrease);
    prop_assert!(matches!(after, Some(p) if p >= scaled_product(state)));
    prop_assert!(raw_product_holds(state, &outcome.apply(state).unwrap()));
    Ok(())
}

proptest! {
    /// Rounded-up division never undershoots and is exact only on divisibility.
    #[test]
    fn prop_mul_div_rounding(a in any::<u64>(), b in any::<u64>(), d in 1u64..=u64::MAX) {
        let exact = u128::from(a) * u128::from(b);
        let d = u128::from(d);
        let up = mul_div_up(U256::from(a), U256::from(b), U256::from(d)).unwrap();
        let down = mul_div_down(U256::from(a), U256::from(b), U256::from(d)).unwrap();

        prop_assert_eq!(down, U256::from(exact / d));
        if exact % d == 0 {
            prop_assert_eq!(up, down);
        } else {
            prop_assert_eq!(up, down + U256::one());
        }
    }

    /// `sqrt_up` returns the least root.
    #[test]
    fn prop_sqrt_up_is_least_root(v in any::<u128>()) {
        let value = U256::from(v);
        let root = sqrt_up(value);
        prop_assert!(root * root >= value);
        if !root.is_zero() {
            let below = root - U256::one();
            prop_assert!(below * below < value);
        }
    }

    /// Adding rate or collateral to an accepted borrow keeps it accepted.
    #[test]
    fn prop_borrow_acceptance_is_monotone(
        state in pool_state(),
        dx_share in 1u128..1000,
        dy in 0u128..1_000_000_000,
        dz in 0u128..1_000_000_000,
    ) {
        let dx = (state.x * dx_share / 1000).max(1);
        if check_borrow(&state, dx, dy, dz).is_ok() {
            prop_assert!(check_borrow(&state, dx, dy + 1, dz).is_ok());
            prop_assert!(check_borrow(&state, dx, dy, dz + 1).is_ok());
        }
    }

    /// A solved borrow collateral is the smallest that passes.
    #[test]
    fn prop_borrow_collateral_is_minimal(
        state in pool_state(),
        dx_share in 1u128..1000,
        extra in 0u128..1_000_000,
    ) {
        let dx = (state.x * dx_share / 1000).max(1);
        prop_assume!(dx < state.x);
        let dy = min_borrow_rate(&state, dx).unwrap() + extra;
        let legs = solve_borrow(&state, dx, Leg::Rate(dy)).unwrap();

        prop_assert!(check_borrow(&state, dx, legs.dy, legs.dz).is_ok());
        if legs.dz > 0 {
            prop_assert_eq!(
                check_borrow(&state, dx, legs.dy, legs.dz - 1),
                Err(EngineError::InvariantViolation)
            );
        }
    }

    /// A pinned collateral never yields a rate below the floor.
    #[test]
    fn prop_borrow_rate_respects_floor(
        state in pool_state(),
        dx_share in 1u128..1000,
        dz in 0u128..1_000_000_000,
    ) {
        let dx = (state.x * dx_share / 1000).max(1);
        prop_assume!(dx < state.x);
        let legs = solve_borrow(&state, dx, Leg::Collateral(dz)).unwrap();
        prop_assert!(legs.dy >= min_borrow_rate(&state, dx).unwrap());
        prop_assert!(check_borrow(&state, dx, legs.dy, legs.dz).is_ok());
    }

    /// A solved lend collateral is the largest the product allows.
    #[test]
    fn prop_lend_collateral_is_maximal(
        state in pool_state(),
        dx in 1u128..1_000_000_000,
        dy_share in 0u128..1000,
    ) {
        let dy = state.y * dy_share / 2000;
        if let Ok(legs) = solve_lend(&state, dx, Leg::Rate(dy)) {
            match check_lend(&state, dx, legs.dy, legs.dz) {
                Ok(()) | Err(EngineError::RateBelowMinimum) => {}
                other => prop_assert!(false, "unexpected {:?}", other),
            }
            prop_assert_ne!(
                check_lend(&state, dx, legs.dy, legs.dz + 1),
                Ok(())
            );
        }
    }

    /// Any percent in range either solves cleanly or is rejected whole.
    #[test]
    fn prop_percent_borrow_satisfies_invariant(
        state in pool_state(),
        asset_share in 1u128..500,
        percent in 0u64..=PERCENT_ONE,
    ) {
        let asset_out = (state.x * asset_share / 1000).max(1);
        let maturity = Timestamp::new(31_536_000);
        let now = Timestamp::new(0);
        if let Ok(outcome) =
            borrow_given_percent(&state, &FeeConfig::zero(), asset_out, percent, maturity, now)
        {
            prop_assert!(
                check_borrow(&state, outcome.x_decrease, outcome.y_increase, outcome.z_increase)
                    .is_ok()
            );
            prop_assert!(outcome.debt >= asset_out);
            let next = outcome.apply(&state).unwrap();
            prop_assert!(next.x < state.x);
        }
    }

    /// Random borrow deltas whose product falls short are always rejected.
    #[test]
    fn prop_short_borrow_deltas_are_rejected(
        state in pool_state(),
        dx_share in 1u128..=1000,
        dy_share in 0u128..2000,
        dz_share in 0u128..2000,
    ) {
        let dx = (state.x * dx_share / 1000).max(1);
        let dy = state.y * dy_share / 1000;
        let dz = state.z * dz_share / 1000;
        let result = check_borrow(&state, dx, dy, dz);

        match borrow_product(&state, dx, dy, dz) {
            Some(after) if after >= scaled_product(&state) => prop_assert!(matches!(
                result,
                Ok(()) | Err(EngineError::RateBelowMinimum)
            )),
            _ => prop_assert_eq!(result, Err(EngineError::InvariantViolation)),
        }
    }

    /// Random lend deltas whose product falls short are always rejected.
    #[test]
    fn prop_short_lend_deltas_are_rejected(
        state in pool_state(),
        dx in 1u128..1_000_000_000_000,
        dy_share in 0u128..1200,
        dz_share in 0u128..1200,
    ) {
        let dy = state.y * dy_share / 1000;
        let dz = state.z * dz_share / 1000;
        let result = check_lend(&state, dx, dy, dz);

        match lend_product(&state, dx, dy, dz) {
            Some(after) if after >= scaled_product(&state) => prop_assert!(matches!(
                result,
                Ok(()) | Err(EngineError::RateBelowMinimum)
            )),
            _ => prop_assert_eq!(result, Err(EngineError::InvariantViolation)),
        }
    }

    /// Whatever a borrow parameterization accepts keeps the product.
    #[test]
    fn prop_accepted_borrows_keep_product(
        state in pool_state(),
        fees in fee_config(),
        asset_share in 1u128..900,
        interest in 0u128..1_000_000_000_000,
        collateral_in in 0u128..1_000_000_000_000,
        percent in 0u64..=PERCENT_ONE,
    ) {
        let asset_out = (state.x * asset_share / 1000).max(1);
        let results = [
            borrow_given_debt(&state, &fees, asset_out, asset_out + interest, MATURITY, NOW),
            borrow_given_collateral(&state, &fees, asset_out, collateral_in, MATURITY, NOW),
            borrow_given_percent(&state, &fees, asset_out, percent, MATURITY, NOW),
        ];
        for outcome in results.iter().flatten() {
            assert_borrow_holds(&state, outcome)?;
        }
    }

    /// Whatever a lend parameterization accepts keeps the product.
    #[test]
    fn prop_accepted_lends_keep_product(
        state in pool_state(),
        fees in fee_config(),
        asset_in in 1u128..1_000_000_000_000,
        interest in 0u128..1_000_000_000_000,
        insurance_out in 0u128..1_000_000_000_000,
        percent in 0u64..=PERCENT_ONE,
    ) {
        let results = [
            lend_given_bond(&state, &fees, asset_in, asset_in + interest, MATURITY, NOW),
            lend_given_insurance(&state, &fees, asset_in, insurance_out, MATURITY, NOW),
            lend_given_percent(&state, &fees, asset_in, percent, MATURITY, NOW),
        ];
        for outcome in results.iter().flatten() {
            assert_lend_holds(&state, outcome)?;
        }
    }
}
