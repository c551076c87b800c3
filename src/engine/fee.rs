//! Time-scaled trading fees on the asset leg.

use crate::domain::FeeConfig;
use crate::math::{mul_div_down, mul_div_up, to_u128, U256};

use super::EngineError;

/// Fee rates are expressed in units of `2^-40` per second.
pub const BASE: u128 = 1 << 40;

/// Split of an asset amount into the reserve delta and the fees retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeQuote {
    /// Amount the user sends or receives.
    pub principal: u128,
    /// Amount the asset reserve moves by.
    pub reserve_delta: u128,
    pub pool_fee: u128,
    pub protocol_fee: u128,
}

fn growth(rate: u64, duration: u64) -> U256 {
    U256::from(BASE) + U256::from(duration) * U256::from(rate)
}

/// Asset reserve debit for a borrow paying out `asset_out`. Rounds up.
pub fn x_decrease(asset_out: u128, fees: &FeeConfig, duration: u64) -> Result<u128, EngineError> {
    Ok(quote_borrow(asset_out, fees, duration)?.reserve_delta)
}

/// Asset reserve credit for a lend depositing `asset_in`. Rounds down.
pub fn x_increase(asset_in: u128, fees: &FeeConfig, duration: u64) -> Result<u128, EngineError> {
    Ok(quote_lend(asset_in, fees, duration)?.reserve_delta)
}

pub fn quote_borrow(
    asset_out: u128,
    fees: &FeeConfig,
    duration: u64,
) -> Result<FeeQuote, EngineError> {
    let base = U256::from(BASE);
    let principal = U256::from(asset_out);
    let after_pool = mul_div_up(principal, growth(fees.fee, duration), base)?;
    let after_protocol = mul_div_up(after_pool, growth(fees.protocol_fee, duration), base)?;

    Ok(FeeQuote {
        principal: asset_out,
        reserve_delta: to_u128(after_protocol)?,
        pool_fee: to_u128(after_pool - principal)?,
        protocol_fee: to_u128(after_protocol - after_pool)?,
    })
}

pub fn quote_lend(asset_in: u128, fees: &FeeConfig, duration: u64) -> Result<FeeQuote, EngineError> {
    let base = U256::from(BASE);
    let principal = U256::from(asset_in);
    let after_pool = mul_div_down(principal, base, growth(fees.fee, duration))?;
    let after_protocol = mul_div_down(after_pool, base, growth(fees.protocol_fee, duration))?;

    Ok(FeeQuote {
        principal: asset_in,
        reserve_delta: to_u128(after_protocol)?,
        pool_fee: to_u128(principal - after_pool)?,
        protocol_fee: to_u128(after_pool - after_protocol)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: u64 = 31_536_000;

    #[test]
    fn zero_fees_are_identity() {
        let fees = FeeConfig::zero();
        assert_eq!(x_decrease(500, &fees, YEAR).unwrap(), 500);
        assert_eq!(x_increase(1000, &fees, YEAR).unwrap(), 1000);
    }

    #[test]
    fn borrow_fee_rounds_against_borrower() {
        let fees = FeeConfig::new(100, 50);
        let quote = quote_borrow(500, &fees, 31_526_000).unwrap();
        assert_eq!(quote.reserve_delta, 503);
        assert_eq!(quote.principal + quote.pool_fee + quote.protocol_fee, 503);
        assert!(quote.pool_fee >= quote.protocol_fee);
    }

    #[test]
    fn lend_fee_rounds_against_lender() {
        let fees = FeeConfig::new(100, 50);
        let quote = quote_lend(1000, &fees, 31_526_000).unwrap();
        assert_eq!(quote.reserve_delta, 995);
        assert_eq!(
            quote.reserve_delta + quote.pool_fee + quote.protocol_fee,
            1000
        );
    }

    #[test]
    fn one_unit_still_pays_fee() {
        let fees = FeeConfig::new(1, 1);
        assert_eq!(x_decrease(1, &fees, 1).unwrap(), 3);
        assert_eq!(x_increase(1, &fees, 1).unwrap(), 0);
    }
}
