//! Fixed-point arithmetic over wide unsigned integers.
//!
//! This module provides:
//! - `U256` / `U512` integer types backed by the `uint` crate
//! - Multiply-divide with explicit rounding direction
//! - Ceiling shift and ceiling integer square root
//! - Narrowing conversions that report overflow instead of truncating
//!
//! Products of two 256-bit values are always formed in 512 bits, so the
//! only overflow a caller can observe is a result that does not fit back
//! into the requested width.

use thiserror::Error;

#[allow(
    clippy::assign_op_pattern,
    clippy::ptr_offset_with_cast,
    clippy::manual_range_contains
)]
mod wide {
    use uint::construct_uint;

    construct_uint! {
        /// 256-bit unsigned integer.
        pub struct U256(4);
    }

    construct_uint! {
        /// 512-bit unsigned integer, used for full-width products.
        pub struct U512(8);
    }
}

pub use wide::{U256, U512};

/// Arithmetic failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MathError {
    #[error("arithmetic overflow")]
    Overflow,
    #[error("arithmetic underflow")]
    Underflow,
    #[error("division by zero")]
    DivisionByZero,
}

impl From<U256> for U512 {
    fn from(value: U256) -> Self {
        let U256(ref words) = value;
        let mut out = [0u64; 8];
        out[..4].copy_from_slice(words);
        U512(out)
    }
}

/// Narrow a 512-bit value to 256 bits.
pub fn narrow(value: U512) -> Result<U256, MathError> {
    let U512(ref words) = value;
    if words[4..].iter().any(|w| *w != 0) {
        return Err(MathError::Overflow);
    }
    let mut out = [0u64; 4];
    out.copy_from_slice(&words[..4]);
    Ok(U256(out))
}

/// Narrow a 256-bit value to `u128`.
pub fn to_u128(value: U256) -> Result<u128, MathError> {
    if value.bits() > 128 {
        return Err(MathError::Overflow);
    }
    Ok(value.low_u128())
}

/// Narrow a 512-bit value to `u128`.
pub fn wide_to_u128(value: U512) -> Result<u128, MathError> {
    to_u128(narrow(value)?)
}

/// `a * b` in 512 bits, failing if the product exceeds that width.
pub fn mul_wide(a: U512, b: U512) -> Result<U512, MathError> {
    a.checked_mul(b).ok_or(MathError::Overflow)
}

/// Returns `ceil(a * b / denominator)`.
///
/// # Errors
/// `DivisionByZero` if `denominator` is zero, `Overflow` if the quotient
/// does not fit in 256 bits.
pub fn mul_div_up(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    let product = U512::from(a) * U512::from(b);
    narrow(div_up_wide(product, U512::from(denominator))?)
}

/// Returns `floor(a * b / denominator)`.
///
/// # Errors
/// `DivisionByZero` if `denominator` is zero, `Overflow` if the quotient
/// does not fit in 256 bits.
pub fn mul_div_down(a: U256, b: U256, denominator: U256) -> Result<U256, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let product = U512::from(a) * U512::from(b);
    narrow(product / U512::from(denominator))
}

/// Returns `ceil(numerator / denominator)`.
pub fn div_up(numerator: U256, denominator: U256) -> Result<U256, MathError> {
    narrow(div_up_wide(
        U512::from(numerator),
        U512::from(denominator),
    )?)
}

/// Returns `ceil(numerator / denominator)` in 512 bits.
pub fn div_up_wide(numerator: U512, denominator: U512) -> Result<U512, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let quotient = numerator / denominator;
    if (numerator % denominator).is_zero() {
        Ok(quotient)
    } else {
        // quotient < 2^512 - 1 whenever a remainder exists
        Ok(quotient + U512::one())
    }
}

/// Returns `floor(numerator / denominator)` in 512 bits.
pub fn div_down_wide(numerator: U512, denominator: U512) -> Result<U512, MathError> {
    if denominator.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    Ok(numerator / denominator)
}

/// Returns `ceil(value / 2^bits)`.
pub fn shift_right_up(value: U256, bits: usize) -> U256 {
    let shifted = value >> bits;
    if (shifted << bits) == value {
        shifted
    } else {
        shifted + U256::one()
    }
}

/// Returns the smallest `r` such that `r * r >= value`.
///
/// Newton's method seeded with `2^ceil(bits/2)`, which is never below the
/// root. The iteration decreases monotonically until it reaches the floor
/// root, after which the ceiling is one step away.
pub fn sqrt_up(value: U256) -> U256 {
    if value.is_zero() {
        return U256::zero();
    }

    let mut root = U256::one() << ((value.bits() + 1) / 2);
    loop {
        let next = (root + value / root) >> 1usize;
        if next >= root {
            break;
        }
        root = next;
    }

    // root is now floor(sqrt(value)) < 2^128, so the square cannot overflow.
    if root * root < value {
        root + U256::one()
    } else {
        root
    }
}
