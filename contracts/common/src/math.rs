//! Mathematical Utilities for the LevX Protocol
//!
//! Safe fixed-point arithmetic and the financial ratios used by the
//! leverage engine: the geometric leverage series, the live leverage
//! ratio, health factors, and proportional share computations. All
//! intermediate products run through `u128` with checked operations.

use crate::constants::precision::{BPS_DENOMINATOR, PRICE_ONE};
use crate::errors::{LevxError, LevxResult};

/// Safe addition with overflow check
pub fn safe_add(a: u64, b: u64) -> LevxResult<u64> {
    a.checked_add(b).ok_or(LevxError::Overflow)
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u64, b: u64) -> LevxResult<u64> {
    a.checked_sub(b).ok_or(LevxError::Underflow)
}

/// `a * b / denominator` with a u128 intermediate, floored
pub fn mul_div(a: u64, b: u64, denominator: u64) -> LevxResult<u64> {
    if denominator == 0 {
        return Err(LevxError::DivisionByZero);
    }
    let wide = (a as u128)
        .checked_mul(b as u128)
        .ok_or(LevxError::Overflow)?
        / denominator as u128;
    if wide > u64::MAX as u128 {
        return Err(LevxError::Overflow);
    }
    Ok(wide as u64)
}

/// Apply a basis-point fraction to an amount
pub fn apply_bps(amount: u64, bps: u64) -> LevxResult<u64> {
    mul_div(amount, bps, BPS_DENOMINATOR)
}

/// Value in quote units of `amount` native units at `price`
/// (quote per unit, 8 decimals)
pub fn value_of(amount: u64, price: u64) -> LevxResult<u64> {
    mul_div(amount, price, PRICE_ONE)
}

/// Native units purchasable with `value` quote units at `price`
pub fn amount_for_value(value: u64, price: u64) -> LevxResult<u64> {
    if price == 0 {
        return Err(LevxError::DivisionByZero);
    }
    mul_div(value, PRICE_ONE, price)
}

/// Target leverage for borrow factor `f` (BPS) and `n` loop iterations:
/// `Σ_{i=0..n} f^i`, returned in BPS.
///
/// f = 0.8, n = 3 yields 29_520 (2.952x); f = 0.75, n = 3 yields 27_343.
pub fn leverage_series_bps(borrow_factor_bps: u64, iterations: u8) -> LevxResult<u64> {
    let mut acc: u128 = BPS_DENOMINATOR as u128;
    let mut term: u128 = BPS_DENOMINATOR as u128;

    for _ in 0..iterations {
        term = term
            .checked_mul(borrow_factor_bps as u128)
            .ok_or(LevxError::Overflow)?
            / BPS_DENOMINATOR as u128;
        acc = acc.checked_add(term).ok_or(LevxError::Overflow)?;
    }

    if acc > u64::MAX as u128 {
        return Err(LevxError::Overflow);
    }
    Ok(acc as u64)
}

/// Current leverage ratio in BPS from live collateral and debt values:
/// `collateral / (collateral - debt)`.
///
/// Returns 1x (10_000) for a debt-free account and `u64::MAX` for an
/// account at or past the point where debt consumes all collateral.
pub fn current_leverage_bps(collateral_value: u64, debt_value: u64) -> u64 {
    if debt_value == 0 {
        return BPS_DENOMINATOR;
    }
    if collateral_value <= debt_value {
        return u64::MAX;
    }

    let equity = (collateral_value - debt_value) as u128;
    let ratio = (collateral_value as u128) * BPS_DENOMINATOR as u128 / equity;
    ratio.min(u64::MAX as u128) as u64
}

/// Health factor in BPS: `collateral_value * liquidation_threshold / debt`.
///
/// `u64::MAX` for a debt-free account.
pub fn health_factor_bps(
    collateral_value: u64,
    debt_value: u64,
    liquidation_threshold_bps: u64,
) -> u64 {
    if debt_value == 0 {
        return u64::MAX;
    }

    let hf = (collateral_value as u128) * liquidation_threshold_bps as u128 / debt_value as u128;
    hf.min(u64::MAX as u128) as u64
}

/// A holder's proportional share of an aggregate amount.
///
/// When `units == total_supply` the share is the exact full amount, so a
/// complete redemption never strands rounding dust in the ledger.
pub fn proportional_share(amount: u64, units: u64, total_supply: u64) -> LevxResult<u64> {
    if total_supply == 0 {
        return Err(LevxError::DivisionByZero);
    }
    if units == total_supply {
        return Ok(amount);
    }
    mul_div(amount, units, total_supply)
}

/// Minimum acceptable output for a swap with expected output `expected`
/// and slippage tolerance `max_slippage_bps`
pub fn min_out_after_slippage(expected: u64, max_slippage_bps: u64) -> LevxResult<u64> {
    let keep_bps = BPS_DENOMINATOR.saturating_sub(max_slippage_bps);
    apply_bps(expected, keep_bps)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: u64 = 100_000_000;

    #[test]
    fn test_mul_div() {
        assert_eq!(mul_div(1000, 8000, 10_000).unwrap(), 800);
        assert_eq!(mul_div(u64::MAX, 1, u64::MAX).unwrap(), 1);
        assert!(matches!(
            mul_div(1, 1, 0),
            Err(LevxError::DivisionByZero)
        ));
        assert!(matches!(
            mul_div(u64::MAX, u64::MAX, 1),
            Err(LevxError::Overflow)
        ));
    }

    #[test]
    fn test_value_conversions() {
        let price = 1000 * ONE; // 1000 quote per base
        assert_eq!(value_of(ONE, price).unwrap(), 1000 * ONE);
        assert_eq!(amount_for_value(1000 * ONE, price).unwrap(), ONE);

        // Round trip within one base unit of dust
        let amount = 123_456_789;
        let value = value_of(amount, price).unwrap();
        let back = amount_for_value(value, price).unwrap();
        assert!(amount - back <= 1);
    }

    #[test]
    fn test_leverage_series() {
        // 1 + 0.8 + 0.64 + 0.512 = 2.952
        assert_eq!(leverage_series_bps(8000, 3).unwrap(), 29_520);
        // 1 + 0.75 + 0.5625 + 0.421875 = 2.734...
        assert_eq!(leverage_series_bps(7500, 3).unwrap(), 27_343);
        // Zero iterations is 1x
        assert_eq!(leverage_series_bps(8000, 0).unwrap(), 10_000);
    }

    #[test]
    fn test_current_leverage() {
        // 2952 collateral vs 1952 debt: equity 1000, leverage 2.952x
        assert_eq!(
            current_leverage_bps(2952 * ONE, 1952 * ONE),
            29_520
        );
        assert_eq!(current_leverage_bps(1000 * ONE, 0), 10_000);
        assert_eq!(current_leverage_bps(100, 100), u64::MAX);
        assert_eq!(current_leverage_bps(100, 200), u64::MAX);
    }

    #[test]
    fn test_health_factor() {
        // 2952 * 0.825 / 1952 = 1.24764..., floored
        assert_eq!(
            health_factor_bps(2952 * ONE, 1952 * ONE, 8250),
            12_476
        );
        assert_eq!(health_factor_bps(1000, 0, 8250), u64::MAX);
    }

    #[test]
    fn test_proportional_share() {
        // Partial share floors
        assert_eq!(proportional_share(1000, 1, 3).unwrap(), 333);
        // Full share is exact regardless of divisibility
        assert_eq!(proportional_share(1000, 3, 3).unwrap(), 1000);
        assert!(matches!(
            proportional_share(1000, 1, 0),
            Err(LevxError::DivisionByZero)
        ));
    }

    #[test]
    fn test_min_out_after_slippage() {
        assert_eq!(min_out_after_slippage(10_000, 100).unwrap(), 9_900);
        assert_eq!(min_out_after_slippage(10_000, 0).unwrap(), 10_000);
    }
}
