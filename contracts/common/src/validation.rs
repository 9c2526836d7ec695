//! Input Validation
//!
//! Free validators shared by the configuration store and the engine
//! crates. Each returns a typed error naming the offending parameter.

use crate::config::PositionConfig;
use crate::constants::{leverage, limits, precision::BPS_DENOMINATOR};
use crate::errors::{LevxError, LevxResult};

/// Validate a fully resolved position configuration
pub fn validate_config(config: &PositionConfig) -> LevxResult<()> {
    if config.amount_per_unit_collateral_bps < leverage::MIN_BORROW_FACTOR_BPS {
        return Err(LevxError::InvalidParameter {
            param: "amount_per_unit_collateral_bps",
            reason: "below minimum borrow factor",
        });
    }
    if config.amount_per_unit_collateral_bps > leverage::MAX_BORROW_FACTOR_BPS {
        return Err(LevxError::InvalidParameter {
            param: "amount_per_unit_collateral_bps",
            reason: "borrow factor must stay below 100%",
        });
    }
    if config.iterations == 0 {
        return Err(LevxError::InvalidParameter {
            param: "iterations",
            reason: "at least one loop iteration required",
        });
    }
    if config.iterations > leverage::MAX_ITERATIONS {
        return Err(LevxError::InvalidParameter {
            param: "iterations",
            reason: "exceeds iteration cap",
        });
    }
    if config.min_health_factor_bps <= BPS_DENOMINATOR {
        return Err(LevxError::InvalidParameter {
            param: "min_health_factor_bps",
            reason: "health floor must exceed 1.0",
        });
    }
    Ok(())
}

/// Reject zero amounts
pub fn ensure_nonzero(amount: u64) -> LevxResult<()> {
    if amount == 0 {
        return Err(LevxError::ZeroAmount);
    }
    Ok(())
}

/// Validate a principal amount against the issuance minimum
pub fn validate_principal(amount: u64) -> LevxResult<()> {
    ensure_nonzero(amount)?;
    if amount < limits::MIN_ISSUE_AMOUNT {
        return Err(LevxError::InvalidParameter {
            param: "principal_amount",
            reason: "below minimum issuance size",
        });
    }
    Ok(())
}

/// Validate a reference price
pub fn validate_price(price: u64) -> LevxResult<()> {
    if price == 0 {
        return Err(LevxError::InvalidParameter {
            param: "reference_price",
            reason: "price cannot be zero",
        });
    }
    Ok(())
}

/// Validate a slippage tolerance
pub fn validate_slippage(max_slippage_bps: u64) -> LevxResult<()> {
    if max_slippage_bps >= BPS_DENOMINATOR {
        return Err(LevxError::InvalidParameter {
            param: "max_slippage_bps",
            reason: "slippage tolerance must stay below 100%",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> PositionConfig {
        PositionConfig {
            amount_per_unit_collateral_bps: 8000,
            iterations: 3,
            min_health_factor_bps: 10_300,
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config_accepted() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_borrow_factor_bounds() {
        let mut config = valid_config();
        config.amount_per_unit_collateral_bps = 10_000;
        assert!(validate_config(&config).is_err());

        config.amount_per_unit_collateral_bps = 50;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_iteration_bounds() {
        let mut config = valid_config();
        config.iterations = 0;
        assert!(validate_config(&config).is_err());

        config.iterations = 11;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_health_floor_bound() {
        let mut config = valid_config();
        config.min_health_factor_bps = 10_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_amount_validators() {
        assert!(matches!(ensure_nonzero(0), Err(LevxError::ZeroAmount)));
        assert!(ensure_nonzero(1).is_ok());
        assert!(validate_principal(100).is_err()); // below 0.01 units
        assert!(validate_principal(1_000_000).is_ok());
        assert!(validate_price(0).is_err());
        assert!(validate_slippage(10_000).is_err());
        assert!(validate_slippage(100).is_ok());
    }
}
