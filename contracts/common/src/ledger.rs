//! Derived Debt Accounting
//!
//! Per-holder views over the position ledger. Nothing here is stored: a
//! holder's debt share, exposure, and net asset value are pure functions
//! of (aggregate ledger, holder balance, total supply), which guarantees
//! they track token transfers with no bookkeeping of their own.

use crate::errors::LevxResult;
use crate::math::proportional_share;
use crate::types::{AccountData, Address, LeveragedPosition};

/// A holder's share of the aggregate debt, in native debt-asset units
pub fn debt_of(position: &LeveragedPosition, holder: &Address) -> LevxResult<u64> {
    let balance = position.token.balance_of(holder);
    if balance == 0 || position.token.total_supply == 0 {
        return Ok(0);
    }
    proportional_share(position.debt_amount, balance, position.token.total_supply)
}

/// A holder's share of the aggregate collateral, in native collateral
/// units
pub fn exposure_of(position: &LeveragedPosition, holder: &Address) -> LevxResult<u64> {
    let balance = position.token.balance_of(holder);
    if balance == 0 || position.token.total_supply == 0 {
        return Ok(0);
    }
    proportional_share(
        position.collateral_amount,
        balance,
        position.token.total_supply,
    )
}

/// A holder's net asset value, the proportional claim on collateral net
/// of debt, in quote units, valued from the lending market's live report
pub fn nav_of(
    position: &LeveragedPosition,
    holder: &Address,
    account: &AccountData,
) -> LevxResult<u64> {
    let balance = position.token.balance_of(holder);
    if balance == 0 || position.token.total_supply == 0 {
        return Ok(0);
    }
    proportional_share(account.equity_value(), balance, position.token.total_supply)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PositionSide;

    const ONE: u64 = 100_000_000;

    fn alice() -> Address {
        [1u8; 32]
    }

    fn bob() -> Address {
        [2u8; 32]
    }

    fn carol() -> Address {
        [3u8; 32]
    }

    fn position_with_holders() -> LeveragedPosition {
        let mut position = LeveragedPosition::new(
            [9u8; 32],
            [7u8; 32],
            PositionSide::Long,
            [0xAAu8; 32],
            [0xBBu8; 32],
            100,
        );
        position.collateral_amount = 9 * 295_200_000; // 26.568 base units
        position.debt_amount = 9 * 1952 * ONE; // 17568 quote units
        position.token.mint(alice(), 8 * ONE).unwrap();
        position.token.mint(bob(), ONE).unwrap();
        position
    }

    #[test]
    fn test_debt_proportional_to_balance() {
        let position = position_with_holders();

        let alice_debt = debt_of(&position, &alice()).unwrap();
        let bob_debt = debt_of(&position, &bob()).unwrap();

        // Alice holds 8x Bob's balance
        assert_eq!(alice_debt, bob_debt * 8);
        assert_eq!(debt_of(&position, &carol()).unwrap(), 0);
    }

    #[test]
    fn test_debt_conservation() {
        let position = position_with_holders();

        let total: u64 = [alice(), bob()]
            .iter()
            .map(|h| debt_of(&position, h).unwrap())
            .sum();

        // Sum of derived shares equals aggregate debt within 1 part in 1e6
        let diff = position.debt_amount - total;
        assert!(diff <= position.debt_amount / 1_000_000);
    }

    #[test]
    fn test_debt_follows_transfers() {
        let mut position = position_with_holders();
        let bob_before = debt_of(&position, &bob()).unwrap();

        position.token.transfer(&alice(), bob(), 4 * ONE).unwrap();

        let bob_after = debt_of(&position, &bob()).unwrap();
        // Bob went from 1 to 5 units of 9
        assert_eq!(bob_after, bob_before * 5);
        // No separate debt record exists to go stale
        let total: u64 = [alice(), bob()]
            .iter()
            .map(|h| debt_of(&position, h).unwrap())
            .sum();
        assert!(position.debt_amount - total <= 1);
    }

    #[test]
    fn test_nav_from_account_report() {
        let position = position_with_holders();
        let account = AccountData {
            total_collateral_value: 26568 * ONE,
            total_debt_value: 17568 * ONE,
            available_borrow_value: 0,
            liquidation_threshold_bps: 8250,
            health_factor_bps: 12_477,
        };

        // Equity is 9000 quote; Bob holds 1/9 of supply
        let bob_nav = nav_of(&position, &bob(), &account).unwrap();
        assert_eq!(bob_nav, 1000 * ONE);

        let alice_nav = nav_of(&position, &alice(), &account).unwrap();
        assert_eq!(alice_nav, 8000 * ONE);

        // Exposure splits the collateral the same way
        assert_eq!(exposure_of(&position, &bob()).unwrap(), 295_200_000);
        assert_eq!(
            exposure_of(&position, &alice()).unwrap(),
            8 * 295_200_000
        );
    }

    #[test]
    fn test_empty_position_reads_zero() {
        let position = LeveragedPosition::new(
            [9u8; 32],
            [7u8; 32],
            PositionSide::Long,
            [0xAAu8; 32],
            [0xBBu8; 32],
            100,
        );
        assert_eq!(debt_of(&position, &alice()).unwrap(), 0);
        assert_eq!(exposure_of(&position, &alice()).unwrap(), 0);
    }
}
