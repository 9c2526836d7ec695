//! Core Types for the LevX Protocol
//!
//! Defines the fundamental data structures shared by the leverage engine
//! and the rebalancer: the per-instance position ledger, the lending
//! account report, and the small vocabulary types used across capability
//! calls.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::token::PositionToken;

/// Type alias for addresses (32-byte hash)
pub type Address = [u8; 32];

/// Type alias for asset identifiers
pub type AssetId = [u8; 32];

/// Type alias for position identifiers
pub type PositionId = [u8; 32];

// ============ Position Types ============

/// Direction of the leveraged exposure, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum PositionSide {
    /// Collateral is the base asset; debt is the quote asset.
    /// Gains value when the base asset price rises.
    #[default]
    Long,
    /// Collateral is the quote asset; debt is the base asset.
    /// Gains value when the base asset price falls.
    Short,
}

/// Borrow rate mode requested from the lending market
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum RateMode {
    /// Rate fixed at borrow time
    Stable,
    /// Rate floats with pool utilization
    #[default]
    Variable,
}

/// Aggregate ledger of one leveraged token instance.
///
/// `collateral_amount` and `debt_amount` mirror what the lending market
/// reports for this position's account; they are committed only after the
/// corresponding external calls succeed, never in advance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct LeveragedPosition {
    /// Unique identifier for this position instance
    pub id: PositionId,
    /// Manager allowed to set this position's configuration
    pub manager: Address,
    /// Exposure direction
    pub side: PositionSide,
    /// Asset whose price the position tracks
    pub base_asset: AssetId,
    /// Asset prices are quoted in; also the principal asset investors
    /// deposit and redeem
    pub quote_asset: AssetId,
    /// Collateral supplied to the lending market, in native units of the
    /// collateral asset
    pub collateral_amount: u64,
    /// Outstanding borrowings, in native units of the debt asset
    pub debt_amount: u64,
    /// Fungible claim units: supply and holder balances
    pub token: PositionToken,
    /// Operation lock: set while an issuance, redemption, or rebalance is
    /// in flight; nested entry is rejected
    pub locked: bool,
    /// Block height at creation
    pub created_at: u64,
    /// Block height of the last completed rebalance
    pub last_rebalance_height: u64,
}

impl LeveragedPosition {
    /// Creates an empty position ledger
    pub fn new(
        id: PositionId,
        manager: Address,
        side: PositionSide,
        base_asset: AssetId,
        quote_asset: AssetId,
        block_height: u64,
    ) -> Self {
        Self {
            id,
            manager,
            side,
            base_asset,
            quote_asset,
            collateral_amount: 0,
            debt_amount: 0,
            token: PositionToken::new(),
            locked: false,
            created_at: block_height,
            last_rebalance_height: 0,
        }
    }

    /// Asset held as collateral for this side
    pub fn collateral_asset(&self) -> AssetId {
        match self.side {
            PositionSide::Long => self.base_asset,
            PositionSide::Short => self.quote_asset,
        }
    }

    /// Asset borrowed from the lending market for this side
    pub fn debt_asset(&self) -> AssetId {
        match self.side {
            PositionSide::Long => self.quote_asset,
            PositionSide::Short => self.base_asset,
        }
    }

    /// True when no claim units are outstanding
    pub fn is_empty(&self) -> bool {
        self.token.total_supply == 0
    }
}

/// Deterministic position id from manager, asset pair, side, and creation
/// height
pub fn derive_position_id(
    manager: &Address,
    base_asset: &AssetId,
    quote_asset: &AssetId,
    side: PositionSide,
    block_height: u64,
) -> PositionId {
    use sha2::{Digest, Sha256};

    let mut hasher = Sha256::new();
    hasher.update(manager);
    hasher.update(base_asset);
    hasher.update(quote_asset);
    hasher.update([match side {
        PositionSide::Long => 0u8,
        PositionSide::Short => 1u8,
    }]);
    hasher.update(block_height.to_le_bytes());

    let digest = hasher.finalize();
    let mut id = [0u8; 32];
    id.copy_from_slice(&digest);
    id
}

// ============ Lending Account Types ============

/// Aggregate account report from the lending market.
///
/// All value fields are denominated in the quote asset with 8 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct AccountData {
    /// Total collateral value
    pub total_collateral_value: u64,
    /// Total debt value
    pub total_debt_value: u64,
    /// Additional value borrowable before hitting the collateral limit
    pub available_borrow_value: u64,
    /// Liquidation threshold in basis points
    pub liquidation_threshold_bps: u64,
    /// Health factor in basis points; `u64::MAX` when there is no debt
    pub health_factor_bps: u64,
}

impl AccountData {
    /// Net position value (collateral minus debt), zero when underwater
    pub fn equity_value(&self) -> u64 {
        self.total_collateral_value
            .saturating_sub(self.total_debt_value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> Address {
        [7u8; 32]
    }

    fn weth() -> AssetId {
        [0xAAu8; 32]
    }

    fn dai() -> AssetId {
        [0xBBu8; 32]
    }

    #[test]
    fn test_side_asset_resolution() {
        let long = LeveragedPosition::new(
            [1u8; 32],
            manager(),
            PositionSide::Long,
            weth(),
            dai(),
            100,
        );
        assert_eq!(long.collateral_asset(), weth());
        assert_eq!(long.debt_asset(), dai());

        let short = LeveragedPosition::new(
            [2u8; 32],
            manager(),
            PositionSide::Short,
            weth(),
            dai(),
            100,
        );
        assert_eq!(short.collateral_asset(), dai());
        assert_eq!(short.debt_asset(), weth());
    }

    #[test]
    fn test_position_id_deterministic() {
        let a = derive_position_id(&manager(), &weth(), &dai(), PositionSide::Long, 100);
        let b = derive_position_id(&manager(), &weth(), &dai(), PositionSide::Long, 100);
        let c = derive_position_id(&manager(), &weth(), &dai(), PositionSide::Short, 100);
        let d = derive_position_id(&manager(), &weth(), &dai(), PositionSide::Long, 101);

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_equity_value() {
        let data = AccountData {
            total_collateral_value: 2952_00000000,
            total_debt_value: 1952_00000000,
            available_borrow_value: 0,
            liquidation_threshold_bps: 8250,
            health_factor_bps: 12477,
        };
        assert_eq!(data.equity_value(), 1000_00000000);

        let underwater = AccountData {
            total_collateral_value: 100,
            total_debt_value: 200,
            ..data
        };
        assert_eq!(underwater.equity_value(), 0);
    }

    #[test]
    fn test_position_serialization_round_trip() {
        let position = LeveragedPosition::new(
            [3u8; 32],
            manager(),
            PositionSide::Long,
            weth(),
            dai(),
            42,
        );

        let bytes = borsh::to_vec(&position).unwrap();
        let restored: LeveragedPosition = borsh::from_slice(&bytes).unwrap();
        assert_eq!(position, restored);
    }
}
