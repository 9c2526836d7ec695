//! External Capability Interfaces
//!
//! The engine never talks to a concrete lending market or exchange; it is
//! handed implementations of these traits at the call site. Each call is a
//! black box that either fully succeeds or fully fails; multi-call
//! atomicity is the engine's responsibility (see the unwind machinery in
//! the leverage module).

use crate::errors::LevxResult;
use crate::types::{AccountData, Address, AssetId, RateMode};

/// Lending market capability: supply, borrow, repay, withdraw, and the
/// aggregate account report used for health and headroom decisions.
pub trait LendingCapability {
    /// Deposit `amount` of `asset` as collateral for `on_behalf_of`
    fn supply(&mut self, asset: AssetId, amount: u64, on_behalf_of: Address) -> LevxResult<()>;

    /// Borrow `amount` of `asset` against `on_behalf_of`'s collateral
    fn borrow(
        &mut self,
        asset: AssetId,
        amount: u64,
        rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> LevxResult<()>;

    /// Repay up to `amount` of `on_behalf_of`'s `asset` debt; returns the
    /// amount actually repaid
    fn repay(
        &mut self,
        asset: AssetId,
        amount: u64,
        rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> LevxResult<u64>;

    /// Withdraw `amount` of collateral `asset` to `to`; returns the amount
    /// actually withdrawn
    fn withdraw(&mut self, asset: AssetId, amount: u64, to: Address) -> LevxResult<u64>;

    /// Aggregate account report, all values in quote units
    fn account_data(&self, on_behalf_of: &Address) -> LevxResult<AccountData>;
}

/// Exchange capability: bounded swaps with deadlines plus a read-only
/// quote used when staging an operation.
pub trait ExchangeCapability {
    /// Swap exactly `amount_in`; fails if the output would be below
    /// `min_amount_out` or the deadline has passed. Returns the output
    /// amount.
    fn swap_exact_in(
        &mut self,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: u64,
        min_amount_out: u64,
        recipient: Address,
        deadline: u64,
    ) -> LevxResult<u64>;

    /// Swap to exactly `amount_out`; fails if more than `max_amount_in`
    /// would be consumed or the deadline has passed. Returns the input
    /// amount consumed.
    fn swap_exact_out(
        &mut self,
        asset_in: AssetId,
        asset_out: AssetId,
        max_amount_in: u64,
        amount_out: u64,
        recipient: Address,
        deadline: u64,
    ) -> LevxResult<u64>;

    /// Read-only quote: output of swapping `amount_in`, fees included
    fn quote_exact_in(
        &self,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: u64,
    ) -> LevxResult<u64>;
}
