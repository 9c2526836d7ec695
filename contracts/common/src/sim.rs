//! Deterministic Market Simulators
//!
//! In-crate models of the two external capabilities, used by the test
//! suites and for scenario simulation: a pooled lending market with
//! LTV/liquidation-threshold enforcement and an exchange with settable
//! pair prices, a proportional fee, and deadline enforcement. Both are
//! fully deterministic so operation outcomes and rollbacks can be
//! asserted exactly.

use crate::capability::{ExchangeCapability, LendingCapability};
use crate::constants::precision::{BPS_DENOMINATOR, PRICE_ONE};
use crate::errors::{LevxError, LevxResult};
use crate::math::{health_factor_bps, mul_div, value_of};
use crate::types::{AccountData, Address, AssetId, RateMode};
use crate::Vec;

// ============================================================================
// Lending pool simulator
// ============================================================================

/// Per-account record inside the simulated pool
#[derive(Debug, Clone, Default)]
struct SimAccount {
    address: Address,
    supplied: Vec<(AssetId, u64)>,
    borrowed: Vec<(AssetId, u64)>,
}

impl SimAccount {
    fn amount_in(entries: &[(AssetId, u64)], asset: &AssetId) -> u64 {
        entries
            .iter()
            .find(|(a, _)| a == asset)
            .map(|(_, amount)| *amount)
            .unwrap_or(0)
    }

    fn add_to(entries: &mut Vec<(AssetId, u64)>, asset: AssetId, amount: u64) {
        match entries.iter_mut().find(|(a, _)| *a == asset) {
            Some((_, existing)) => *existing = existing.saturating_add(amount),
            None => entries.push((asset, amount)),
        }
    }

    fn remove_from(entries: &mut Vec<(AssetId, u64)>, asset: &AssetId, amount: u64) {
        if let Some((_, existing)) = entries.iter_mut().find(|(a, _)| a == asset) {
            *existing = existing.saturating_sub(amount);
        }
    }
}

/// Simulated pooled lending market.
///
/// Values every asset against its configured price (the quote asset is
/// the reference unit), enforces a single LTV bound on borrows and
/// withdrawals, and reports account data the way the live market would.
#[derive(Debug, Clone)]
pub struct SimLendingPool {
    quote_asset: AssetId,
    ltv_bps: u64,
    liquidation_threshold_bps: u64,
    prices: Vec<(AssetId, u64)>,
    reserves: Vec<(AssetId, u64)>,
    accounts: Vec<SimAccount>,
}

impl SimLendingPool {
    /// Create a pool with the given reference asset and risk parameters
    pub fn new(quote_asset: AssetId, ltv_bps: u64, liquidation_threshold_bps: u64) -> Self {
        Self {
            quote_asset,
            ltv_bps,
            liquidation_threshold_bps,
            prices: Vec::new(),
            reserves: Vec::new(),
            accounts: Vec::new(),
        }
    }

    /// Set an asset's price in quote units (8 decimals)
    pub fn set_asset_price(&mut self, asset: AssetId, price: u64) {
        match self.prices.iter_mut().find(|(a, _)| *a == asset) {
            Some((_, existing)) => *existing = price,
            None => self.prices.push((asset, price)),
        }
    }

    /// Seed lendable liquidity for an asset
    pub fn add_liquidity(&mut self, asset: AssetId, amount: u64) {
        SimAccount::add_to(&mut self.reserves, asset, amount);
    }

    /// Current lendable liquidity for an asset
    pub fn liquidity_of(&self, asset: &AssetId) -> u64 {
        SimAccount::amount_in(&self.reserves, asset)
    }

    /// Raw supplied amount for an account and asset
    pub fn supplied_of(&self, account: &Address, asset: &AssetId) -> u64 {
        self.find_account(account)
            .map(|acc| SimAccount::amount_in(&acc.supplied, asset))
            .unwrap_or(0)
    }

    /// Raw borrowed amount for an account and asset
    pub fn borrowed_of(&self, account: &Address, asset: &AssetId) -> u64 {
        self.find_account(account)
            .map(|acc| SimAccount::amount_in(&acc.borrowed, asset))
            .unwrap_or(0)
    }

    fn price_of(&self, asset: &AssetId) -> LevxResult<u64> {
        if asset == &self.quote_asset {
            return Ok(PRICE_ONE);
        }
        self.prices
            .iter()
            .find(|(a, _)| a == asset)
            .map(|(_, p)| *p)
            .ok_or(LevxError::UnknownAsset { asset: *asset })
    }

    fn find_account(&self, address: &Address) -> Option<&SimAccount> {
        self.accounts.iter().find(|a| &a.address == address)
    }

    fn account_mut(&mut self, address: Address) -> &mut SimAccount {
        if let Some(index) = self.accounts.iter().position(|a| a.address == address) {
            return &mut self.accounts[index];
        }
        self.accounts.push(SimAccount {
            address,
            ..Default::default()
        });
        let last = self.accounts.len() - 1;
        &mut self.accounts[last]
    }

    fn portfolio_value(&self, entries: &[(AssetId, u64)]) -> LevxResult<u64> {
        let mut total = 0u64;
        for (asset, amount) in entries {
            let price = self.price_of(asset)?;
            total = total.saturating_add(value_of(*amount, price)?);
        }
        Ok(total)
    }

    fn values_of(&self, address: &Address) -> LevxResult<(u64, u64)> {
        match self.find_account(address) {
            Some(account) => Ok((
                self.portfolio_value(&account.supplied)?,
                self.portfolio_value(&account.borrowed)?,
            )),
            None => Ok((0, 0)),
        }
    }
}

impl LendingCapability for SimLendingPool {
    fn supply(&mut self, asset: AssetId, amount: u64, on_behalf_of: Address) -> LevxResult<()> {
        if amount == 0 {
            return Err(LevxError::ZeroAmount);
        }
        self.price_of(&asset)?;

        SimAccount::add_to(&mut self.reserves, asset, amount);
        let account = self.account_mut(on_behalf_of);
        SimAccount::add_to(&mut account.supplied, asset, amount);
        Ok(())
    }

    fn borrow(
        &mut self,
        asset: AssetId,
        amount: u64,
        _rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> LevxResult<()> {
        if amount == 0 {
            return Err(LevxError::ZeroAmount);
        }
        let price = self.price_of(&asset)?;

        let available = self.liquidity_of(&asset);
        if available < amount {
            return Err(LevxError::LiquidityUnavailable {
                asset,
                requested: amount,
                available,
            });
        }

        let (collateral_value, debt_value) = self.values_of(&on_behalf_of)?;
        let new_debt_value = debt_value.saturating_add(value_of(amount, price)?);
        let borrow_limit = mul_div(collateral_value, self.ltv_bps, BPS_DENOMINATOR)?;
        if new_debt_value > borrow_limit {
            return Err(LevxError::InsufficientCollateral {
                required: new_debt_value,
                available: borrow_limit,
            });
        }

        SimAccount::remove_from(&mut self.reserves, &asset, amount);
        let account = self.account_mut(on_behalf_of);
        SimAccount::add_to(&mut account.borrowed, asset, amount);
        Ok(())
    }

    fn repay(
        &mut self,
        asset: AssetId,
        amount: u64,
        _rate_mode: RateMode,
        on_behalf_of: Address,
    ) -> LevxResult<u64> {
        if amount == 0 {
            return Err(LevxError::ZeroAmount);
        }
        self.price_of(&asset)?;

        let outstanding = self.borrowed_of(&on_behalf_of, &asset);
        let repaid = amount.min(outstanding);
        if repaid == 0 {
            return Ok(0);
        }

        SimAccount::add_to(&mut self.reserves, asset, repaid);
        let account = self.account_mut(on_behalf_of);
        SimAccount::remove_from(&mut account.borrowed, &asset, repaid);
        Ok(repaid)
    }

    fn withdraw(&mut self, asset: AssetId, amount: u64, to: Address) -> LevxResult<u64> {
        if amount == 0 {
            return Err(LevxError::ZeroAmount);
        }
        let price = self.price_of(&asset)?;

        let supplied = self.supplied_of(&to, &asset);
        if supplied < amount {
            return Err(LevxError::InsufficientBalance {
                available: supplied,
                requested: amount,
            });
        }

        // The remaining collateral must still cover the debt at the LTV
        // bound
        let (collateral_value, debt_value) = self.values_of(&to)?;
        let remaining_value = collateral_value.saturating_sub(value_of(amount, price)?);
        let borrow_limit = mul_div(remaining_value, self.ltv_bps, BPS_DENOMINATOR)?;
        if debt_value > borrow_limit {
            return Err(LevxError::InsufficientCollateral {
                required: debt_value,
                available: borrow_limit,
            });
        }

        SimAccount::remove_from(&mut self.reserves, &asset, amount);
        let account = self.account_mut(to);
        SimAccount::remove_from(&mut account.supplied, &asset, amount);
        Ok(amount)
    }

    fn account_data(&self, on_behalf_of: &Address) -> LevxResult<AccountData> {
        let (collateral_value, debt_value) = self.values_of(on_behalf_of)?;
        let borrow_limit = mul_div(collateral_value, self.ltv_bps, BPS_DENOMINATOR)?;

        Ok(AccountData {
            total_collateral_value: collateral_value,
            total_debt_value: debt_value,
            available_borrow_value: borrow_limit.saturating_sub(debt_value),
            liquidation_threshold_bps: self.liquidation_threshold_bps,
            health_factor_bps: health_factor_bps(
                collateral_value,
                debt_value,
                self.liquidation_threshold_bps,
            ),
        })
    }
}

// ============================================================================
// Exchange simulator
// ============================================================================

/// Simulated exchange with settable directed pair prices and a
/// proportional fee. Swaps settle at the configured price less the fee;
/// deadlines are checked against the simulator's block height.
#[derive(Debug, Clone)]
pub struct SimExchange {
    fee_bps: u64,
    block_height: u64,
    prices: Vec<(AssetId, AssetId, u64)>,
}

impl SimExchange {
    /// Create an exchange charging `fee_bps` per swap
    pub fn new(fee_bps: u64) -> Self {
        Self {
            fee_bps,
            block_height: 0,
            prices: Vec::new(),
        }
    }

    /// Set the pair price (units of `asset_out` with 8 decimals per unit
    /// of `asset_in`); the inverse direction is derived
    pub fn set_price(&mut self, asset_in: AssetId, asset_out: AssetId, price: u64) {
        let inverse = ((PRICE_ONE as u128) * (PRICE_ONE as u128) / price as u128) as u64;
        self.set_directed(asset_in, asset_out, price);
        self.set_directed(asset_out, asset_in, inverse);
    }

    /// Advance the simulator clock
    pub fn set_block_height(&mut self, block_height: u64) {
        self.block_height = block_height;
    }

    fn set_directed(&mut self, asset_in: AssetId, asset_out: AssetId, price: u64) {
        match self
            .prices
            .iter_mut()
            .find(|(a, b, _)| *a == asset_in && *b == asset_out)
        {
            Some((_, _, existing)) => *existing = price,
            None => self.prices.push((asset_in, asset_out, price)),
        }
    }

    fn price_of(&self, asset_in: &AssetId, asset_out: &AssetId) -> LevxResult<u64> {
        self.prices
            .iter()
            .find(|(a, b, _)| a == asset_in && b == asset_out)
            .map(|(_, _, p)| *p)
            .ok_or(LevxError::PriceUnavailable {
                asset_in: *asset_in,
                asset_out: *asset_out,
            })
    }

    fn check_deadline(&self, deadline: u64) -> LevxResult<()> {
        if deadline < self.block_height {
            return Err(LevxError::DeadlineExpired {
                deadline,
                current: self.block_height,
            });
        }
        Ok(())
    }
}

impl ExchangeCapability for SimExchange {
    fn swap_exact_in(
        &mut self,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: u64,
        min_amount_out: u64,
        _recipient: Address,
        deadline: u64,
    ) -> LevxResult<u64> {
        if amount_in == 0 {
            return Err(LevxError::ZeroAmount);
        }
        self.check_deadline(deadline)?;

        let amount_out = self.quote_exact_in(asset_in, asset_out, amount_in)?;
        if amount_out < min_amount_out {
            return Err(LevxError::SlippageExceeded {
                minimum: min_amount_out,
                actual: amount_out,
            });
        }
        Ok(amount_out)
    }

    fn swap_exact_out(
        &mut self,
        asset_in: AssetId,
        asset_out: AssetId,
        max_amount_in: u64,
        amount_out: u64,
        _recipient: Address,
        deadline: u64,
    ) -> LevxResult<u64> {
        if amount_out == 0 {
            return Err(LevxError::ZeroAmount);
        }
        self.check_deadline(deadline)?;

        let price = self.price_of(&asset_in, &asset_out)?;
        // Gross up for the fee, rounding against the caller
        let gross = (amount_out as u128)
            .checked_mul(PRICE_ONE as u128)
            .ok_or(LevxError::Overflow)?
            .div_ceil(price as u128);
        let keep_bps = (BPS_DENOMINATOR - self.fee_bps) as u128;
        let amount_in = gross
            .checked_mul(BPS_DENOMINATOR as u128)
            .ok_or(LevxError::Overflow)?
            .div_ceil(keep_bps);

        if amount_in > max_amount_in as u128 {
            return Err(LevxError::SlippageExceeded {
                minimum: max_amount_in,
                actual: amount_in.min(u64::MAX as u128) as u64,
            });
        }
        Ok(amount_in as u64)
    }

    fn quote_exact_in(
        &self,
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: u64,
    ) -> LevxResult<u64> {
        let price = self.price_of(&asset_in, &asset_out)?;
        let gross = mul_div(amount_in, price, PRICE_ONE)?;
        mul_div(gross, BPS_DENOMINATOR - self.fee_bps, BPS_DENOMINATOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ONE: u64 = 100_000_000;
    const PRICE: u64 = 1000 * ONE;

    fn weth() -> AssetId {
        [0xAAu8; 32]
    }

    fn dai() -> AssetId {
        [0xBBu8; 32]
    }

    fn account() -> Address {
        [0x99u8; 32]
    }

    fn pool() -> SimLendingPool {
        let mut pool = SimLendingPool::new(dai(), 8000, 8250);
        pool.set_asset_price(weth(), PRICE);
        pool.add_liquidity(dai(), 1_000_000 * ONE);
        pool
    }

    #[test]
    fn test_supply_borrow_account_data() {
        let mut pool = pool();

        pool.supply(weth(), ONE, account()).unwrap();
        pool.borrow(dai(), 500 * ONE, RateMode::Variable, account())
            .unwrap();

        let data = pool.account_data(&account()).unwrap();
        assert_eq!(data.total_collateral_value, 1000 * ONE);
        assert_eq!(data.total_debt_value, 500 * ONE);
        assert_eq!(data.available_borrow_value, 300 * ONE);
        // HF = 1000 * 0.825 / 500 = 1.65
        assert_eq!(data.health_factor_bps, 16_500);
    }

    #[test]
    fn test_borrow_beyond_ltv_rejected() {
        let mut pool = pool();
        pool.supply(weth(), ONE, account()).unwrap();

        let result = pool.borrow(dai(), 801 * ONE, RateMode::Variable, account());
        assert!(matches!(
            result,
            Err(LevxError::InsufficientCollateral { .. })
        ));

        // Exactly at the limit is allowed
        pool.borrow(dai(), 800 * ONE, RateMode::Variable, account())
            .unwrap();
    }

    #[test]
    fn test_borrow_beyond_pool_liquidity_rejected() {
        let mut pool = SimLendingPool::new(dai(), 8000, 8250);
        pool.set_asset_price(weth(), PRICE);
        pool.add_liquidity(dai(), 100 * ONE);
        pool.supply(weth(), ONE, account()).unwrap();

        let result = pool.borrow(dai(), 200 * ONE, RateMode::Variable, account());
        assert!(matches!(
            result,
            Err(LevxError::LiquidityUnavailable {
                available,
                ..
            }) if available == 100 * ONE
        ));
    }

    #[test]
    fn test_withdraw_respects_debt() {
        let mut pool = pool();
        pool.supply(weth(), ONE, account()).unwrap();
        pool.borrow(dai(), 400 * ONE, RateMode::Variable, account())
            .unwrap();

        // 400 debt pledges 0.5 WETH at 80% LTV; only 0.5 is free
        let result = pool.withdraw(weth(), 60_000_000, account());
        assert!(matches!(
            result,
            Err(LevxError::InsufficientCollateral { .. })
        ));

        pool.withdraw(weth(), 50_000_000, account()).unwrap();
    }

    #[test]
    fn test_repay_caps_at_outstanding() {
        let mut pool = pool();
        pool.supply(weth(), ONE, account()).unwrap();
        pool.borrow(dai(), 100 * ONE, RateMode::Variable, account())
            .unwrap();

        let repaid = pool
            .repay(dai(), 500 * ONE, RateMode::Variable, account())
            .unwrap();
        assert_eq!(repaid, 100 * ONE);
        assert_eq!(pool.borrowed_of(&account(), &dai()), 0);
    }

    #[test]
    fn test_exchange_swap_and_fee() {
        let mut exchange = SimExchange::new(30);
        exchange.set_price(weth(), dai(), PRICE);

        // 1 WETH -> 1000 DAI minus 0.3%
        let out = exchange
            .swap_exact_in(weth(), dai(), ONE, 0, account(), u64::MAX)
            .unwrap();
        assert_eq!(out, 997 * ONE);

        // Inverse direction derived from the pair price
        let back = exchange
            .swap_exact_in(dai(), weth(), 1000 * ONE, 0, account(), u64::MAX)
            .unwrap();
        assert_eq!(back, 99_700_000);
    }

    #[test]
    fn test_exchange_slippage_bound() {
        let mut exchange = SimExchange::new(30);
        exchange.set_price(weth(), dai(), PRICE);

        let result =
            exchange.swap_exact_in(weth(), dai(), ONE, 998 * ONE, account(), u64::MAX);
        assert!(matches!(
            result,
            Err(LevxError::SlippageExceeded {
                minimum,
                actual
            }) if minimum == 998 * ONE && actual == 997 * ONE
        ));
    }

    #[test]
    fn test_exchange_deadline() {
        let mut exchange = SimExchange::new(0);
        exchange.set_price(weth(), dai(), PRICE);
        exchange.set_block_height(100);

        let result = exchange.swap_exact_in(weth(), dai(), ONE, 0, account(), 99);
        assert!(matches!(
            result,
            Err(LevxError::DeadlineExpired {
                deadline: 99,
                current: 100
            })
        ));
    }

    #[test]
    fn test_exchange_exact_out() {
        let mut exchange = SimExchange::new(0);
        exchange.set_price(weth(), dai(), PRICE);

        let amount_in = exchange
            .swap_exact_out(weth(), dai(), ONE, 500 * ONE, account(), u64::MAX)
            .unwrap();
        assert_eq!(amount_in, 50_000_000);

        // Exceeding the input cap fails
        let result =
            exchange.swap_exact_out(weth(), dai(), 40_000_000, 500 * ONE, account(), u64::MAX);
        assert!(matches!(result, Err(LevxError::SlippageExceeded { .. })));
    }

    #[test]
    fn test_unknown_pair() {
        let exchange = SimExchange::new(0);
        let result = exchange.quote_exact_in(weth(), dai(), ONE);
        assert!(matches!(result, Err(LevxError::PriceUnavailable { .. })));
    }
}
