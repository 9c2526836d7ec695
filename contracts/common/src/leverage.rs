//! Leverage Loop Machinery
//!
//! The borrow -> swap -> deposit loop that builds leveraged exposure, and
//! the chunked withdraw -> swap -> repay cycle that tears it down. Both are
//! shared by the issuance engine and the rebalancer and both record every
//! external mutation on an `UnwindStack`, so a failure at any step can
//! put the lending market and exchange back where they started before the
//! error is surfaced.
//!
//! Amount conventions: "value" is always quote units (8 decimals);
//! "units" are native units of whichever asset is named. Conversions use
//! the caller's reference price, which doubles as the slippage anchor.

use crate::capability::{ExchangeCapability, LendingCapability};
use crate::constants::leverage::MIN_LOOP_VALUE;
use crate::constants::precision::BPS_DENOMINATOR;
use crate::errors::LevxResult;
use crate::math::{amount_for_value, apply_bps, min_out_after_slippage, mul_div, value_of};
use crate::types::{AccountData, Address, AssetId, PositionSide, RateMode};
use crate::Vec;

// ============================================================================
// Unit conversions
// ============================================================================

/// Native debt-asset units worth `value` quote units
pub fn debt_units_for_value(
    value: u64,
    side: PositionSide,
    price: u64,
) -> LevxResult<u64> {
    match side {
        // Long positions borrow the quote asset
        PositionSide::Long => Ok(value),
        // Short positions borrow the base asset
        PositionSide::Short => amount_for_value(value, price),
    }
}

/// Native collateral-asset units worth `value` quote units
pub fn collateral_units_for_value(
    value: u64,
    side: PositionSide,
    price: u64,
) -> LevxResult<u64> {
    match side {
        PositionSide::Long => amount_for_value(value, price),
        PositionSide::Short => Ok(value),
    }
}

/// Quote value of `amount` native collateral units
pub fn collateral_value_of(
    amount: u64,
    side: PositionSide,
    price: u64,
) -> LevxResult<u64> {
    match side {
        PositionSide::Long => value_of(amount, price),
        PositionSide::Short => Ok(amount),
    }
}

/// Quote value of `amount` native debt units
pub fn debt_value_of(amount: u64, side: PositionSide, price: u64) -> LevxResult<u64> {
    match side {
        PositionSide::Long => Ok(amount),
        PositionSide::Short => value_of(amount, price),
    }
}

// ============================================================================
// Compensating-action stack
// ============================================================================

/// One recorded external mutation, stored as the action that undoes it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnwindAction {
    /// Undo a supply by withdrawing the same amount
    Withdraw { asset: AssetId, amount: u64 },
    /// Undo a withdrawal by re-supplying the same amount
    Supply { asset: AssetId, amount: u64 },
    /// Undo a repay by borrowing the same amount back
    Borrow { asset: AssetId, amount: u64 },
    /// Undo a borrow by repaying the same amount
    Repay { asset: AssetId, amount: u64 },
    /// Undo a swap by swapping the received amount back
    SwapBack {
        asset_in: AssetId,
        asset_out: AssetId,
        amount_in: u64,
    },
}

/// Compensating-action log for one operation.
///
/// Steps are pushed as they execute and replayed in reverse on failure.
/// The unwind itself runs unbounded (no slippage floor, no deadline):
/// its job is restoration, not price protection.
#[derive(Debug, Clone, Default)]
pub struct UnwindStack {
    actions: Vec<UnwindAction>,
}

impl UnwindStack {
    /// Create an empty stack
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed step
    pub fn push(&mut self, action: UnwindAction) {
        self.actions.push(action);
    }

    /// Number of recorded steps
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// True when nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Replay the recorded steps in reverse against the capabilities,
    /// draining the stack
    pub fn unwind<L: LendingCapability, E: ExchangeCapability>(
        &mut self,
        lender: &mut L,
        exchange: &mut E,
        account: Address,
    ) -> LevxResult<()> {
        while let Some(action) = self.actions.pop() {
            match action {
                UnwindAction::Withdraw { asset, amount } => {
                    lender.withdraw(asset, amount, account)?;
                }
                UnwindAction::Supply { asset, amount } => {
                    lender.supply(asset, amount, account)?;
                }
                UnwindAction::Borrow { asset, amount } => {
                    lender.borrow(asset, amount, RateMode::Variable, account)?;
                }
                UnwindAction::Repay { asset, amount } => {
                    lender.repay(asset, amount, RateMode::Variable, account)?;
                }
                UnwindAction::SwapBack {
                    asset_in,
                    asset_out,
                    amount_in,
                } => {
                    exchange.swap_exact_in(
                        asset_in, asset_out, amount_in, 0, account, u64::MAX,
                    )?;
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Loop execution
// ============================================================================

/// Parameters for one leverage-loop run
#[derive(Debug, Clone, Copy)]
pub struct LoopParams {
    /// Exposure direction (decides which asset is collateral)
    pub side: PositionSide,
    /// Collateral asset
    pub collateral_asset: AssetId,
    /// Debt asset
    pub debt_asset: AssetId,
    /// Reference price (quote per base, 8 decimals): slippage anchor and
    /// unit-conversion rate
    pub reference_price: u64,
    /// Per-swap slippage tolerance in BPS
    pub max_slippage_bps: u64,
    /// Borrow factor in BPS
    pub borrow_factor_bps: u64,
    /// Maximum loop iterations for this call
    pub iterations: u8,
    /// Exchange deadline for every swap in the run
    pub deadline: u64,
}

/// How each iteration sizes its borrow
#[derive(Debug, Clone, Copy)]
pub enum TrancheRule {
    /// Issuance: borrow `f x` the value of the previous deposit, starting
    /// from the initial principal deposit
    Geometric { initial_deposit_value: u64 },
    /// Rebalance: borrow whatever headroom allows, up to the remaining
    /// need
    Headroom,
}

/// Result of a leverage-loop run
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopOutcome {
    /// Collateral deposited across all iterations, native units
    pub collateral_added: u64,
    /// Debt drawn across all iterations, native units
    pub debt_added: u64,
    /// Value borrowed across all iterations, quote units
    pub value_borrowed: u64,
    /// Iterations actually executed
    pub tranches: u8,
}

/// Run bounded borrow -> swap -> deposit iterations for `account`.
///
/// `max_borrow_value` caps the total value drawn across the run (the
/// rebalancer passes its remaining need; issuance passes `u64::MAX`).
/// Every executed step is recorded on `unwind`.
pub fn run_leverage_loop<L: LendingCapability, E: ExchangeCapability>(
    lender: &mut L,
    exchange: &mut E,
    account: Address,
    params: &LoopParams,
    rule: TrancheRule,
    max_borrow_value: u64,
    unwind: &mut UnwindStack,
) -> LevxResult<LoopOutcome> {
    let mut outcome = LoopOutcome::default();
    let mut last_deposit_value = match rule {
        TrancheRule::Geometric {
            initial_deposit_value,
        } => initial_deposit_value,
        TrancheRule::Headroom => 0,
    };

    for _ in 0..params.iterations {
        let remaining_cap = max_borrow_value.saturating_sub(outcome.value_borrowed);
        let headroom = lender.account_data(&account)?.available_borrow_value;

        let mut borrow_value = match rule {
            TrancheRule::Geometric { .. } => {
                apply_bps(last_deposit_value, params.borrow_factor_bps)?
            }
            TrancheRule::Headroom => headroom,
        };
        borrow_value = borrow_value.min(remaining_cap).min(headroom);

        if borrow_value < MIN_LOOP_VALUE {
            break;
        }

        // Borrow the tranche
        let borrow_amount =
            debt_units_for_value(borrow_value, params.side, params.reference_price)?;
        lender.borrow(
            params.debt_asset,
            borrow_amount,
            RateMode::Variable,
            account,
        )?;
        unwind.push(UnwindAction::Repay {
            asset: params.debt_asset,
            amount: borrow_amount,
        });

        // Swap it into the collateral asset, bounded against the
        // reference price
        let expected_out =
            collateral_units_for_value(borrow_value, params.side, params.reference_price)?;
        let min_out = min_out_after_slippage(expected_out, params.max_slippage_bps)?;
        let received = exchange.swap_exact_in(
            params.debt_asset,
            params.collateral_asset,
            borrow_amount,
            min_out,
            account,
            params.deadline,
        )?;
        unwind.push(UnwindAction::SwapBack {
            asset_in: params.collateral_asset,
            asset_out: params.debt_asset,
            amount_in: received,
        });

        // Deposit the proceeds as additional collateral
        lender.supply(params.collateral_asset, received, account)?;
        unwind.push(UnwindAction::Withdraw {
            asset: params.collateral_asset,
            amount: received,
        });

        last_deposit_value =
            collateral_value_of(received, params.side, params.reference_price)?;
        outcome.collateral_added = outcome.collateral_added.saturating_add(received);
        outcome.debt_added = outcome.debt_added.saturating_add(borrow_amount);
        outcome.value_borrowed = outcome.value_borrowed.saturating_add(borrow_value);
        outcome.tranches += 1;
    }

    Ok(outcome)
}

// ============================================================================
// Chunked debt retirement
// ============================================================================

/// Result of a chunked debt-retirement run
#[derive(Debug, Clone, Copy, Default)]
pub struct RetireOutcome {
    /// Debt repaid, native debt units
    pub debt_repaid: u64,
    /// Collateral withdrawn and spent acquiring the debt asset, native
    /// collateral units
    pub collateral_spent: u64,
    /// Debt-asset units left over after the final repayment
    pub leftover_debt_units: u64,
    /// Cycles executed
    pub cycles: u8,
}

/// Collateral value withdrawable without breaching the borrow limit,
/// derived from the account report: keeping `debt <= ltv * collateral`
/// requires `withdrawn <= C - D * C / (available + D)`.
pub fn withdraw_headroom_value(data: &AccountData) -> LevxResult<u64> {
    if data.total_debt_value == 0 {
        return Ok(data.total_collateral_value);
    }
    let pledged = mul_div(
        data.total_debt_value,
        data.total_collateral_value,
        data
            .available_borrow_value
            .saturating_add(data.total_debt_value),
    )?;
    Ok(data.total_collateral_value.saturating_sub(pledged))
}

/// Retire up to `target_debt_amount` native debt units by repeatedly
/// withdrawing headroom-bounded collateral chunks, swapping them to the
/// debt asset, and repaying.
///
/// `margin_bps` grosses up the final chunk so swap costs cannot leave
/// the target short; any resulting surplus debt-asset units are returned
/// in the outcome (redemption folds them into the payout). The run stops
/// at the cycle cap or when the withdrawal headroom is exhausted; the
/// outcome reports how far it got, and the caller decides whether a
/// shortfall is an error (redemption) or acceptable partial progress
/// (rebalancing).
pub fn retire_debt<L: LendingCapability, E: ExchangeCapability>(
    lender: &mut L,
    exchange: &mut E,
    account: Address,
    params: &LoopParams,
    target_debt_amount: u64,
    margin_bps: u64,
    max_cycles: u8,
    unwind: &mut UnwindStack,
) -> LevxResult<RetireOutcome> {
    let mut outcome = RetireOutcome::default();

    while outcome.debt_repaid < target_debt_amount && outcome.cycles < max_cycles {
        let remaining = target_debt_amount - outcome.debt_repaid;
        let remaining_value =
            debt_value_of(remaining, params.side, params.reference_price)?;
        let need_value = mul_div(
            remaining_value,
            BPS_DENOMINATOR + margin_bps,
            BPS_DENOMINATOR,
        )?;

        let data = lender.account_data(&account)?;
        // Haircut the headroom by the slippage tolerance: the reference
        // price may sit below the lender's valuation by up to that much,
        // and the withdrawal must stay inside the LTV bound either way
        let headroom_value = apply_bps(
            withdraw_headroom_value(&data)?,
            BPS_DENOMINATOR - params.max_slippage_bps,
        )?;
        let chunk_value = need_value.min(headroom_value);
        if chunk_value < MIN_LOOP_VALUE {
            break;
        }

        // Withdraw the chunk
        let chunk_units =
            collateral_units_for_value(chunk_value, params.side, params.reference_price)?;
        let withdrawn = lender.withdraw(params.collateral_asset, chunk_units, account)?;
        unwind.push(UnwindAction::Supply {
            asset: params.collateral_asset,
            amount: withdrawn,
        });

        // Swap it into the debt asset
        let expected_out =
            debt_units_for_value(chunk_value, params.side, params.reference_price)?;
        let min_out = min_out_after_slippage(expected_out, params.max_slippage_bps)?;
        let received = exchange.swap_exact_in(
            params.collateral_asset,
            params.debt_asset,
            withdrawn,
            min_out,
            account,
            params.deadline,
        )?;
        unwind.push(UnwindAction::SwapBack {
            asset_in: params.debt_asset,
            asset_out: params.collateral_asset,
            amount_in: received,
        });

        // Repay, capped at the remaining target
        let repay_amount = received.min(remaining);
        let repaid = lender.repay(
            params.debt_asset,
            repay_amount,
            RateMode::Variable,
            account,
        )?;
        unwind.push(UnwindAction::Borrow {
            asset: params.debt_asset,
            amount: repaid,
        });

        outcome.debt_repaid = outcome.debt_repaid.saturating_add(repaid);
        outcome.collateral_spent = outcome.collateral_spent.saturating_add(withdrawn);
        outcome.leftover_debt_units = outcome
            .leftover_debt_units
            .saturating_add(received - repay_amount);
        outcome.cycles += 1;
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{SimExchange, SimLendingPool};

    const ONE: u64 = 100_000_000;
    const PRICE: u64 = 1000 * ONE; // 1000 quote per base

    fn weth() -> AssetId {
        [0xAAu8; 32]
    }

    fn dai() -> AssetId {
        [0xBBu8; 32]
    }

    fn account() -> Address {
        [0x99u8; 32]
    }

    fn setup() -> (SimLendingPool, SimExchange) {
        let mut lender = SimLendingPool::new(dai(), 8000, 8250);
        lender.set_asset_price(weth(), PRICE);
        lender.add_liquidity(dai(), 10_000_000 * ONE);
        lender.add_liquidity(weth(), 10_000 * ONE);

        let mut exchange = SimExchange::new(0);
        exchange.set_price(weth(), dai(), PRICE);
        (lender, exchange)
    }

    fn long_params(iterations: u8) -> LoopParams {
        LoopParams {
            side: PositionSide::Long,
            collateral_asset: weth(),
            debt_asset: dai(),
            reference_price: PRICE,
            max_slippage_bps: 100,
            borrow_factor_bps: 8000,
            iterations,
            deadline: u64::MAX,
        }
    }

    #[test]
    fn test_geometric_loop_tracks_series() {
        let (mut lender, mut exchange) = setup();
        let mut unwind = UnwindStack::new();

        // Seed the account with the initial 1 WETH deposit (1000 value)
        lender.supply(weth(), ONE, account()).unwrap();

        let outcome = run_leverage_loop(
            &mut lender,
            &mut exchange,
            account(),
            &long_params(3),
            TrancheRule::Geometric {
                initial_deposit_value: 1000 * ONE,
            },
            u64::MAX,
            &mut unwind,
        )
        .unwrap();

        // 0.8 + 0.64 + 0.512 WETH on top of the seed deposit
        assert_eq!(outcome.tranches, 3);
        assert_eq!(outcome.collateral_added, 195_200_000);
        assert_eq!(outcome.debt_added, 1952 * ONE);
        // Three steps per tranche recorded for rollback
        assert_eq!(unwind.len(), 9);

        let data = lender.account_data(&account()).unwrap();
        assert_eq!(data.total_collateral_value, 2952 * ONE);
        assert_eq!(data.total_debt_value, 1952 * ONE);
    }

    #[test]
    fn test_unwind_restores_lender_state() {
        let (mut lender, mut exchange) = setup();
        let mut unwind = UnwindStack::new();

        lender.supply(weth(), ONE, account()).unwrap();
        let before = lender.account_data(&account()).unwrap();

        run_leverage_loop(
            &mut lender,
            &mut exchange,
            account(),
            &long_params(3),
            TrancheRule::Geometric {
                initial_deposit_value: 1000 * ONE,
            },
            u64::MAX,
            &mut unwind,
        )
        .unwrap();

        unwind
            .unwind(&mut lender, &mut exchange, account())
            .unwrap();

        let after = lender.account_data(&account()).unwrap();
        assert_eq!(after.total_collateral_value, before.total_collateral_value);
        assert_eq!(after.total_debt_value, 0);
    }

    #[test]
    fn test_loop_respects_value_cap() {
        let (mut lender, mut exchange) = setup();
        let mut unwind = UnwindStack::new();

        lender.supply(weth(), ONE, account()).unwrap();

        let outcome = run_leverage_loop(
            &mut lender,
            &mut exchange,
            account(),
            &long_params(3),
            TrancheRule::Geometric {
                initial_deposit_value: 1000 * ONE,
            },
            900 * ONE, // cap below the first analytic tranche
            &mut unwind,
        )
        .unwrap();

        assert_eq!(outcome.value_borrowed, 900 * ONE);
        // 800 first tranche, then capped to the remaining 100
        assert_eq!(outcome.tranches, 2);
    }

    #[test]
    fn test_retire_debt_in_chunks() {
        let (mut lender, mut exchange) = setup();
        let mut unwind = UnwindStack::new();

        // Leveraged account: 2.952 WETH collateral, 1952 DAI debt
        lender.supply(weth(), 295_200_000, account()).unwrap();
        lender
            .borrow(dai(), 1952 * ONE, RateMode::Variable, account())
            .unwrap();

        let outcome = retire_debt(
            &mut lender,
            &mut exchange,
            account(),
            &long_params(3),
            1952 * ONE,
            100,
            5,
            &mut unwind,
        )
        .unwrap();

        // The headroom ladder grows geometrically; the 1952 target needs
        // several rungs but fits well inside the cycle cap
        assert!(outcome.cycles >= 3 && outcome.cycles <= 5);
        assert_eq!(outcome.debt_repaid, 1952 * ONE);

        let data = lender.account_data(&account()).unwrap();
        assert_eq!(data.total_debt_value, 0);
        // What was not spent acquiring the debt asset is still supplied
        assert!(data.total_collateral_value <= 1000 * ONE);
        assert!(data.total_collateral_value >= 999 * ONE);
    }

    #[test]
    fn test_retire_debt_cycle_cap_reports_partial() {
        let (mut lender, mut exchange) = setup();
        let mut unwind = UnwindStack::new();

        lender.supply(weth(), 295_200_000, account()).unwrap();
        lender
            .borrow(dai(), 1952 * ONE, RateMode::Variable, account())
            .unwrap();

        // Two cycles only reach the first rungs of the ladder; the
        // shortfall is reported, not swallowed
        let outcome = retire_debt(
            &mut lender,
            &mut exchange,
            account(),
            &long_params(3),
            1952 * ONE,
            100,
            2,
            &mut unwind,
        )
        .unwrap();

        assert_eq!(outcome.cycles, 2);
        assert!(outcome.debt_repaid >= 1100 * ONE && outcome.debt_repaid <= 1200 * ONE);

        let data = lender.account_data(&account()).unwrap();
        assert_eq!(
            data.total_debt_value,
            1952 * ONE - outcome.debt_repaid
        );
    }

    #[test]
    fn test_withdraw_headroom() {
        // C = 2952, D = 1952, ltv 0.8: headroom = 2952 - 1952/0.8 = 512
        let data = AccountData {
            total_collateral_value: 2952 * ONE,
            total_debt_value: 1952 * ONE,
            available_borrow_value: 2952 * ONE * 8 / 10 - 1952 * ONE,
            liquidation_threshold_bps: 8250,
            health_factor_bps: 12_477,
        };
        assert_eq!(withdraw_headroom_value(&data).unwrap(), 512 * ONE);

        // Debt-free account can withdraw everything
        let free = AccountData {
            total_debt_value: 0,
            ..data
        };
        assert_eq!(
            withdraw_headroom_value(&free).unwrap(),
            2952 * ONE
        );
    }
}
