//! LevX Rebalancer
//!
//! Restores a position's leverage ratio to its configured target after
//! price movements.
//!
//! ## Behavior
//!
//! - **Price rose** (leverage below target): fresh borrow headroom exists;
//!   run bounded borrow -> swap -> deposit loops until the target is
//!   restored or the iteration cap is hit
//! - **Price fell** (leverage above target): withdraw headroom-bounded
//!   collateral chunks, swap to the debt asset, repay
//! - **At target**: no-op; a second call with no intervening price
//!   change executes zero loops
//!
//! Rebalancing is permissionless: it is a restoration of a documented
//! invariant, not a privileged action. It never changes token supply;
//! only the aggregate collateral and debt move, which scales every
//! holder's derived debt share and NAV proportionally. Like the engine
//! operations it runs under the position lock and unwinds completely on
//! failure.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use levx_common::capability::{ExchangeCapability, LendingCapability};
use levx_common::config::PositionConfig;
use levx_common::constants::leverage::{EXTRA_UNWIND_CYCLES, REBALANCE_TOLERANCE_BPS};
use levx_common::constants::precision::{BPS_DENOMINATOR, PRICE_ONE};
use levx_common::constants::swap::{DEFAULT_MAX_SLIPPAGE_BPS, SWAP_DEADLINE_BLOCKS};
use levx_common::errors::{LevxError, LevxResult};
use levx_common::events::{EventLog, LevxEvent};
use levx_common::leverage::{
    debt_units_for_value, retire_debt, run_leverage_loop, LoopParams, TrancheRule, UnwindAction,
    UnwindStack,
};
use levx_common::math::{current_leverage_bps, leverage_series_bps, mul_div, safe_add, safe_sub};
use levx_common::types::{AccountData, Address, LeveragedPosition, RateMode};
use levx_common::validation::validate_config;

// ============================================================================
// Types
// ============================================================================

/// Direction a rebalance pass moved the position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum RebalanceAction {
    /// Borrowed and deposited to raise leverage back to target
    ReLever,
    /// Withdrew and repaid to lower leverage back to target
    DeLever,
    /// Already within tolerance; nothing executed
    NoChange,
}

/// Result of a rebalance pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RebalanceResult {
    /// Direction taken
    pub action: RebalanceAction,
    /// Loop iterations / unwind cycles executed
    pub loops_executed: u8,
    /// Leverage ratio before the pass, BPS
    pub leverage_before_bps: u64,
    /// Leverage ratio after the pass, BPS
    pub leverage_after_bps: u64,
    /// Aggregate collateral after the pass, native units
    pub new_collateral: u64,
    /// Aggregate debt after the pass, native units
    pub new_debt: u64,
}

// ============================================================================
// Rebalancing
// ============================================================================

/// Restore `position` to its configured target leverage.
///
/// Callable by anyone; idempotent at the tolerance band; atomic with
/// full unwind on failure; leaves total supply untouched.
pub fn rebalance_position<L: LendingCapability, E: ExchangeCapability>(
    position: &mut LeveragedPosition,
    config: &PositionConfig,
    lender: &mut L,
    exchange: &mut E,
    block_height: u64,
    events: &mut EventLog,
) -> LevxResult<RebalanceResult> {
    validate_config(config)?;

    if position.locked {
        return Err(LevxError::OperationInProgress);
    }
    position.locked = true;
    let result = execute_rebalance(position, config, lender, exchange, block_height, events);
    position.locked = false;
    result
}

fn execute_rebalance<L: LendingCapability, E: ExchangeCapability>(
    position: &mut LeveragedPosition,
    config: &PositionConfig,
    lender: &mut L,
    exchange: &mut E,
    block_height: u64,
    events: &mut EventLog,
) -> LevxResult<RebalanceResult> {
    let account = position.id;
    let data = lender.account_data(&account)?;

    let current = current_leverage_bps(data.total_collateral_value, data.total_debt_value);
    let target =
        leverage_series_bps(config.amount_per_unit_collateral_bps, config.iterations)?;

    let no_change = RebalanceResult {
        action: RebalanceAction::NoChange,
        loops_executed: 0,
        leverage_before_bps: current,
        leverage_after_bps: current,
        new_collateral: position.collateral_amount,
        new_debt: position.debt_amount,
    };

    // Nothing to restore on an empty position
    if position.token.total_supply == 0 || data.total_collateral_value == 0 {
        return Ok(no_change);
    }

    // Within the tolerance band the pass is a no-op; this is what makes
    // back-to-back rebalances idempotent
    if current.abs_diff(target) <= REBALANCE_TOLERANCE_BPS {
        return Ok(no_change);
    }

    let reference_price =
        exchange.quote_exact_in(position.base_asset, position.quote_asset, PRICE_ONE)?;
    let params = LoopParams {
        side: position.side,
        collateral_asset: position.collateral_asset(),
        debt_asset: position.debt_asset(),
        reference_price,
        max_slippage_bps: DEFAULT_MAX_SLIPPAGE_BPS,
        borrow_factor_bps: config.amount_per_unit_collateral_bps,
        iterations: config.iterations,
        deadline: block_height.saturating_add(SWAP_DEADLINE_BLOCKS),
    };

    let mut unwind = UnwindStack::new();
    let staged = if current < target {
        stage_relever(lender, exchange, account, &params, &data, target, config, &mut unwind)
    } else {
        stage_delever(lender, exchange, account, &params, &data, target, &mut unwind)
    };

    let staged = match staged {
        Ok(staged) => staged,
        Err(error) => {
            let _ = unwind.unwind(lender, exchange, account);
            return Err(error);
        }
    };

    if staged.loops == 0 {
        return Ok(no_change);
    }

    // Commit ledger deltas; supply is untouched by design
    position.collateral_amount = if staged.collateral_delta >= 0 {
        safe_add(position.collateral_amount, staged.collateral_delta as u64)?
    } else {
        safe_sub(position.collateral_amount, staged.collateral_delta.unsigned_abs())?
    };
    position.debt_amount = if staged.debt_delta >= 0 {
        safe_add(position.debt_amount, staged.debt_delta as u64)?
    } else {
        safe_sub(position.debt_amount, staged.debt_delta.unsigned_abs())?
    };
    position.last_rebalance_height = block_height;

    events.emit(LevxEvent::MarginChanged {
        position_id: account,
        delta_margin: staged.collateral_delta,
        delta_debt: staged.debt_delta,
        block_height,
    });
    events.emit(LevxEvent::Rebalanced {
        position_id: account,
        new_collateral: position.collateral_amount,
        new_debt: position.debt_amount,
        block_height,
    });

    let after = lender.account_data(&account)?;
    Ok(RebalanceResult {
        action: staged.action,
        loops_executed: staged.loops,
        leverage_before_bps: current,
        leverage_after_bps: current_leverage_bps(
            after.total_collateral_value,
            after.total_debt_value,
        ),
        new_collateral: position.collateral_amount,
        new_debt: position.debt_amount,
    })
}

struct StagedRebalance {
    action: RebalanceAction,
    loops: u8,
    collateral_delta: i64,
    debt_delta: i64,
}

/// Price rose: borrow into the fresh headroom until the target ratio is
/// restored. The value still needed is `target * equity - collateral`.
#[allow(clippy::too_many_arguments)]
fn stage_relever<L: LendingCapability, E: ExchangeCapability>(
    lender: &mut L,
    exchange: &mut E,
    account: Address,
    params: &LoopParams,
    data: &AccountData,
    target_bps: u64,
    config: &PositionConfig,
    unwind: &mut UnwindStack,
) -> LevxResult<StagedRebalance> {
    let target_collateral_value = mul_div(data.equity_value(), target_bps, BPS_DENOMINATOR)?;
    let needed_value = target_collateral_value.saturating_sub(data.total_collateral_value);

    let outcome = run_leverage_loop(
        lender,
        exchange,
        account,
        params,
        TrancheRule::Headroom,
        needed_value,
        unwind,
    )?;

    // The pass must not trade leverage restoration for safety
    let after = lender.account_data(&account)?;
    if after.health_factor_bps < config.min_health_factor_bps {
        return Err(LevxError::HealthFactorBelowMinimum {
            health_factor_bps: after.health_factor_bps,
            min_health_factor_bps: config.min_health_factor_bps,
        });
    }

    Ok(StagedRebalance {
        action: RebalanceAction::ReLever,
        loops: outcome.tranches,
        collateral_delta: outcome.collateral_added as i64,
        debt_delta: outcome.debt_added as i64,
    })
}

/// Price fell: shed exposure. The value to repay is
/// `collateral - target * equity`; partial progress is acceptable: the
/// pass is permissionless and repeated calls converge.
fn stage_delever<L: LendingCapability, E: ExchangeCapability>(
    lender: &mut L,
    exchange: &mut E,
    account: Address,
    params: &LoopParams,
    data: &AccountData,
    target_bps: u64,
    unwind: &mut UnwindStack,
) -> LevxResult<StagedRebalance> {
    let target_collateral_value = mul_div(data.equity_value(), target_bps, BPS_DENOMINATOR)?;
    let excess_value = data
        .total_collateral_value
        .saturating_sub(target_collateral_value);
    let target_debt_amount =
        debt_units_for_value(excess_value, params.side, params.reference_price)?;

    let mut retire = retire_debt(
        lender,
        exchange,
        account,
        params,
        target_debt_amount,
        0,
        params.iterations.saturating_add(EXTRA_UNWIND_CYCLES),
        unwind,
    )?;

    // Any swap surplus goes straight into the debt as well
    if retire.leftover_debt_units > 0 {
        let repaid = lender.repay(
            params.debt_asset,
            retire.leftover_debt_units,
            RateMode::Variable,
            account,
        )?;
        unwind.push(UnwindAction::Borrow {
            asset: params.debt_asset,
            amount: repaid,
        });
        retire.debt_repaid = retire.debt_repaid.saturating_add(repaid);
        retire.leftover_debt_units = 0;
    }

    Ok(StagedRebalance {
        action: RebalanceAction::DeLever,
        loops: retire.cycles,
        collateral_delta: -(retire.collateral_spent as i64),
        debt_delta: -(retire.debt_repaid as i64),
    })
}
