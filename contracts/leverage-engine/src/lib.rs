//! LevX Leverage Engine
//!
//! Issuance and redemption of leveraged position tokens.
//!
//! ## Core Operations
//!
//! - **Issue**: deposit principal, loop borrow -> swap -> deposit a fixed
//!   number of times, mint claim units proportional to the equity added
//! - **Redeem**: retire the caller's proportional debt share in
//!   headroom-bounded chunks, withdraw the proportional collateral share,
//!   pay out in the principal asset, burn the units
//!
//! ## Execution discipline
//!
//! Every operation runs under the position's operation lock and records
//! each external mutation on a compensating-action stack. A failure at
//! any step (slippage bound, health floor, lending-market rejection)
//! replays the stack in reverse so the lending market and exchange are
//! restored, and the position ledger is only committed after the full
//! external sequence has succeeded. Nested calls while the lock is held
//! fail with `OperationInProgress`.

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use levx_common::capability::{ExchangeCapability, LendingCapability};
use levx_common::config::PositionConfig;
use levx_common::constants::precision::{BPS_DENOMINATOR, PRICE_ONE};
use levx_common::constants::{
    leverage::EXTRA_UNWIND_CYCLES, limits::MAX_POSITION_EXPOSURE, swap::SWAP_DEADLINE_BLOCKS,
};
use levx_common::errors::{LevxError, LevxResult};
use levx_common::events::{EventLog, LevxEvent};
use levx_common::leverage::{
    collateral_units_for_value, collateral_value_of, retire_debt, run_leverage_loop,
    withdraw_headroom_value, LoopOutcome, LoopParams, TrancheRule, UnwindAction, UnwindStack,
};
use levx_common::math::{
    amount_for_value, leverage_series_bps, min_out_after_slippage, mul_div, proportional_share,
    safe_add, safe_sub, value_of,
};
use levx_common::token::REDEEM_ALL;
use levx_common::types::{
    derive_position_id, AccountData, Address, AssetId, LeveragedPosition, PositionSide,
};
use levx_common::validation::{
    ensure_nonzero, validate_config, validate_price, validate_principal, validate_slippage,
};

// ============================================================================
// Requests and results
// ============================================================================

/// Request to issue new position units against fresh principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct IssueRequest {
    /// Investor receiving the minted units
    pub investor: Address,
    /// Principal deposited, in quote units
    pub principal_amount: u64,
    /// Caller's expected price (quote per base, 8 decimals); anchors every
    /// slippage bound in the operation
    pub reference_price: u64,
    /// Minimum acceptable minted units
    pub min_units_out: u64,
    /// Per-swap slippage tolerance in BPS
    pub max_slippage_bps: u64,
    /// Current block height
    pub block_height: u64,
}

/// Result of a completed issuance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct IssueResult {
    /// Units minted to the investor
    pub units_minted: u64,
    /// Collateral added, native units
    pub collateral_added: u64,
    /// Debt drawn, native units
    pub debt_added: u64,
    /// Post-operation health factor in BPS
    pub health_factor_bps: u64,
}

/// Request to redeem position units for principal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RedeemRequest {
    /// Holder redeeming units
    pub investor: Address,
    /// Units to redeem; `REDEEM_ALL` means the holder's full balance
    pub units_in: u64,
    /// Minimum acceptable principal payout, in quote units
    pub min_out: u64,
    /// Per-swap slippage tolerance in BPS
    pub max_slippage_bps: u64,
    /// Current block height
    pub block_height: u64,
}

/// Result of a completed redemption
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct RedeemResult {
    /// Units burned from the holder
    pub units_burned: u64,
    /// Principal paid out, in quote units
    pub principal_out: u64,
    /// Collateral removed from the position, native units
    pub collateral_removed: u64,
    /// Debt repaid, native units
    pub debt_repaid: u64,
}

// ============================================================================
// Position construction
// ============================================================================

/// Create a new, empty leveraged position ledger with a derived id
pub fn new_position(
    manager: Address,
    side: PositionSide,
    base_asset: AssetId,
    quote_asset: AssetId,
    block_height: u64,
) -> LeveragedPosition {
    let id = derive_position_id(&manager, &base_asset, &quote_asset, side, block_height);
    LeveragedPosition::new(id, manager, side, base_asset, quote_asset, block_height)
}

// ============================================================================
// Lock discipline
// ============================================================================

fn acquire_lock(position: &mut LeveragedPosition) -> LevxResult<()> {
    if position.locked {
        return Err(LevxError::OperationInProgress);
    }
    position.locked = true;
    Ok(())
}

/// Unwind recorded steps and surface the original failure. Restoration is
/// best-effort: the deterministic capabilities accept every compensating
/// action that was recorded against them.
fn abort_with<L: LendingCapability, E: ExchangeCapability>(
    unwind: &mut UnwindStack,
    lender: &mut L,
    exchange: &mut E,
    account: Address,
    error: LevxError,
) -> LevxError {
    let _ = unwind.unwind(lender, exchange, account);
    error
}

fn loop_params(
    position: &LeveragedPosition,
    config: &PositionConfig,
    reference_price: u64,
    max_slippage_bps: u64,
    block_height: u64,
) -> LoopParams {
    LoopParams {
        side: position.side,
        collateral_asset: position.collateral_asset(),
        debt_asset: position.debt_asset(),
        reference_price,
        max_slippage_bps,
        borrow_factor_bps: config.amount_per_unit_collateral_bps,
        iterations: config.iterations,
        deadline: block_height.saturating_add(SWAP_DEADLINE_BLOCKS),
    }
}

/// Price implied by the exchange for one base unit, used where the caller
/// supplies no reference price (redemption, rebalancing)
pub fn implied_price<E: ExchangeCapability>(
    exchange: &E,
    base_asset: AssetId,
    quote_asset: AssetId,
) -> LevxResult<u64> {
    exchange.quote_exact_in(base_asset, quote_asset, PRICE_ONE)
}

// ============================================================================
// Issuance
// ============================================================================

/// Issue position units against `principal_amount` of the quote asset.
///
/// The whole loop is one atomic unit: on any failure the recorded
/// external steps are unwound and the ledger is untouched.
pub fn issue<L: LendingCapability, E: ExchangeCapability>(
    position: &mut LeveragedPosition,
    config: &PositionConfig,
    lender: &mut L,
    exchange: &mut E,
    request: &IssueRequest,
    events: &mut EventLog,
) -> LevxResult<IssueResult> {
    validate_principal(request.principal_amount)?;
    validate_price(request.reference_price)?;
    validate_slippage(request.max_slippage_bps)?;
    validate_config(config)?;
    check_exposure_cap(position, config, request)?;

    acquire_lock(position)?;
    let result = execute_issue(position, config, lender, exchange, request, events);
    position.locked = false;
    result
}

/// Reject issuance that would push collateral past the position ceiling.
/// Checked analytically before any external mutation.
fn check_exposure_cap(
    position: &LeveragedPosition,
    config: &PositionConfig,
    request: &IssueRequest,
) -> LevxResult<()> {
    let series_bps =
        leverage_series_bps(config.amount_per_unit_collateral_bps, config.iterations)?;
    let projected_value = apply_series(request.principal_amount, series_bps)?;
    let projected_units =
        collateral_units_for_value(projected_value, position.side, request.reference_price)?;
    let exposure = safe_add(position.collateral_amount, projected_units)?;

    if exposure > MAX_POSITION_EXPOSURE {
        return Err(LevxError::OverLeverageCap {
            exposure,
            cap: MAX_POSITION_EXPOSURE,
        });
    }
    Ok(())
}

fn apply_series(amount: u64, series_bps: u64) -> LevxResult<u64> {
    mul_div(amount, series_bps, BPS_DENOMINATOR)
}

fn execute_issue<L: LendingCapability, E: ExchangeCapability>(
    position: &mut LeveragedPosition,
    config: &PositionConfig,
    lender: &mut L,
    exchange: &mut E,
    request: &IssueRequest,
    events: &mut EventLog,
) -> LevxResult<IssueResult> {
    let account = position.id;
    let params = loop_params(
        position,
        config,
        request.reference_price,
        request.max_slippage_bps,
        request.block_height,
    );
    let before = lender.account_data(&account)?;
    let mut unwind = UnwindStack::new();

    let staged = stage_issue(
        position,
        lender,
        exchange,
        request,
        &params,
        &before,
        config.min_health_factor_bps,
        &mut unwind,
    );
    let staged = match staged {
        Ok(staged) => staged,
        Err(error) => {
            return Err(abort_with(&mut unwind, lender, exchange, account, error));
        }
    };

    // Commit: ledger and supply advance only after every external call
    // has succeeded
    position.collateral_amount = safe_add(position.collateral_amount, staged.collateral_added)?;
    position.debt_amount = safe_add(position.debt_amount, staged.debt_added)?;
    let new_total_supply = position.token.mint(request.investor, staged.units)?;

    events.emit(LevxEvent::TokenMint {
        position_id: account,
        to: request.investor,
        amount: staged.units,
        new_total_supply,
        block_height: request.block_height,
    });
    events.emit(LevxEvent::MarginChanged {
        position_id: account,
        delta_margin: staged.collateral_added as i64,
        delta_debt: staged.debt_added as i64,
        block_height: request.block_height,
    });
    events.emit(LevxEvent::Issued {
        position_id: account,
        investor: request.investor,
        units_minted: staged.units,
        principal_in: request.principal_amount,
        block_height: request.block_height,
    });

    Ok(IssueResult {
        units_minted: staged.units,
        collateral_added: staged.collateral_added,
        debt_added: staged.debt_added,
        health_factor_bps: staged.health_factor_bps,
    })
}

struct StagedIssue {
    units: u64,
    collateral_added: u64,
    debt_added: u64,
    health_factor_bps: u64,
}

#[allow(clippy::too_many_arguments)]
fn stage_issue<L: LendingCapability, E: ExchangeCapability>(
    position: &LeveragedPosition,
    lender: &mut L,
    exchange: &mut E,
    request: &IssueRequest,
    params: &LoopParams,
    before: &AccountData,
    min_health_factor_bps: u64,
    unwind: &mut UnwindStack,
) -> LevxResult<StagedIssue> {
    let account = position.id;

    // Initial tranche: long positions convert the quote principal into
    // the base asset first; short positions deposit it directly
    let tranche0 = match position.side {
        PositionSide::Long => {
            let expected = amount_for_value(request.principal_amount, request.reference_price)?;
            let min_out = min_out_after_slippage(expected, request.max_slippage_bps)?;
            let received = exchange.swap_exact_in(
                position.quote_asset,
                position.base_asset,
                request.principal_amount,
                min_out,
                account,
                params.deadline,
            )?;
            unwind.push(UnwindAction::SwapBack {
                asset_in: position.base_asset,
                asset_out: position.quote_asset,
                amount_in: received,
            });
            received
        }
        PositionSide::Short => request.principal_amount,
    };

    lender.supply(params.collateral_asset, tranche0, account)?;
    unwind.push(UnwindAction::Withdraw {
        asset: params.collateral_asset,
        amount: tranche0,
    });

    let tranche0_value = collateral_value_of(tranche0, position.side, request.reference_price)?;
    let outcome: LoopOutcome = run_leverage_loop(
        lender,
        exchange,
        account,
        params,
        TrancheRule::Geometric {
            initial_deposit_value: tranche0_value,
        },
        u64::MAX,
        unwind,
    )?;

    let collateral_added = safe_add(tranche0, outcome.collateral_added)?;
    let after = lender.account_data(&account)?;

    // First issuance mints raw exposure; later issuances scale by the
    // equity added so existing holders keep their claim value
    let units = if position.token.total_supply == 0 {
        collateral_added
    } else {
        let equity_added = safe_sub(after.equity_value(), before.equity_value())?;
        mul_div(
            position.token.total_supply,
            equity_added,
            before.equity_value(),
        )?
    };

    if units < request.min_units_out {
        return Err(LevxError::SlippageExceeded {
            minimum: request.min_units_out,
            actual: units,
        });
    }

    if after.health_factor_bps < min_health_factor_bps {
        return Err(LevxError::HealthFactorBelowMinimum {
            health_factor_bps: after.health_factor_bps,
            min_health_factor_bps,
        });
    }

    Ok(StagedIssue {
        units,
        collateral_added,
        debt_added: outcome.debt_added,
        health_factor_bps: after.health_factor_bps,
    })
}

// ============================================================================
// Redemption
// ============================================================================

/// Redeem `units_in` position units (or the caller's full balance for
/// `REDEEM_ALL`) for the principal asset.
pub fn redeem<L: LendingCapability, E: ExchangeCapability>(
    position: &mut LeveragedPosition,
    config: &PositionConfig,
    lender: &mut L,
    exchange: &mut E,
    request: &RedeemRequest,
    events: &mut EventLog,
) -> LevxResult<RedeemResult> {
    ensure_nonzero(request.units_in)?;
    validate_slippage(request.max_slippage_bps)?;
    validate_config(config)?;

    acquire_lock(position)?;
    let result = execute_redeem(position, config, lender, exchange, request, events);
    position.locked = false;
    result
}

fn execute_redeem<L: LendingCapability, E: ExchangeCapability>(
    position: &mut LeveragedPosition,
    config: &PositionConfig,
    lender: &mut L,
    exchange: &mut E,
    request: &RedeemRequest,
    events: &mut EventLog,
) -> LevxResult<RedeemResult> {
    let account = position.id;
    let balance = position.token.balance_of(&request.investor);
    let units = if request.units_in == REDEEM_ALL {
        balance
    } else {
        request.units_in
    };

    ensure_nonzero(units)?;
    if units > balance {
        return Err(LevxError::InsufficientBalance {
            available: balance,
            requested: units,
        });
    }

    let supply = position.token.total_supply;
    let collateral_share = proportional_share(position.collateral_amount, units, supply)?;
    let debt_share = proportional_share(position.debt_amount, units, supply)?;

    let reference_price =
        implied_price(exchange, position.base_asset, position.quote_asset)?;
    let params = loop_params(
        position,
        config,
        reference_price,
        request.max_slippage_bps,
        request.block_height,
    );

    let mut unwind = UnwindStack::new();
    let staged = stage_redeem(
        position,
        lender,
        exchange,
        request,
        &params,
        collateral_share,
        debt_share,
        config.iterations.saturating_add(EXTRA_UNWIND_CYCLES),
        &mut unwind,
    );
    let payout = match staged {
        Ok(payout) => payout,
        Err(error) => {
            return Err(abort_with(&mut unwind, lender, exchange, account, error));
        }
    };

    // Commit: burning the full supply drives the ledger to exactly zero
    // because the shares were resolved as the exact remaining amounts
    position.token.burn(&request.investor, units)?;
    position.collateral_amount = safe_sub(position.collateral_amount, collateral_share)?;
    position.debt_amount = safe_sub(position.debt_amount, debt_share)?;

    events.emit(LevxEvent::TokenBurn {
        position_id: account,
        from: request.investor,
        amount: units,
        new_total_supply: position.token.total_supply,
        block_height: request.block_height,
    });
    events.emit(LevxEvent::MarginChanged {
        position_id: account,
        delta_margin: -(collateral_share as i64),
        delta_debt: -(debt_share as i64),
        block_height: request.block_height,
    });
    events.emit(LevxEvent::Redeemed {
        position_id: account,
        investor: request.investor,
        units_burned: units,
        principal_out: payout,
        block_height: request.block_height,
    });

    Ok(RedeemResult {
        units_burned: units,
        principal_out: payout,
        collateral_removed: collateral_share,
        debt_repaid: debt_share,
    })
}

#[allow(clippy::too_many_arguments)]
fn stage_redeem<L: LendingCapability, E: ExchangeCapability>(
    position: &LeveragedPosition,
    lender: &mut L,
    exchange: &mut E,
    request: &RedeemRequest,
    params: &LoopParams,
    collateral_share: u64,
    debt_share: u64,
    max_cycles: u8,
    unwind: &mut UnwindStack,
) -> LevxResult<u64> {
    let account = position.id;

    // Retire the caller's debt share in headroom-bounded chunks
    let retire = if debt_share > 0 {
        retire_debt(
            lender,
            exchange,
            account,
            params,
            debt_share,
            request.max_slippage_bps,
            max_cycles,
            unwind,
        )?
    } else {
        Default::default()
    };

    // A redemption too large to unwind within the cycle cap fails whole;
    // the caller retries with smaller slices
    if retire.debt_repaid < debt_share {
        let data = lender.account_data(&account)?;
        return Err(LevxError::LiquidityUnavailable {
            asset: position.debt_asset(),
            requested: debt_share - retire.debt_repaid,
            available: withdraw_headroom_value(&data)?,
        });
    }

    // Withdraw whatever of the collateral share the repayment did not
    // consume
    let remaining_collateral = safe_sub(collateral_share, retire.collateral_spent)?;
    let mut payout: u64 = 0;

    if remaining_collateral > 0 {
        let withdrawn =
            lender.withdraw(params.collateral_asset, remaining_collateral, account)?;
        unwind.push(UnwindAction::Supply {
            asset: params.collateral_asset,
            amount: withdrawn,
        });

        match position.side {
            PositionSide::Long => {
                // Collateral is the base asset; settle into principal
                let expected = value_of(withdrawn, params.reference_price)?;
                let min_out = min_out_after_slippage(expected, request.max_slippage_bps)?;
                let received = exchange.swap_exact_in(
                    position.base_asset,
                    position.quote_asset,
                    withdrawn,
                    min_out,
                    account,
                    params.deadline,
                )?;
                unwind.push(UnwindAction::SwapBack {
                    asset_in: position.quote_asset,
                    asset_out: position.base_asset,
                    amount_in: received,
                });
                payout = safe_add(payout, received)?;
            }
            PositionSide::Short => {
                // Collateral already is the principal asset
                payout = safe_add(payout, withdrawn)?;
            }
        }
    }

    // Fold any debt-asset surplus from the final repayment chunk into
    // the payout
    if retire.leftover_debt_units > 0 {
        match position.side {
            PositionSide::Long => {
                // Debt asset is the quote asset
                payout = safe_add(payout, retire.leftover_debt_units)?;
            }
            PositionSide::Short => {
                let received = exchange.swap_exact_in(
                    position.base_asset,
                    position.quote_asset,
                    retire.leftover_debt_units,
                    0,
                    account,
                    params.deadline,
                )?;
                payout = safe_add(payout, received)?;
            }
        }
    }

    if payout < request.min_out {
        return Err(LevxError::SlippageExceeded {
            minimum: request.min_out,
            actual: payout,
        });
    }

    Ok(payout)
}
