//! Protocol Constants
//!
//! All magic numbers and configuration defaults for the LevX protocol.
//! Leverage parameters follow the deterministic geometric-series model:
//! with borrow factor `f` and `n` loop iterations the target leverage is
//! `1 + f + f^2 + ... + f^n`.

/// Token Metadata
pub mod token {
    /// Token name
    pub const NAME: &str = "LevX Position Token";
    /// Token symbol
    pub const SYMBOL: &str = "LVX";
    /// Decimal places for position units and asset amounts
    pub const DECIMALS: u8 = 8;
    /// One unit with decimals (1 unit = 100_000_000 base units)
    pub const ONE: u64 = 100_000_000;
}

/// Fixed-point precision
pub mod precision {
    /// Basis points denominator (100% = 10_000)
    pub const BPS_DENOMINATOR: u64 = 10_000;

    /// Price precision: prices carry 8 decimals (quote units per base unit)
    pub const PRICE_ONE: u64 = 100_000_000;
}

/// Leverage-loop parameters
pub mod leverage {
    /// Default borrow factor: fraction of newly added collateral value that
    /// may be re-borrowed in the next loop iteration (0.8 = 8000 BPS)
    pub const DEFAULT_BORROW_FACTOR_BPS: u64 = 8_000;

    /// Default number of borrow/swap/deposit iterations per issuance
    pub const DEFAULT_ITERATIONS: u8 = 3;

    /// Hard cap on loop iterations for any single call
    pub const MAX_ITERATIONS: u8 = 10;

    /// Minimum accepted borrow factor (1% in BPS)
    pub const MIN_BORROW_FACTOR_BPS: u64 = 100;

    /// Maximum accepted borrow factor (must stay below 100%)
    pub const MAX_BORROW_FACTOR_BPS: u64 = 9_500;

    /// Default post-operation health factor floor (1.01 in BPS)
    pub const DEFAULT_MIN_HEALTH_FACTOR_BPS: u64 = 10_100;

    /// Leverage-ratio deviation tolerated before a rebalance acts (BPS on
    /// the ratio itself); also makes back-to-back rebalances no-ops
    pub const REBALANCE_TOLERANCE_BPS: u64 = 50;

    /// Extra unwind cycles allowed beyond the configured iteration count
    /// when retiring debt in headroom-bounded chunks
    pub const EXTRA_UNWIND_CYCLES: u8 = 2;

    /// Smallest loop tranche worth executing, in quote value units.
    /// Tranches below this are dust and terminate the loop early.
    pub const MIN_LOOP_VALUE: u64 = 1_000;
}

/// Swap parameters
pub mod swap {
    /// Default maximum slippage per swap (1% in BPS)
    pub const DEFAULT_MAX_SLIPPAGE_BPS: u64 = 100;

    /// Blocks between submission and exchange deadline
    pub const SWAP_DEADLINE_BLOCKS: u64 = 6;
}

/// Position-wide limits
pub mod limits {
    use super::token::ONE;

    /// Exposure ceiling per position, in collateral base units.
    /// Issuance that would push total collateral above this fails.
    pub const MAX_POSITION_EXPOSURE: u64 = 10_000_000 * ONE;

    /// Minimum principal per issuance (0.01 units)
    pub const MIN_ISSUE_AMOUNT: u64 = ONE / 100;
}
