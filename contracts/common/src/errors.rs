//! Error Types for the LevX Protocol
//!
//! Typed errors covering every failure surface of the leverage engine,
//! the rebalancer, the configuration store, and the capability interfaces.
//! Every error aborts the enclosing operation as a unit; callers receive
//! the error kind with the amounts that produced it.

/// Result type alias for LevX operations
pub type LevxResult<T> = Result<T, LevxError>;

/// Main error enum for all LevX protocol errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LevxError {
    // ============ Amount Errors ============
    /// Zero amount not allowed
    ZeroAmount,

    /// Caller lacks funds or units to act on
    InsufficientBalance { available: u64, requested: u64 },

    // ============ Engine Errors ============
    /// Operation produced an amount outside the caller's declared bound
    SlippageExceeded { minimum: u64, actual: u64 },

    /// Post-operation safety floor breached
    HealthFactorBelowMinimum {
        health_factor_bps: u64,
        min_health_factor_bps: u64,
    },

    /// Issuance would exceed the position-wide exposure ceiling
    OverLeverageCap { exposure: u64, cap: u64 },

    /// Another operation on this position is still in flight
    OperationInProgress,

    /// Debt retirement could not complete within the unwind cycle cap;
    /// the caller must retry with a smaller amount
    LiquidityUnavailable {
        asset: [u8; 32],
        requested: u64,
        available: u64,
    },

    // ============ Authorization Errors ============
    /// Caller is not authorized for this operation
    Unauthorized { expected: [u8; 32], actual: [u8; 32] },

    // ============ Lending Errors ============
    /// Borrow or withdrawal would leave the account beyond its
    /// collateral limit
    InsufficientCollateral { required: u64, available: u64 },

    /// Account has no record with the lending market
    UnknownAccount { account: [u8; 32] },

    // ============ Exchange Errors ============
    /// Swap deadline elapsed before execution
    DeadlineExpired { deadline: u64, current: u64 },

    /// No price available for the requested pair
    PriceUnavailable {
        asset_in: [u8; 32],
        asset_out: [u8; 32],
    },

    /// Asset not known to the capability
    UnknownAsset { asset: [u8; 32] },

    // ============ Position Errors ============
    /// No position registered under this id
    UnknownPosition { position_id: [u8; 32] },

    // ============ Input Validation Errors ============
    /// Invalid input parameter
    InvalidParameter {
        param: &'static str,
        reason: &'static str,
    },

    // ============ Math Errors ============
    /// Arithmetic overflow occurred
    Overflow,

    /// Arithmetic underflow occurred
    Underflow,

    /// Division by zero
    DivisionByZero,
}

impl LevxError {
    /// Returns a stable error code for logging and indexing
    pub fn code(&self) -> &'static str {
        match self {
            Self::ZeroAmount => "E001_ZERO_AMOUNT",
            Self::InsufficientBalance { .. } => "E002_INSUFFICIENT_BALANCE",
            Self::SlippageExceeded { .. } => "E010_SLIPPAGE_EXCEEDED",
            Self::HealthFactorBelowMinimum { .. } => "E011_HEALTH_FACTOR",
            Self::OverLeverageCap { .. } => "E012_OVER_LEVERAGE_CAP",
            Self::OperationInProgress => "E013_OPERATION_IN_PROGRESS",
            Self::LiquidityUnavailable { .. } => "E014_LIQUIDITY_UNAVAILABLE",
            Self::Unauthorized { .. } => "E020_UNAUTHORIZED",
            Self::InsufficientCollateral { .. } => "E030_INSUFFICIENT_COLLATERAL",
            Self::UnknownAccount { .. } => "E031_UNKNOWN_ACCOUNT",
            Self::DeadlineExpired { .. } => "E040_DEADLINE_EXPIRED",
            Self::PriceUnavailable { .. } => "E041_PRICE_UNAVAILABLE",
            Self::UnknownAsset { .. } => "E042_UNKNOWN_ASSET",
            Self::UnknownPosition { .. } => "E050_UNKNOWN_POSITION",
            Self::InvalidParameter { .. } => "E090_INVALID_PARAM",
            Self::Overflow => "E080_OVERFLOW",
            Self::Underflow => "E081_UNDERFLOW",
            Self::DivisionByZero => "E082_DIV_ZERO",
        }
    }

    /// Returns true if the caller can recover by adjusting the request
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::InsufficientBalance { .. } => true, // Smaller amount
            Self::SlippageExceeded { .. } => true,    // Looser bound or retry
            Self::LiquidityUnavailable { .. } => true, // Smaller slices
            Self::OperationInProgress => true,        // Retry after completion
            Self::DeadlineExpired { .. } => true,     // Resubmit
            _ => false,
        }
    }
}
