//! Position Configuration Store
//!
//! Per-position leverage parameters with a global fallback. A position's
//! manager may override any subset of fields for that position; fields the
//! local override leaves unset resolve to the global configuration. The
//! global configuration itself is mutable only by the store admin.

use crate::constants::leverage;
use crate::errors::{LevxError, LevxResult};
use crate::events::{EventLog, LevxEvent};
use crate::types::{Address, LeveragedPosition, PositionId};
use crate::validation::validate_config;
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Resolved leverage parameters for one position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PositionConfig {
    /// Lending capability handle
    pub lender: Address,
    /// Exchange capability handle
    pub router: Address,
    /// Addresses-provider handle of the lending market
    pub addresses_provider: Address,
    /// Fraction of newly added collateral value that may be re-borrowed in
    /// the next loop iteration, in BPS (0 < f < 10000)
    pub amount_per_unit_collateral_bps: u64,
    /// Number of borrow/swap/deposit iterations per issuance
    pub iterations: u8,
    /// Post-operation health factor floor, in BPS (> 10000)
    pub min_health_factor_bps: u64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            lender: [0u8; 32],
            router: [0u8; 32],
            addresses_provider: [0u8; 32],
            amount_per_unit_collateral_bps: leverage::DEFAULT_BORROW_FACTOR_BPS,
            iterations: leverage::DEFAULT_ITERATIONS,
            min_health_factor_bps: leverage::DEFAULT_MIN_HEALTH_FACTOR_BPS,
        }
    }
}

impl PositionConfig {
    /// Lending capability handle
    pub fn lender(&self) -> Address {
        self.lender
    }

    /// Exchange capability handle
    pub fn router(&self) -> Address {
        self.router
    }

    /// Addresses-provider handle
    pub fn addresses_provider(&self) -> Address {
        self.addresses_provider
    }
}

/// Partial override: unset fields fall through to the global configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PartialConfig {
    pub lender: Option<Address>,
    pub router: Option<Address>,
    pub addresses_provider: Option<Address>,
    pub amount_per_unit_collateral_bps: Option<u64>,
    pub iterations: Option<u8>,
    pub min_health_factor_bps: Option<u64>,
}

impl PartialConfig {
    /// Apply this override on top of a base configuration
    pub fn merge_over(&self, base: &PositionConfig) -> PositionConfig {
        PositionConfig {
            lender: self.lender.unwrap_or(base.lender),
            router: self.router.unwrap_or(base.router),
            addresses_provider: self.addresses_provider.unwrap_or(base.addresses_provider),
            amount_per_unit_collateral_bps: self
                .amount_per_unit_collateral_bps
                .unwrap_or(base.amount_per_unit_collateral_bps),
            iterations: self.iterations.unwrap_or(base.iterations),
            min_health_factor_bps: self
                .min_health_factor_bps
                .unwrap_or(base.min_health_factor_bps),
        }
    }
}

/// Configuration store: global fallback plus per-position overrides
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct ConfigStore {
    /// Admin allowed to change the global fallback
    pub admin: Address,
    /// Fallback configuration for positions without a local override
    pub global: PositionConfig,
    /// Per-position overrides
    local: Vec<(PositionId, PartialConfig)>,
}

impl ConfigStore {
    /// Create a store with the given admin and global fallback
    pub fn new(admin: Address, global: PositionConfig) -> Self {
        Self {
            admin,
            global,
            local: Vec::new(),
        }
    }

    /// Replace the global fallback configuration. Admin only.
    pub fn set_global_config(
        &mut self,
        caller: Address,
        config: PositionConfig,
        events: &mut EventLog,
        block_height: u64,
    ) -> LevxResult<()> {
        if caller != self.admin {
            return Err(LevxError::Unauthorized {
                expected: self.admin,
                actual: caller,
            });
        }
        validate_config(&config)?;

        self.global = config;
        events.emit(LevxEvent::GlobalConfigUpdated {
            admin: caller,
            block_height,
        });
        Ok(())
    }

    /// Set a position's local override. Position manager only.
    pub fn set_config_for_token(
        &mut self,
        caller: Address,
        position: &LeveragedPosition,
        partial: PartialConfig,
        events: &mut EventLog,
        block_height: u64,
    ) -> LevxResult<()> {
        if caller != position.manager {
            return Err(LevxError::Unauthorized {
                expected: position.manager,
                actual: caller,
            });
        }
        // The merged result must be valid, not merely the override fields
        validate_config(&partial.merge_over(&self.global))?;

        match self.local.iter_mut().find(|(id, _)| id == &position.id) {
            Some((_, existing)) => *existing = partial,
            None => self.local.push((position.id, partial)),
        }

        events.emit(LevxEvent::ConfigUpdated {
            position_id: position.id,
            manager: caller,
            block_height,
        });
        Ok(())
    }

    /// Resolve the effective configuration for a position: local override
    /// fields win over global fields
    pub fn config_for(&self, position_id: &PositionId) -> PositionConfig {
        match self.local.iter().find(|(id, _)| id == position_id) {
            Some((_, partial)) => partial.merge_over(&self.global),
            None => self.global,
        }
    }

    /// True if a position has a local override
    pub fn has_local_config(&self, position_id: &PositionId) -> bool {
        self.local.iter().any(|(id, _)| id == position_id)
    }
}
