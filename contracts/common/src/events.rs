//! Protocol Events for LevX
//!
//! Events are collected during operation execution and can be indexed
//! off-chain for building UIs, analytics, and notifications. Every ledger
//! mutation emits a typed event; the `EventLog` is the observability
//! boundary of the engine.

use crate::types::{Address, PositionId};
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Event types for indexing and filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
#[borsh(use_discriminant = true)]
#[repr(u8)]
pub enum EventType {
    // Engine Events (0x01 - 0x1F)
    Issued = 0x01,
    Redeemed = 0x02,
    Rebalanced = 0x03,
    MarginChanged = 0x04,

    // Token Events (0x20 - 0x3F)
    TokenTransfer = 0x20,
    TokenMint = 0x21,
    TokenBurn = 0x22,

    // Configuration Events (0x40 - 0x5F)
    ConfigUpdated = 0x40,
    GlobalConfigUpdated = 0x41,
}

/// Main event enum containing all protocol events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub enum LevxEvent {
    // ============ Engine Events ============

    /// Emitted when an investor issues new position units
    Issued {
        position_id: PositionId,
        investor: Address,
        units_minted: u64,
        principal_in: u64,
        block_height: u64,
    },

    /// Emitted when an investor redeems position units
    Redeemed {
        position_id: PositionId,
        investor: Address,
        units_burned: u64,
        principal_out: u64,
        block_height: u64,
    },

    /// Emitted when a rebalance pass completes
    Rebalanced {
        position_id: PositionId,
        new_collateral: u64,
        new_debt: u64,
        block_height: u64,
    },

    /// Emitted on every collateral/debt ledger mutation
    MarginChanged {
        position_id: PositionId,
        delta_margin: i64,
        delta_debt: i64,
        block_height: u64,
    },

    // ============ Token Events ============

    /// Emitted when position units move between holders
    TokenTransfer {
        position_id: PositionId,
        from: Address,
        to: Address,
        amount: u64,
        block_height: u64,
    },

    /// Emitted when position units are minted
    TokenMint {
        position_id: PositionId,
        to: Address,
        amount: u64,
        new_total_supply: u64,
        block_height: u64,
    },

    /// Emitted when position units are burned
    TokenBurn {
        position_id: PositionId,
        from: Address,
        amount: u64,
        new_total_supply: u64,
        block_height: u64,
    },

    // ============ Configuration Events ============

    /// Emitted when a position's local configuration changes
    ConfigUpdated {
        position_id: PositionId,
        manager: Address,
        block_height: u64,
    },

    /// Emitted when the global fallback configuration changes
    GlobalConfigUpdated {
        admin: Address,
        block_height: u64,
    },
}

impl LevxEvent {
    /// Get the event type for filtering
    pub fn event_type(&self) -> EventType {
        match self {
            Self::Issued { .. } => EventType::Issued,
            Self::Redeemed { .. } => EventType::Redeemed,
            Self::Rebalanced { .. } => EventType::Rebalanced,
            Self::MarginChanged { .. } => EventType::MarginChanged,
            Self::TokenTransfer { .. } => EventType::TokenTransfer,
            Self::TokenMint { .. } => EventType::TokenMint,
            Self::TokenBurn { .. } => EventType::TokenBurn,
            Self::ConfigUpdated { .. } => EventType::ConfigUpdated,
            Self::GlobalConfigUpdated { .. } => EventType::GlobalConfigUpdated,
        }
    }

    /// Get the block height when the event occurred
    pub fn block_height(&self) -> u64 {
        match self {
            Self::Issued { block_height, .. } => *block_height,
            Self::Redeemed { block_height, .. } => *block_height,
            Self::Rebalanced { block_height, .. } => *block_height,
            Self::MarginChanged { block_height, .. } => *block_height,
            Self::TokenTransfer { block_height, .. } => *block_height,
            Self::TokenMint { block_height, .. } => *block_height,
            Self::TokenBurn { block_height, .. } => *block_height,
            Self::ConfigUpdated { block_height, .. } => *block_height,
            Self::GlobalConfigUpdated { block_height, .. } => *block_height,
        }
    }

    /// Serialize event to bytes for storage/transmission
    pub fn to_bytes(&self) -> Vec<u8> {
        borsh::to_vec(self).unwrap_or_default()
    }

    /// Deserialize event from bytes
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        borsh::from_slice(bytes).ok()
    }
}

/// Event log for collecting multiple events during execution
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<LevxEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Emit an event (add to log)
    pub fn emit(&mut self, event: LevxEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[LevxEvent] {
        &self.events
    }

    /// Take ownership of all events
    pub fn into_events(self) -> Vec<LevxEvent> {
        self.events
    }

    /// Filter events by type
    pub fn filter_by_type(&self, event_type: EventType) -> Vec<&LevxEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Check if any events were emitted
    pub fn has_events(&self) -> bool {
        !self.events.is_empty()
    }

    /// Get number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type() {
        let event = LevxEvent::Issued {
            position_id: [1u8; 32],
            investor: [2u8; 32],
            units_minted: 295_200_000,
            principal_in: 1000_00000000,
            block_height: 100,
        };

        assert_eq!(event.event_type(), EventType::Issued);
        assert_eq!(event.block_height(), 100);
    }

    #[test]
    fn test_event_serialization() {
        let event = LevxEvent::MarginChanged {
            position_id: [1u8; 32],
            delta_margin: 295_200_000,
            delta_debt: -1952_00000000,
            block_height: 200,
        };

        let bytes = event.to_bytes();
        let restored = LevxEvent::from_bytes(&bytes).unwrap();

        assert_eq!(event, restored);
    }

    #[test]
    fn test_event_log() {
        let mut log = EventLog::new();

        log.emit(LevxEvent::Issued {
            position_id: [1u8; 32],
            investor: [2u8; 32],
            units_minted: 295_200_000,
            principal_in: 1000_00000000,
            block_height: 100,
        });

        log.emit(LevxEvent::TokenMint {
            position_id: [1u8; 32],
            to: [2u8; 32],
            amount: 295_200_000,
            new_total_supply: 295_200_000,
            block_height: 100,
        });

        assert_eq!(log.len(), 2);
        assert!(log.has_events());

        let issued = log.filter_by_type(EventType::Issued);
        assert_eq!(issued.len(), 1);
    }
}
