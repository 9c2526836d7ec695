//! Position Token Ledger
//!
//! Fungible claim units for one leveraged position instance: holder
//! balances, total supply, and the mint/burn/transfer operations the
//! engine and external collaborators (the token factory, the streaming-fee
//! module) drive. A holder's debt share is never stored here; it is always
//! derived from balance and supply, so it follows transfers automatically.

use crate::errors::{LevxError, LevxResult};
use crate::types::Address;
use crate::Vec;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

/// Sentinel meaning "the caller's entire balance" in redemption requests
pub const REDEEM_ALL: u64 = u64::MAX;

/// Balance entry for one holder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct TokenBalance {
    /// Holder address
    pub holder: Address,
    /// Balance in position units
    pub balance: u64,
}

/// Supply and holder balances of one position token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PositionToken {
    /// Outstanding claim units
    pub total_supply: u64,
    /// Cumulative units minted
    pub total_minted: u64,
    /// Cumulative units burned
    pub total_burned: u64,
    /// Holder balances; entries with zero balance are removed
    balances: Vec<TokenBalance>,
}

impl PositionToken {
    /// Create an empty token ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of a holder (zero for unknown holders)
    pub fn balance_of(&self, holder: &Address) -> u64 {
        self.balances
            .iter()
            .find(|b| &b.holder == holder)
            .map(|b| b.balance)
            .unwrap_or(0)
    }

    /// All current holders with nonzero balances
    pub fn holders(&self) -> &[TokenBalance] {
        &self.balances
    }

    /// Number of distinct holders
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Mint units to a holder, growing supply
    pub fn mint(&mut self, to: Address, amount: u64) -> LevxResult<u64> {
        if amount == 0 {
            return Err(LevxError::ZeroAmount);
        }

        self.total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or(LevxError::Overflow)?;
        self.total_minted = self.total_minted.saturating_add(amount);
        self.credit(to, amount);

        Ok(self.total_supply)
    }

    /// Burn units from a holder, shrinking supply
    pub fn burn(&mut self, from: &Address, amount: u64) -> LevxResult<u64> {
        if amount == 0 {
            return Err(LevxError::ZeroAmount);
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(LevxError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        self.total_supply -= amount;
        self.total_burned = self.total_burned.saturating_add(amount);
        self.debit(from, amount);

        Ok(self.total_supply)
    }

    /// Move units between holders; supply unchanged
    pub fn transfer(&mut self, from: &Address, to: Address, amount: u64) -> LevxResult<()> {
        if amount == 0 {
            return Err(LevxError::ZeroAmount);
        }
        if from == &to {
            return Err(LevxError::InvalidParameter {
                param: "to",
                reason: "cannot transfer to self",
            });
        }

        let available = self.balance_of(from);
        if available < amount {
            return Err(LevxError::InsufficientBalance {
                available,
                requested: amount,
            });
        }

        self.debit(from, amount);
        self.credit(to, amount);
        Ok(())
    }

    fn credit(&mut self, holder: Address, amount: u64) {
        match self.balances.iter_mut().find(|b| b.holder == holder) {
            Some(entry) => entry.balance = entry.balance.saturating_add(amount),
            None => self.balances.push(TokenBalance {
                holder,
                balance: amount,
            }),
        }
    }

    fn debit(&mut self, holder: &Address, amount: u64) {
        if let Some(index) = self.balances.iter().position(|b| &b.holder == holder) {
            let entry = &mut self.balances[index];
            entry.balance = entry.balance.saturating_sub(amount);
            if entry.balance == 0 {
                self.balances.swap_remove(index);
            }
        }
    }
}
