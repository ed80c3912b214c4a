//! Execution target traits consumed by the exposure guard.
//!
//! The guard never moves value itself. Issuance credits a settlement ledger
//! and retirement either debits that ledger or unwinds through a conversion
//! vault. Both collaborators live outside this crate; hosts wire in real
//! implementations (contract bindings, RPC clients) behind these traits.
//!
//! Memory-backed doubles ([`MemoryLedger`], [`MemoryVault`]) ship with the
//! crate for tests and host integration checks.

use std::collections::HashMap;

use thiserror::Error;

use crate::types::Address;

/// Errors surfaced by an execution target.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TargetError {
    /// The target refused the operation (e.g. insufficient balance).
    #[error("execution target rejected the operation: {reason}")]
    Rejected {
        /// Why the target refused.
        reason: String,
    },

    /// The target could not be reached or did not confirm.
    #[error("execution target unavailable: {reason}")]
    Unavailable {
        /// Why the target could not be reached.
        reason: String,
    },
}

/// A balance ledger the guard credits on issuance and debits on retirement.
pub trait SettlementLedger {
    /// Credits `amount` units to `account`.
    fn credit(&mut self, account: Address, amount: u128) -> Result<(), TargetError>;

    /// Debits `amount` units from `account`.
    fn debit(&mut self, account: Address, amount: u128) -> Result<(), TargetError>;
}

/// A vault that unwinds wrapped value, reducing guard exposure.
pub trait ConversionVault {
    /// Burns/unwraps `amount` units out of the wrapped representation.
    fn convert_out(&mut self, amount: u128) -> Result<(), TargetError>;
}

/// In-memory [`SettlementLedger`] keeping per-account balances.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    balances: HashMap<Address, u128>,
    /// When set, every call fails with [`TargetError::Unavailable`].
    fail: bool,
}

impl MemoryLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the balance held by `account`.
    #[must_use]
    pub fn balance(&self, account: Address) -> u128 {
        self.balances.get(&account).copied().unwrap_or(0)
    }

    /// Makes every subsequent call fail, for exercising error paths.
    pub fn set_unavailable(&mut self, fail: bool) {
        self.fail = fail;
    }

    fn check_available(&self) -> Result<(), TargetError> {
        if self.fail {
            return Err(TargetError::Unavailable {
                reason: "ledger offline".to_string(),
            });
        }
        Ok(())
    }
}

impl SettlementLedger for MemoryLedger {
    fn credit(&mut self, account: Address, amount: u128) -> Result<(), TargetError> {
        self.check_available()?;
        let balance = self.balances.entry(account).or_insert(0);
        *balance = balance.saturating_add(amount);
        Ok(())
    }

    fn debit(&mut self, account: Address, amount: u128) -> Result<(), TargetError> {
        self.check_available()?;
        let balance = self.balances.entry(account).or_insert(0);
        if *balance < amount {
            return Err(TargetError::Rejected {
                reason: format!("balance {balance} below debit {amount}"),
            });
        }
        *balance -= amount;
        Ok(())
    }
}

/// In-memory [`ConversionVault`] tracking cumulative converted volume.
#[derive(Debug, Default)]
pub struct MemoryVault {
    converted: u128,
    fail: bool,
}

impl MemoryVault {
    /// Creates an empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total volume converted out so far.
    #[must_use]
    pub const fn converted(&self) -> u128 {
        self.converted
    }

    /// Makes every subsequent call fail, for exercising error paths.
    pub fn set_unavailable(&mut self, fail: bool) {
        self.fail = fail;
    }
}

impl ConversionVault for MemoryVault {
    fn convert_out(&mut self, amount: u128) -> Result<(), TargetError> {
        if self.fail {
            return Err(TargetError::Unavailable {
                reason: "vault offline".to_string(),
            });
        }
        self.converted = self.converted.saturating_add(amount);
        Ok(())
    }
}
