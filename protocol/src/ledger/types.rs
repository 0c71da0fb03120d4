//! Primitive ledger types.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::LedgerError;

/// A fixed-point rate scaled by [`crate::config::PRECISION`]: value accrued
/// per second per unit of principal.
pub type Rate = u128;

/// Unix timestamp in whole seconds.
pub type Timestamp = u64;

/// Opaque, address-like account identifier.
///
/// The only structural rule is that it is non-empty; use
/// [`AccountId::parse`] when the value comes from outside the process.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    /// Validates and wraps an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidAccount`] for an empty or all-whitespace
    /// string.
    pub fn parse(raw: impl Into<String>) -> Result<Self, LedgerError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(LedgerError::InvalidAccount);
        }
        Ok(Self(raw))
    }

    /// Returns the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the identifier is structurally valid.
    pub fn is_valid(&self) -> bool {
        !self.0.trim().is_empty()
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    /// Unchecked conversion for literals. Operations still reject empty ids.
    fn from(raw: &str) -> Self {
        Self(raw.to_string())
    }
}

/// How much a burn, redeem or transfer should move.
///
/// `All` replaces the "maximum value means everything" sentinel: it resolves
/// to the account's current balance at the instant of the call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountRequest {
    /// Move exactly this many base units.
    Exact(u128),
    /// Move the full current balance.
    All,
}

impl AmountRequest {
    /// Resolves the request against a balance read at call time.
    pub fn resolve(self, current_balance: u128) -> u128 {
        match self {
            AmountRequest::Exact(amount) => amount,
            AmountRequest::All => current_balance,
        }
    }
}

impl From<u128> for AmountRequest {
    fn from(amount: u128) -> Self {
        AmountRequest::Exact(amount)
    }
}
