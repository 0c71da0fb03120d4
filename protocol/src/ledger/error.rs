//! Error taxonomy for ledger operations.
//!
//! Every variant aborts the whole call. Nothing is retried inside the ledger
//! and no operation ever reports partial success.

use thiserror::Error;

use super::access::Capability;
use super::types::{AccountId, Rate};

/// Errors that can occur during ledger and rate operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// The rate setter asked for a value above the current global rate.
    #[error("rate increase rejected: current {current}, requested {requested}")]
    RateIncreaseRejected {
        /// Global rate at the time of the call.
        current: Rate,
        /// The rejected value.
        requested: Rate,
    },

    /// A compare-and-set rate update was based on an outdated version.
    #[error("stale rate version: expected {expected}, current {current}")]
    StaleRateVersion {
        /// Version the caller believed was current.
        expected: u64,
        /// Actual current version.
        current: u64,
    },

    /// The caller lacks the capability the operation is gated on.
    #[error("unauthorized: {caller} lacks capability {capability}")]
    Unauthorized {
        /// Who made the call.
        caller: AccountId,
        /// The capability that was required.
        capability: Capability,
    },

    /// The debited account does not hold enough materialized principal.
    #[error("insufficient balance for {account}: available {available}, requested {requested}")]
    InsufficientBalance {
        /// The account being debited.
        account: AccountId,
        /// Materialized principal at the time of the call.
        available: u128,
        /// The amount that was requested.
        requested: u128,
    },

    /// A delegated transfer or allowance decrease exceeds the approved amount.
    #[error(
        "insufficient allowance: {spender} may move {available} from {owner}, requested {requested}"
    )]
    InsufficientAllowance {
        /// Owner of the funds.
        owner: AccountId,
        /// The delegated spender.
        spender: AccountId,
        /// Current allowance.
        available: u128,
        /// The amount that was requested.
        requested: u128,
    },

    /// Accrual or amount arithmetic would leave the representable range.
    #[error("arithmetic overflow in {context}")]
    ArithmeticOverflow {
        /// Which computation overflowed.
        context: &'static str,
    },

    /// Account identifiers must be non-empty.
    #[error("invalid account identifier")]
    InvalidAccount,
}

impl LedgerError {
    /// Shorthand for [`LedgerError::ArithmeticOverflow`].
    pub(crate) fn overflow(context: &'static str) -> Self {
        LedgerError::ArithmeticOverflow { context }
    }
}
