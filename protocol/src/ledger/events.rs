//! Ledger event log entries.
//!
//! Mints and burns are reported as transfers from / to nobody, the usual
//! fungible-token convention.

use serde::Serialize;

use super::types::{AccountId, Rate, Timestamp};

/// Something observable that happened on the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// Value moved. `from: None` is a mint, `to: None` is a burn.
    Transfer {
        from: Option<AccountId>,
        to: Option<AccountId>,
        amount: u128,
        at: Timestamp,
    },
    /// A delegated-transfer allowance was set.
    Approval {
        owner: AccountId,
        spender: AccountId,
        amount: u128,
        at: Timestamp,
    },
    /// Accrued interest became principal.
    InterestMaterialized {
        account: AccountId,
        amount: u128,
        at: Timestamp,
    },
    /// A recipient adopted the sender's personal rate.
    RateInherited {
        account: AccountId,
        from: AccountId,
        rate: Rate,
        at: Timestamp,
    },
    /// The global rate was lowered (or re-set to the same value).
    RateChanged {
        previous: Rate,
        current: Rate,
        version: u64,
        at: Timestamp,
    },
}

impl LedgerEvent {
    /// When the event happened.
    pub fn at(&self) -> Timestamp {
        match self {
            LedgerEvent::Transfer { at, .. }
            | LedgerEvent::Approval { at, .. }
            | LedgerEvent::InterestMaterialized { at, .. }
            | LedgerEvent::RateInherited { at, .. }
            | LedgerEvent::RateChanged { at, .. } => *at,
        }
    }

    /// Returns `true` for mint, burn and transfer events.
    pub fn is_transfer(&self) -> bool {
        matches!(self, LedgerEvent::Transfer { .. })
    }
}
