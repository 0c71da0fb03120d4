//! # Ledger Module: Linear Accrual Bookkeeping
//!
//! The ledger is where the receipt token lives. Every deposit, redemption
//! and transfer passes through [`AccrualLedger`], which owns the per-account
//! records, the allowance table, the event log and the [`RateController`].
//!
//! ## Architecture
//!
//! ```text
//! types.rs:           AccountId, Rate, Timestamp, AmountRequest
//! error.rs:           LedgerError
//! accrual.rs:         Pure balance derivation + per-account record
//! rate.rs:            Global rate, monotonic non-increasing
//! access.rs:          Capability gate (external collaborator seam)
//! clock.rs:           Time source seam (system / manual)
//! events.rs:          Ledger event log entries
//! accrual_ledger.rs:  mint / burn / transfer / transfer_from / balance_of
//! ```
//!
//! ## Design Principles
//!
//! 1. **Reads never write.** `balance_of` derives; only mutations materialize.
//! 2. **Materialize first.** Every mutation folds pending interest into
//!    principal for each account it touches before doing anything else.
//! 3. **Serializable state.** Records derive `Serialize`/`Deserialize` so the
//!    storage layer can persist them with bincode.

pub mod access;
pub mod accrual;
pub mod accrual_ledger;
pub mod clock;
pub mod error;
pub mod events;
pub mod rate;
pub mod types;

pub use access::{AccessControl, Capability, CapabilityRegistry};
pub use accrual::{accrual_factor, accrued_balance, accrued_interest, AccountAccrual};
pub use accrual_ledger::{AccrualLedger, LedgerCheckpoint, LedgerState, TokenMetadata};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::LedgerError;
pub use events::LedgerEvent;
pub use rate::RateController;
pub use types::{AccountId, AmountRequest, Rate, Timestamp};
