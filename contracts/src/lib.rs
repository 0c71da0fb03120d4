//! # Accrue Contracts
//!
//! The deposit side of the protocol. The ledger in `accrue-protocol` knows
//! nothing about where value comes from; these contracts connect it to the
//! outside world:
//!
//! - **Vault**: accepts deposits, mints receipt tokens at the current global
//!   rate, and burns them again on redemption.
//! - **Payout Rail**: the external mechanism that actually moves value, with
//!   an in-memory reserve-backed implementation.
//!
//! ## Design Principles
//!
//! 1. Burn before pay. A rail only ever sees state in which the redeemed
//!    amount is already gone.
//! 2. A redemption that cannot be paid out is rolled back completely.
//! 3. All monetary arithmetic is checked.

pub mod payout;
pub mod vault;
