// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Accrue Protocol: Core Library
//!
//! Accrue is a deposit vault whose receipt token grows in value over time.
//! Balances are never pushed by a scheduler: each account stores a principal,
//! the rate it was funded at, and the instant it last touched the ledger.
//! Reads derive the current balance from those three numbers; writes first
//! fold the pending interest into principal ("materialization") and then
//! apply their change.
//!
//! ## Architecture
//!
//! - **config**: Fixed-point precision, default rate, token metadata, ports.
//! - **ledger**: Rate controller, accrual math, the accrual ledger itself,
//!   capability gate, clock and event log.
//! - **storage**: sled persistence for ledger state.
//!
//! ## Design Philosophy
//!
//! 1. Integer math only. Every multiplication is checked; overflow aborts the
//!    call instead of wrapping.
//! 2. Every mutation is all-or-nothing. Post-state is computed before a single
//!    field is written.
//! 3. The global rate only ever goes down.

pub mod config;
pub mod ledger;
pub mod storage;

pub use ledger::{
    AccessControl, AccountAccrual, AccountId, AccrualLedger, AmountRequest, Capability,
    CapabilityRegistry, Clock, LedgerError, LedgerEvent, ManualClock, Rate, RateController,
    SystemClock, Timestamp,
};
