//! # Storage Module
//!
//! Persistence for ledger state. The ledger itself is an in-memory value;
//! this module writes its [`LedgerState`](crate::ledger::LedgerState) export
//! to sled and reads it back on startup.
//!
//! ## Design Decisions
//!
//! 1. **One tree per concern.** Accounts, allowances and scalar metadata live
//!    in separate sled trees so each can be scanned independently.
//! 2. **Bincode for records, big-endian for scalars.** Compact and
//!    deterministic. JSON is for the API.
//! 3. **Whole-snapshot saves.** The node saves after every successful
//!    mutation; stale rows (e.g. cleared allowances) are deleted in the same
//!    batch.

pub mod db;

pub use db::{DbError, DbResult, LedgerDb};
