//! # Payout Rail
//!
//! The external value-transfer mechanism the vault sits on top of. Deposits
//! arrive through it and redemptions leave through it. The vault assumes
//! nothing about settlement beyond the `Result` a call returns.
//!
//! [`PayoutRail::pay`] receives a shared view of the ledger. By the time it
//! runs, the redeemed amount has already been burned, so anything the rail
//! calls back into observes the reduced balance.

use std::collections::HashMap;

use accrue_protocol::ledger::{AccountId, AccrualLedger};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a rail refused to move value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayoutError {
    /// The reserve cannot cover the payout.
    #[error("insufficient reserve: requested {requested}, available {available}")]
    InsufficientReserve {
        /// Amount the vault tried to pay.
        requested: u128,
        /// What the reserve holds.
        available: u128,
    },

    /// The rail is not accepting transfers.
    #[error("payout rail halted")]
    Halted,

    /// Accepting the value would overflow the reserve.
    #[error("reserve overflow: receiving {amount} would exceed u128::MAX")]
    ReserveOverflow {
        /// The amount that was being received.
        amount: u128,
    },
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// External value movement, as seen by the vault.
pub trait PayoutRail {
    /// Records `value` arriving from `from` as part of a deposit.
    fn receive(&mut self, from: &AccountId, value: u128) -> Result<(), PayoutError>;

    /// Sends `amount` to `to`. Called after the matching burn.
    fn pay(&mut self, to: &AccountId, amount: u128, ledger: &AccrualLedger)
        -> Result<(), PayoutError>;

    /// Value currently held by the rail on the vault's behalf.
    fn reserve(&self) -> u128;
}

// ---------------------------------------------------------------------------
// ReserveRail
// ---------------------------------------------------------------------------

/// In-memory rail backed by a single reserve balance.
///
/// Interest is paid out of the same reserve deposits flow into, so an
/// operator tops it up with [`fund_reserve`](Self::fund_reserve). A payout
/// the reserve cannot cover fails, and the vault rolls the burn back.
#[derive(Debug, Clone, Default)]
pub struct ReserveRail {
    reserve: u128,
    halted: bool,
    received: HashMap<AccountId, u128>,
    paid: HashMap<AccountId, u128>,
}

impl ReserveRail {
    /// Creates a rail holding `initial_reserve`.
    pub fn new(initial_reserve: u128) -> Self {
        Self {
            reserve: initial_reserve,
            ..Self::default()
        }
    }

    /// Adds yield-backing value to the reserve.
    pub fn fund_reserve(&mut self, amount: u128) -> Result<u128, PayoutError> {
        self.reserve = self
            .reserve
            .checked_add(amount)
            .ok_or(PayoutError::ReserveOverflow { amount })?;
        Ok(self.reserve)
    }

    /// Stops all payouts until [`resume`](Self::resume).
    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Re-enables payouts.
    pub fn resume(&mut self) {
        self.halted = false;
    }

    /// Returns `true` while halted.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Total value ever received from `account`.
    pub fn received_from(&self, account: &AccountId) -> u128 {
        self.received.get(account).copied().unwrap_or(0)
    }

    /// Total value ever paid to `account`.
    pub fn paid_to(&self, account: &AccountId) -> u128 {
        self.paid.get(account).copied().unwrap_or(0)
    }
}

impl PayoutRail for ReserveRail {
    fn receive(&mut self, from: &AccountId, value: u128) -> Result<(), PayoutError> {
        let reserve = self
            .reserve
            .checked_add(value)
            .ok_or(PayoutError::ReserveOverflow { amount: value })?;
        let received = self
            .received_from(from)
            .checked_add(value)
            .ok_or(PayoutError::ReserveOverflow { amount: value })?;
        self.reserve = reserve;
        self.received.insert(from.clone(), received);
        Ok(())
    }

    fn pay(
        &mut self,
        to: &AccountId,
        amount: u128,
        ledger: &AccrualLedger,
    ) -> Result<(), PayoutError> {
        if self.halted {
            return Err(PayoutError::Halted);
        }
        if amount > self.reserve {
            return Err(PayoutError::InsufficientReserve {
                requested: amount,
                available: self.reserve,
            });
        }
        self.reserve -= amount;
        *self.paid.entry(to.clone()).or_insert(0) += amount;

        tracing::debug!(
            to = %to,
            amount = %amount,
            remaining_balance = ?ledger.balance_of(to).ok(),
            reserve = %self.reserve,
            "payout settled"
        );
        Ok(())
    }

    fn reserve(&self) -> u128 {
        self.reserve
    }
}
