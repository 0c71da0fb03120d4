//! # Accrual Math
//!
//! The whole value model in three lines:
//!
//! ```text
//! dt      = now - last_sync
//! factor  = PRECISION + personal_rate * dt
//! balance = principal * factor / PRECISION
//!         = principal + principal * personal_rate * dt / PRECISION
//! ```
//!
//! Growth is linear, not compounding, so materializing at arbitrary
//! intermediate instants lands within integer rounding of materializing once
//! at the end (for the rate and time ranges the ledger is meant for). That
//! matters because materialization happens whenever someone happens to call
//! in, not on a schedule.
//!
//! Balances and rates are `u128`. The interest product is taken in `U256`
//! so an 18-decimal principal can accrue at any realistic rate; only a
//! balance that no longer fits in `u128` is an overflow error, never a wrap.

use primitive_types::U256;
use serde::{Deserialize, Serialize};

use super::error::LedgerError;
use super::types::{Rate, Timestamp};
use crate::config::PRECISION;

/// `PRECISION + rate * dt`.
///
/// # Errors
///
/// [`LedgerError::ArithmeticOverflow`] if the factor leaves `u128`.
pub fn accrual_factor(rate: Rate, dt: u64) -> Result<u128, LedgerError> {
    rate.checked_mul(dt as u128)
        .and_then(|growth| growth.checked_add(PRECISION))
        .ok_or_else(|| LedgerError::overflow("accrual factor"))
}

/// `floor(principal * rate * dt / PRECISION)`, computed in 256 bits.
///
/// # Errors
///
/// [`LedgerError::ArithmeticOverflow`] if the interest itself leaves `u128`.
pub fn accrued_interest(principal: u128, rate: Rate, dt: u64) -> Result<u128, LedgerError> {
    let overflow = || LedgerError::overflow("accrued interest");
    let scaled = U256::from(principal)
        .checked_mul(U256::from(rate))
        .and_then(|p| p.checked_mul(U256::from(dt)))
        .ok_or_else(overflow)?;
    let interest = scaled / U256::from(PRECISION);
    if interest > U256::from(u128::MAX) {
        return Err(overflow());
    }
    Ok(interest.low_u128())
}

/// Derives the balance an account owns at `now`.
///
/// A `now` earlier than `last_sync` counts as zero elapsed time. For zero
/// elapsed time the result is exactly `principal`.
///
/// # Errors
///
/// [`LedgerError::ArithmeticOverflow`] if the resulting balance leaves `u128`.
pub fn accrued_balance(
    principal: u128,
    personal_rate: Rate,
    last_sync: Timestamp,
    now: Timestamp,
) -> Result<u128, LedgerError> {
    let dt = now.saturating_sub(last_sync);
    if dt == 0 || personal_rate == 0 || principal == 0 {
        return Ok(principal);
    }
    let interest = accrued_interest(principal, personal_rate, dt)?;
    principal
        .checked_add(interest)
        .ok_or_else(|| LedgerError::overflow("accrued balance"))
}

/// Per-account accrual record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAccrual {
    /// Value already recorded as owned, excluding unrealized interest.
    pub principal: u128,
    /// Rate snapshot taken at the last mint or rate inheritance.
    pub personal_rate: Rate,
    /// Instant of the last materialization.
    pub last_sync: Timestamp,
}

impl AccountAccrual {
    /// A fresh record funded at `rate` as of `now`.
    pub fn new(principal: u128, personal_rate: Rate, now: Timestamp) -> Self {
        Self {
            principal,
            personal_rate,
            last_sync: now,
        }
    }

    /// Current balance, principal plus unrealized interest.
    pub fn balance_at(&self, now: Timestamp) -> Result<u128, LedgerError> {
        accrued_balance(self.principal, self.personal_rate, self.last_sync, now)
    }

    /// Interest accrued since the last sync and not yet materialized.
    pub fn pending_interest(&self, now: Timestamp) -> Result<u128, LedgerError> {
        Ok(self.balance_at(now)? - self.principal)
    }

    /// Returns the record as it looks after materializing at `now`, and the
    /// interest that was folded into principal.
    ///
    /// Pure: `self` is untouched so callers can validate the whole operation
    /// before committing anything.
    pub fn materialized(&self, now: Timestamp) -> Result<(Self, u128), LedgerError> {
        let current = self.balance_at(now)?;
        let delta = current - self.principal;
        let synced = Self {
            principal: current,
            personal_rate: self.personal_rate,
            last_sync: self.last_sync.max(now),
        };
        Ok((synced, delta))
    }

    /// Returns `true` if nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.principal == 0
    }
}
