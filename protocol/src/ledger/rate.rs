//! # Global Rate Controller
//!
//! Holds the single protocol-wide rate new depositors are funded at. The
//! rate is a versioned scalar that can only move down: a proposal above the
//! current value is rejected and leaves both rate and version untouched.
//!
//! Existing accounts are unaffected by changes here. They keep the personal
//! rate they were funded at until their next mint.

use serde::{Deserialize, Serialize};

use super::access::{AccessControl, Capability};
use super::error::LedgerError;
use super::types::{AccountId, Rate};

/// The outcome of a successful rate change.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateChange {
    /// Rate before the change.
    pub previous: Rate,
    /// Rate after the change.
    pub current: Rate,
    /// Version after the change.
    pub version: u64,
}

/// Monotonic non-increasing global rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateController {
    rate: Rate,
    version: u64,
}

impl RateController {
    /// Starts at `initial` with version 0.
    pub fn new(initial: Rate) -> Self {
        Self {
            rate: initial,
            version: 0,
        }
    }

    /// Restores a controller from persisted state.
    pub fn from_parts(rate: Rate, version: u64) -> Self {
        Self { rate, version }
    }

    /// The current global rate.
    pub fn rate(&self) -> Rate {
        self.rate
    }

    /// Number of successful changes since creation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Replaces the rate with `new`.
    ///
    /// Equal values are accepted (the rule is non-increase) and still bump
    /// the version.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::Unauthorized`] if `caller` lacks [`Capability::RateAdmin`].
    /// - [`LedgerError::RateIncreaseRejected`] if `new` is above the current rate.
    pub fn set_rate(
        &mut self,
        access: &dyn AccessControl,
        caller: &AccountId,
        new: Rate,
    ) -> Result<RateChange, LedgerError> {
        if !access.has_capability(caller, Capability::RateAdmin) {
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                capability: Capability::RateAdmin,
            });
        }
        if new > self.rate {
            return Err(LedgerError::RateIncreaseRejected {
                current: self.rate,
                requested: new,
            });
        }
        let version = self
            .version
            .checked_add(1)
            .ok_or_else(|| LedgerError::overflow("rate version"))?;

        let previous = self.rate;
        self.rate = new;
        self.version = version;

        Ok(RateChange {
            previous,
            current: new,
            version,
        })
    }

    /// Like [`set_rate`](Self::set_rate), but only if nobody else changed the
    /// rate since the caller read `expected_version`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StaleRateVersion`] on a version mismatch, plus every
    /// error of [`set_rate`](Self::set_rate).
    pub fn compare_and_set(
        &mut self,
        access: &dyn AccessControl,
        caller: &AccountId,
        expected_version: u64,
        new: Rate,
    ) -> Result<RateChange, LedgerError> {
        if !access.has_capability(caller, Capability::RateAdmin) {
            return Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                capability: Capability::RateAdmin,
            });
        }
        if expected_version != self.version {
            return Err(LedgerError::StaleRateVersion {
                expected: expected_version,
                current: self.version,
            });
        }
        self.set_rate(access, caller, new)
    }
}
