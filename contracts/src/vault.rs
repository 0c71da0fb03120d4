//! # Vault Contract
//!
//! Thin adapter between external value and the accrual ledger:
//!
//! 1. **Deposit**: value arrives on the payout rail and the depositor is
//!    minted the same amount at the current global rate.
//! 2. **Redeem**: receipt tokens are burned and the same amount is paid
//!    out through the rail.
//!
//! Redemption is checks-effects-interactions: the burn is applied first,
//! then the rail is called. If the rail fails, the burn is rolled back so a
//! redeem either pays out or leaves no trace.

use accrue_protocol::ledger::{
    AccountId, AccrualLedger, AmountRequest, LedgerError, Rate,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::payout::{PayoutError, PayoutRail};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors that can occur during vault operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VaultError {
    /// The underlying ledger call failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// The rail did not confirm the redemption payout. The burn was undone.
    #[error("payout of {amount} to {account} failed: {source}")]
    PayoutFailed {
        /// The redeeming account.
        account: AccountId,
        /// Amount that could not be paid.
        amount: u128,
        /// What the rail reported.
        source: PayoutError,
    },

    /// The rail refused the incoming deposit. Nothing was minted.
    #[error("deposit of {value} from {account} rejected: {source}")]
    DepositRejected {
        /// The depositing account.
        account: AccountId,
        /// Value that was refused.
        value: u128,
        /// What the rail reported.
        source: PayoutError,
    },

    /// Zero-value deposits and redemptions are rejected.
    #[error("zero-amount operations are not permitted")]
    ZeroAmount,
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Vault-level record of a deposit or redemption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VaultEvent {
    /// Value came in and was minted.
    Deposited {
        receipt_id: Uuid,
        account: AccountId,
        value: u128,
        rate: Rate,
        at: DateTime<Utc>,
    },
    /// Receipt tokens were burned and paid out.
    Redeemed {
        receipt_id: Uuid,
        account: AccountId,
        amount: u128,
        at: DateTime<Utc>,
    },
}

impl VaultEvent {
    /// Unique id of this deposit or redemption.
    pub fn receipt_id(&self) -> Uuid {
        match self {
            VaultEvent::Deposited { receipt_id, .. } | VaultEvent::Redeemed { receipt_id, .. } => {
                *receipt_id
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// The deposit vault.
///
/// Owns the ledger and the rail. `address` is the identity the vault uses
/// when calling into the ledger; it must hold the mint/burn capability.
#[derive(Debug)]
pub struct Vault<R: PayoutRail> {
    address: AccountId,
    ledger: AccrualLedger,
    rail: R,
    events: Vec<VaultEvent>,
}

impl<R: PayoutRail> Vault<R> {
    /// Wraps `ledger` and `rail`.
    pub fn new(address: AccountId, ledger: AccrualLedger, rail: R) -> Self {
        Self {
            address,
            ledger,
            rail,
            events: Vec::new(),
        }
    }

    /// Deposits `value` for `caller` at the current global rate. Returns the
    /// caller's new balance.
    ///
    /// # Errors
    ///
    /// [`VaultError::ZeroAmount`], [`VaultError::DepositRejected`], or any
    /// ledger error from `mint`.
    pub fn deposit(&mut self, caller: &AccountId, value: u128) -> Result<u128, VaultError> {
        if value == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let rate = self.ledger.rate();
        let vault = self.address.clone();
        let rail = &mut self.rail;

        self.ledger
            .with_rollback(caller, |ledger| -> Result<(), VaultError> {
                ledger.mint(&vault, caller, value, rate)?;
                rail.receive(caller, value)
                    .map_err(|source| VaultError::DepositRejected {
                        account: caller.clone(),
                        value,
                        source,
                    })
            })
            .map_err(|e| {
                tracing::warn!(account = %caller, value = %value, error = %e, "deposit failed");
                e
            })?;

        let receipt_id = Uuid::new_v4();
        let at = self.timestamp();
        self.events.push(VaultEvent::Deposited {
            receipt_id,
            account: caller.clone(),
            value,
            rate,
            at,
        });
        tracing::info!(
            receipt = %receipt_id,
            account = %caller,
            value = %value,
            rate = %rate,
            "deposit accepted"
        );

        // The mint just materialized the account, so principal is the balance.
        Ok(self
            .ledger
            .account(caller)
            .map_or(value, |record| record.principal))
    }

    /// Burns `request` from `caller` and pays the same amount out. Returns
    /// the amount redeemed.
    ///
    /// # Errors
    ///
    /// [`VaultError::ZeroAmount`] if the request resolves to nothing,
    /// [`VaultError::PayoutFailed`] if the rail refuses (the burn is undone),
    /// or any ledger error from `burn`.
    pub fn redeem(
        &mut self,
        caller: &AccountId,
        request: AmountRequest,
    ) -> Result<u128, VaultError> {
        let amount = request.resolve(self.ledger.balance_of(caller)?);
        if amount == 0 {
            return Err(VaultError::ZeroAmount);
        }
        let vault = self.address.clone();
        let rail = &mut self.rail;

        self.ledger
            .with_rollback(caller, |ledger| -> Result<(), VaultError> {
                // Effects before interaction: the rail sees the burned state.
                ledger.burn(&vault, caller, AmountRequest::Exact(amount))?;
                rail.pay(caller, amount, ledger)
                    .map_err(|source| VaultError::PayoutFailed {
                        account: caller.clone(),
                        amount,
                        source,
                    })
            })
            .map_err(|e| {
                tracing::warn!(account = %caller, amount = %amount, error = %e, "redeem failed");
                e
            })?;

        let receipt_id = Uuid::new_v4();
        let at = self.timestamp();
        self.events.push(VaultEvent::Redeemed {
            receipt_id,
            account: caller.clone(),
            amount,
            at,
        });
        tracing::info!(receipt = %receipt_id, account = %caller, amount = %amount, "redeemed");

        Ok(amount)
    }

    /// Identifier of the ledger the vault mints into.
    pub fn ledger_address(&self) -> &AccountId {
        self.ledger.address()
    }

    /// The vault's own identity.
    pub fn address(&self) -> &AccountId {
        &self.address
    }

    /// Read access to the ledger.
    pub fn ledger(&self) -> &AccrualLedger {
        &self.ledger
    }

    /// Direct ledger access for user transfers and rate administration.
    pub fn ledger_mut(&mut self) -> &mut AccrualLedger {
        &mut self.ledger
    }

    /// Read access to the rail.
    pub fn rail(&self) -> &R {
        &self.rail
    }

    /// Mutable rail access, e.g. to top up the reserve.
    pub fn rail_mut(&mut self) -> &mut R {
        &mut self.rail
    }

    /// Deposits and redemptions recorded since the last drain.
    pub fn events(&self) -> &[VaultEvent] {
        &self.events
    }

    /// Drains the pending vault events.
    pub fn take_events(&mut self) -> Vec<VaultEvent> {
        std::mem::take(&mut self.events)
    }

    /// The ledger clock's current instant as a UTC timestamp.
    fn timestamp(&self) -> DateTime<Utc> {
        i64::try_from(self.ledger.now())
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use accrue_protocol::config::DEFAULT_INITIAL_RATE;
    use accrue_protocol::ledger::{Capability, CapabilityRegistry, ManualClock};

    use crate::payout::ReserveRail;

    fn vault(reserve: u128) -> (Vault<ReserveRail>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000));
        let registry = Arc::new(CapabilityRegistry::new());
        let address = AccountId::from("vault");
        registry.grant(&address, Capability::MintBurn);
        let ledger = AccrualLedger::new(
            AccountId::from("ledger"),
            DEFAULT_INITIAL_RATE,
            clock.clone(),
            registry,
        );
        (Vault::new(address, ledger, ReserveRail::new(reserve)), clock)
    }

    #[test]
    fn deposit_mints_and_records() {
        let (mut vault, _) = vault(0);
        let alice = AccountId::from("alice");

        let balance = vault.deposit(&alice, 100).unwrap();
        assert_eq!(balance, 100);
        assert_eq!(vault.rail().reserve(), 100);
        assert!(matches!(
            vault.events()[0],
            VaultEvent::Deposited { value: 100, rate: DEFAULT_INITIAL_RATE, .. }
        ));
    }

    #[test]
    fn zero_deposit_rejected() {
        let (mut vault, _) = vault(0);
        assert_eq!(
            vault.deposit(&AccountId::from("alice"), 0),
            Err(VaultError::ZeroAmount)
        );
    }

    #[test]
    fn redeem_pays_out() {
        let (mut vault, _) = vault(0);
        let alice = AccountId::from("alice");
        vault.deposit(&alice, 100).unwrap();

        let paid = vault.redeem(&alice, AmountRequest::Exact(40)).unwrap();
        assert_eq!(paid, 40);
        assert_eq!(vault.ledger().balance_of(&alice).unwrap(), 60);
        assert_eq!(vault.rail().paid_to(&alice), 40);
        assert_eq!(vault.events().len(), 2);
    }

    #[test]
    fn failed_payout_restores_balance() {
        let (mut vault, clock) = vault(0);
        let alice = AccountId::from("alice");
        vault.deposit(&alice, 100).unwrap();
        clock.advance(1_000_000);

        // Reserve holds 100, balance is 105.
        let err = vault.redeem(&alice, AmountRequest::All).unwrap_err();
        assert!(matches!(err, VaultError::PayoutFailed { amount: 105, .. }));
        assert_eq!(vault.ledger().balance_of(&alice).unwrap(), 105);
        assert_eq!(vault.ledger().account(&alice).unwrap().principal, 100);
        assert_eq!(vault.ledger().total_supply(), 100);
        assert_eq!(vault.events().len(), 1);
    }

    #[test]
    fn events_are_stamped_by_the_ledger_clock() {
        let (mut vault, clock) = vault(0);
        let alice = AccountId::from("alice");
        vault.deposit(&alice, 100).unwrap();
        clock.advance(3_600);
        vault.redeem(&alice, AmountRequest::Exact(10)).unwrap();

        let stamps: Vec<i64> = vault
            .events()
            .iter()
            .map(|event| match event {
                VaultEvent::Deposited { at, .. } | VaultEvent::Redeemed { at, .. } => {
                    at.timestamp()
                }
            })
            .collect();
        assert_eq!(stamps, vec![1_700_000_000, 1_700_003_600]);
    }

    #[test]
    fn take_events_drains() {
        let (mut vault, _) = vault(0);
        let alice = AccountId::from("alice");
        vault.deposit(&alice, 10).unwrap();
        vault.redeem(&alice, AmountRequest::Exact(5)).unwrap();

        let drained = vault.take_events();
        assert_eq!(drained.len(), 2);
        assert!(vault.events().is_empty());

        vault.deposit(&alice, 1).unwrap();
        assert_eq!(vault.take_events().len(), 1);
    }

    #[test]
    fn ledger_address_accessor() {
        let (vault, _) = vault(0);
        assert_eq!(vault.ledger_address(), &AccountId::from("ledger"));
        assert_eq!(vault.address(), &AccountId::from("vault"));
    }
}
