//! # Accrual Ledger
//!
//! Composes the [`RateController`] and per-account [`AccountAccrual`]
//! records into a fungible receipt token whose balances grow linearly.
//!
//! ## Operation shape
//!
//! Every mutation follows the same three steps:
//!
//! 1. **Plan.** Materialize each touched account into a local copy, resolve
//!    the requested amount, run every check and compute the new total supply
//!    with checked arithmetic. Nothing is written.
//! 2. **Commit.** Write records, supply and events in one go. Commit cannot
//!    fail.
//! 3. **Report.** Log and return.
//!
//! An error in step 1 leaves the ledger exactly as it was, event log
//! included.
//!
//! ## Rate inheritance
//!
//! A transfer recipient whose materialized principal is zero adopts the
//! sender's personal rate before value moves. A drained or brand-new account
//! therefore earns what its funder earned, not the current global rate.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::access::{AccessControl, Capability};
use super::accrual::AccountAccrual;
use super::clock::Clock;
use super::error::LedgerError;
use super::events::LedgerEvent;
use super::rate::{RateChange, RateController};
use super::types::{AccountId, AmountRequest, Rate, Timestamp};
use crate::config::{
    DEFAULT_TOKEN_DECIMALS, DEFAULT_TOKEN_NAME, DEFAULT_TOKEN_SYMBOL, UNLIMITED_ALLOWANCE,
};

// ---------------------------------------------------------------------------
// Metadata & persisted state
// ---------------------------------------------------------------------------

/// Display metadata of the receipt token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    /// Human-readable name.
    pub name: String,
    /// Ticker symbol.
    pub symbol: String,
    /// Display decimals. Arithmetic never uses this.
    pub decimals: u8,
}

impl Default for TokenMetadata {
    fn default() -> Self {
        Self {
            name: DEFAULT_TOKEN_NAME.to_string(),
            symbol: DEFAULT_TOKEN_SYMBOL.to_string(),
            decimals: DEFAULT_TOKEN_DECIMALS,
        }
    }
}

/// Everything the ledger needs to be rebuilt after a restart.
///
/// Ordered maps so that two exports of the same ledger compare equal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerState {
    pub address: AccountId,
    pub metadata: TokenMetadata,
    pub rate: Rate,
    pub rate_version: u64,
    pub total_supply: u128,
    pub accounts: BTreeMap<AccountId, AccountAccrual>,
    pub allowances: BTreeMap<(AccountId, AccountId), u128>,
}

/// A saved copy of one account, the total supply and the event-log length.
///
/// Only meaningful for rolling back steps that touched `account` alone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LedgerCheckpoint {
    account: AccountId,
    record: Option<AccountAccrual>,
    total_supply: u128,
    events_len: usize,
}

impl LedgerCheckpoint {
    /// The account this checkpoint covers.
    pub fn account(&self) -> &AccountId {
        &self.account
    }
}

// ---------------------------------------------------------------------------
// Transfer planning
// ---------------------------------------------------------------------------

/// Fully validated post-state of a transfer, ready to commit.
struct TransferPlan {
    from: AccountId,
    to: AccountId,
    from_record: AccountAccrual,
    from_delta: u128,
    /// `None` for a self-transfer.
    to_side: Option<(AccountAccrual, u128)>,
    inherited_rate: Option<Rate>,
    amount: u128,
    total_supply: u128,
    now: Timestamp,
}

// ---------------------------------------------------------------------------
// AccrualLedger
// ---------------------------------------------------------------------------

/// The receipt-token ledger.
///
/// Owns all mutable state: records, allowances, global rate, supply and the
/// event log. Time comes from the injected [`Clock`], authorization from the
/// injected [`AccessControl`].
pub struct AccrualLedger {
    address: AccountId,
    metadata: TokenMetadata,
    rate: RateController,
    accounts: HashMap<AccountId, AccountAccrual>,
    allowances: HashMap<(AccountId, AccountId), u128>,
    total_supply: u128,
    events: Vec<LedgerEvent>,
    clock: Arc<dyn Clock>,
    access: Arc<dyn AccessControl>,
}

impl fmt::Debug for AccrualLedger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccrualLedger")
            .field("address", &self.address)
            .field("rate", &self.rate)
            .field("accounts", &self.accounts.len())
            .field("total_supply", &self.total_supply)
            .finish_non_exhaustive()
    }
}

impl AccrualLedger {
    /// Creates an empty ledger at `initial_rate`.
    pub fn new(
        address: AccountId,
        initial_rate: Rate,
        clock: Arc<dyn Clock>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        Self {
            address,
            metadata: TokenMetadata::default(),
            rate: RateController::new(initial_rate),
            accounts: HashMap::new(),
            allowances: HashMap::new(),
            total_supply: 0,
            events: Vec::new(),
            clock,
            access,
        }
    }

    /// Replaces the token metadata.
    pub fn with_metadata(mut self, metadata: TokenMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Rebuilds a ledger from persisted state. The event log starts empty.
    pub fn from_state(
        state: LedgerState,
        clock: Arc<dyn Clock>,
        access: Arc<dyn AccessControl>,
    ) -> Self {
        Self {
            address: state.address,
            metadata: state.metadata,
            rate: RateController::from_parts(state.rate, state.rate_version),
            accounts: state.accounts.into_iter().collect(),
            allowances: state.allowances.into_iter().collect(),
            total_supply: state.total_supply,
            events: Vec::new(),
            clock,
            access,
        }
    }

    /// Snapshot of everything that must survive a restart.
    pub fn export_state(&self) -> LedgerState {
        LedgerState {
            address: self.address.clone(),
            metadata: self.metadata.clone(),
            rate: self.rate.rate(),
            rate_version: self.rate.version(),
            total_supply: self.total_supply,
            accounts: self
                .accounts
                .iter()
                .map(|(id, record)| (id.clone(), *record))
                .collect(),
            allowances: self
                .allowances
                .iter()
                .map(|(key, amount)| (key.clone(), *amount))
                .collect(),
        }
    }

    // -- Views --------------------------------------------------------------

    /// The ledger's own identifier.
    pub fn address(&self) -> &AccountId {
        &self.address
    }

    /// Token name.
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Token symbol.
    pub fn symbol(&self) -> &str {
        &self.metadata.symbol
    }

    /// Display decimals.
    pub fn decimals(&self) -> u8 {
        self.metadata.decimals
    }

    /// Current global rate.
    pub fn rate(&self) -> Rate {
        self.rate.rate()
    }

    /// Number of successful rate changes.
    pub fn rate_version(&self) -> u64 {
        self.rate.version()
    }

    /// Current time according to the ledger's clock.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Sum of recorded principals. Unmaterialized interest is not included.
    pub fn total_supply(&self) -> u128 {
        self.total_supply
    }

    /// Sum of every account's current balance, unmaterialized interest
    /// included.
    pub fn projected_total_supply(&self) -> Result<u128, LedgerError> {
        let now = self.clock.now();
        self.accounts.values().try_fold(0u128, |acc, record| {
            acc.checked_add(record.balance_at(now)?)
                .ok_or_else(|| LedgerError::overflow("projected supply"))
        })
    }

    /// Current balance of `account`. Pure view: nothing is materialized.
    /// Unknown accounts have a balance of zero.
    pub fn balance_of(&self, account: &AccountId) -> Result<u128, LedgerError> {
        match self.accounts.get(account) {
            Some(record) => record.balance_at(self.clock.now()),
            None => Ok(0),
        }
    }

    /// The raw record of `account`, if it was ever funded.
    pub fn account(&self, account: &AccountId) -> Option<AccountAccrual> {
        self.accounts.get(account).copied()
    }

    /// Number of known accounts, drained ones included.
    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    /// Delegated-transfer allowance of `spender` over `owner`'s funds.
    pub fn allowance(&self, owner: &AccountId, spender: &AccountId) -> u128 {
        self.allowances
            .get(&(owner.clone(), spender.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Events recorded since creation or the last [`take_events`](Self::take_events).
    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Drains the event log.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    // -- Rate ---------------------------------------------------------------

    /// Lowers (or re-sets) the global rate. Existing personal rates are not
    /// touched.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] without [`Capability::RateAdmin`];
    /// [`LedgerError::RateIncreaseRejected`] if `new` exceeds the current rate.
    pub fn set_rate(&mut self, caller: &AccountId, new: Rate) -> Result<(), LedgerError> {
        let result = self.rate.set_rate(self.access.as_ref(), caller, new);
        self.record_rate_change(caller, new, result)
    }

    /// Compare-and-set flavour of [`set_rate`](Self::set_rate).
    pub fn compare_and_set_rate(
        &mut self,
        caller: &AccountId,
        expected_version: u64,
        new: Rate,
    ) -> Result<(), LedgerError> {
        let result = self
            .rate
            .compare_and_set(self.access.as_ref(), caller, expected_version, new);
        self.record_rate_change(caller, new, result)
    }

    fn record_rate_change(
        &mut self,
        caller: &AccountId,
        requested: Rate,
        result: Result<RateChange, LedgerError>,
    ) -> Result<(), LedgerError> {
        match result {
            Ok(change) => {
                let at = self.clock.now();
                self.events.push(LedgerEvent::RateChanged {
                    previous: change.previous,
                    current: change.current,
                    version: change.version,
                    at,
                });
                tracing::info!(
                    caller = %caller,
                    previous = %change.previous,
                    current = %change.current,
                    version = change.version,
                    "global rate updated"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(caller = %caller, requested = %requested, error = %e, "rate change rejected");
                Err(e)
            }
        }
    }

    // -- Materialization ----------------------------------------------------

    /// Folds `account`'s pending interest into its principal. Anyone may
    /// call this; it never changes what the account owns, only where it is
    /// recorded. Returns the amount materialized. Unknown accounts are left
    /// alone.
    pub fn sync(&mut self, account: &AccountId) -> Result<u128, LedgerError> {
        let Some(record) = self.accounts.get(account).copied() else {
            return Ok(0);
        };
        let now = self.clock.now();
        let (synced, delta) = record.materialized(now)?;
        let total_supply = self
            .total_supply
            .checked_add(delta)
            .ok_or_else(|| LedgerError::overflow("total supply"))?;

        self.commit_sync(account, synced, delta, now);
        self.total_supply = total_supply;
        Ok(delta)
    }

    fn materialize_copy(
        &self,
        account: &AccountId,
        now: Timestamp,
    ) -> Result<(AccountAccrual, u128), LedgerError> {
        self.accounts
            .get(account)
            .copied()
            .unwrap_or_default()
            .materialized(now)
    }

    fn commit_sync(&mut self, account: &AccountId, record: AccountAccrual, delta: u128, now: Timestamp) {
        self.accounts.insert(account.clone(), record);
        if delta > 0 {
            self.events.push(LedgerEvent::InterestMaterialized {
                account: account.clone(),
                amount: delta,
                at: now,
            });
        }
    }

    // -- Mint / burn --------------------------------------------------------

    /// Credits `amount` to `account` at `rate_snapshot`.
    ///
    /// Pending interest is materialized under the account's old rate first;
    /// then the personal rate is overwritten for the whole balance.
    /// Returns the account's new principal.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] without [`Capability::MintBurn`];
    /// [`LedgerError::InvalidAccount`]; [`LedgerError::ArithmeticOverflow`].
    pub fn mint(
        &mut self,
        caller: &AccountId,
        account: &AccountId,
        amount: u128,
        rate_snapshot: Rate,
    ) -> Result<u128, LedgerError> {
        self.require(caller, Capability::MintBurn)?;
        ensure_valid(account)?;

        let now = self.clock.now();
        let (synced, delta) = self.materialize_copy(account, now)?;
        let mut funded = synced;
        funded.personal_rate = rate_snapshot;
        funded.principal = funded
            .principal
            .checked_add(amount)
            .ok_or_else(|| LedgerError::overflow("principal"))?;
        let total_supply = self
            .total_supply
            .checked_add(delta)
            .and_then(|supply| supply.checked_add(amount))
            .ok_or_else(|| LedgerError::overflow("total supply"))?;

        self.commit_sync(account, synced, delta, now);
        self.accounts.insert(account.clone(), funded);
        self.total_supply = total_supply;
        self.events.push(LedgerEvent::Transfer {
            from: None,
            to: Some(account.clone()),
            amount,
            at: now,
        });

        tracing::debug!(
            account = %account,
            amount = %amount,
            rate = %rate_snapshot,
            materialized = %delta,
            "minted"
        );
        Ok(funded.principal)
    }

    /// Debits `request` from `account`. Returns the amount burned.
    ///
    /// `AmountRequest::All` burns the full current balance.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] without [`Capability::MintBurn`];
    /// [`LedgerError::InsufficientBalance`] if the amount exceeds the
    /// materialized principal.
    pub fn burn(
        &mut self,
        caller: &AccountId,
        account: &AccountId,
        request: AmountRequest,
    ) -> Result<u128, LedgerError> {
        self.require(caller, Capability::MintBurn)?;
        ensure_valid(account)?;

        let now = self.clock.now();
        let (synced, delta) = self.materialize_copy(account, now)?;
        let amount = request.resolve(synced.principal);
        if amount > synced.principal {
            return Err(LedgerError::InsufficientBalance {
                account: account.clone(),
                available: synced.principal,
                requested: amount,
            });
        }
        let mut drained = synced;
        drained.principal -= amount;
        let total_supply = self
            .total_supply
            .checked_add(delta)
            .and_then(|supply| supply.checked_sub(amount))
            .ok_or_else(|| LedgerError::overflow("total supply"))?;

        self.commit_sync(account, synced, delta, now);
        self.accounts.insert(account.clone(), drained);
        self.total_supply = total_supply;
        self.events.push(LedgerEvent::Transfer {
            from: Some(account.clone()),
            to: None,
            amount,
            at: now,
        });

        tracing::debug!(account = %account, amount = %amount, materialized = %delta, "burned");
        Ok(amount)
    }

    // -- Transfers ----------------------------------------------------------

    /// Moves value from `from` to `to`. Returns the amount moved.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientBalance`], [`LedgerError::InvalidAccount`],
    /// [`LedgerError::ArithmeticOverflow`].
    pub fn transfer(
        &mut self,
        from: &AccountId,
        to: &AccountId,
        request: AmountRequest,
    ) -> Result<u128, LedgerError> {
        let plan = self.plan_transfer(from, to, request)?;
        Ok(self.commit_transfer(plan))
    }

    /// Moves value from `from` to `to` on behalf of `spender`, consuming
    /// allowance. An unlimited allowance is never decremented.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientAllowance`] plus everything
    /// [`transfer`](Self::transfer) returns.
    pub fn transfer_from(
        &mut self,
        spender: &AccountId,
        from: &AccountId,
        to: &AccountId,
        request: AmountRequest,
    ) -> Result<u128, LedgerError> {
        ensure_valid(spender)?;
        let plan = self.plan_transfer(from, to, request)?;

        let key = (from.clone(), spender.clone());
        let available = self.allowances.get(&key).copied().unwrap_or(0);
        if plan.amount > available {
            return Err(LedgerError::InsufficientAllowance {
                owner: from.clone(),
                spender: spender.clone(),
                available,
                requested: plan.amount,
            });
        }

        let amount = self.commit_transfer(plan);
        if available != UNLIMITED_ALLOWANCE {
            self.allowances.insert(key, available - amount);
        }
        Ok(amount)
    }

    fn plan_transfer(
        &self,
        from: &AccountId,
        to: &AccountId,
        request: AmountRequest,
    ) -> Result<TransferPlan, LedgerError> {
        ensure_valid(from)?;
        ensure_valid(to)?;

        let now = self.clock.now();
        let (mut from_record, from_delta) = self.materialize_copy(from, now)?;
        let amount = request.resolve(from_record.principal);
        if amount > from_record.principal {
            return Err(LedgerError::InsufficientBalance {
                account: from.clone(),
                available: from_record.principal,
                requested: amount,
            });
        }

        let mut total_supply = self
            .total_supply
            .checked_add(from_delta)
            .ok_or_else(|| LedgerError::overflow("total supply"))?;

        if from == to {
            return Ok(TransferPlan {
                from: from.clone(),
                to: to.clone(),
                from_record,
                from_delta,
                to_side: None,
                inherited_rate: None,
                amount,
                total_supply,
                now,
            });
        }

        let (mut to_record, to_delta) = self.materialize_copy(to, now)?;
        total_supply = total_supply
            .checked_add(to_delta)
            .ok_or_else(|| LedgerError::overflow("total supply"))?;

        let inherited_rate = if to_record.principal == 0 {
            to_record.personal_rate = from_record.personal_rate;
            Some(from_record.personal_rate)
        } else {
            None
        };

        from_record.principal -= amount;
        to_record.principal = to_record
            .principal
            .checked_add(amount)
            .ok_or_else(|| LedgerError::overflow("principal"))?;

        Ok(TransferPlan {
            from: from.clone(),
            to: to.clone(),
            from_record,
            from_delta,
            to_side: Some((to_record, to_delta)),
            inherited_rate,
            amount,
            total_supply,
            now,
        })
    }

    fn commit_transfer(&mut self, plan: TransferPlan) -> u128 {
        let TransferPlan {
            from,
            to,
            from_record,
            from_delta,
            to_side,
            inherited_rate,
            amount,
            total_supply,
            now,
        } = plan;

        // `from_record` already carries the debit; the sync event only needs
        // the delta.
        self.commit_sync(&from, from_record, from_delta, now);
        if let Some((to_record, to_delta)) = to_side {
            self.commit_sync(&to, to_record, to_delta, now);
            if let Some(rate) = inherited_rate {
                self.events.push(LedgerEvent::RateInherited {
                    account: to.clone(),
                    from: from.clone(),
                    rate,
                    at: now,
                });
            }
        }
        self.total_supply = total_supply;
        self.events.push(LedgerEvent::Transfer {
            from: Some(from.clone()),
            to: Some(to.clone()),
            amount,
            at: now,
        });

        tracing::debug!(
            from = %from,
            to = %to,
            amount = %amount,
            inherited_rate = ?inherited_rate,
            "transferred"
        );
        amount
    }

    // -- Allowances ---------------------------------------------------------

    /// Sets `spender`'s allowance over `owner`'s funds to exactly `amount`.
    pub fn approve(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        amount: u128,
    ) -> Result<(), LedgerError> {
        ensure_valid(owner)?;
        ensure_valid(spender)?;
        self.write_allowance(owner, spender, amount);
        Ok(())
    }

    /// Raises an allowance by `added`.
    pub fn increase_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        added: u128,
    ) -> Result<u128, LedgerError> {
        ensure_valid(owner)?;
        ensure_valid(spender)?;
        let updated = self
            .allowance(owner, spender)
            .checked_add(added)
            .ok_or_else(|| LedgerError::overflow("allowance"))?;
        self.write_allowance(owner, spender, updated);
        Ok(updated)
    }

    /// Lowers an allowance by `subtracted`.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InsufficientAllowance`] if it would go below zero.
    pub fn decrease_allowance(
        &mut self,
        owner: &AccountId,
        spender: &AccountId,
        subtracted: u128,
    ) -> Result<u128, LedgerError> {
        ensure_valid(owner)?;
        ensure_valid(spender)?;
        let available = self.allowance(owner, spender);
        let updated =
            available
                .checked_sub(subtracted)
                .ok_or_else(|| LedgerError::InsufficientAllowance {
                    owner: owner.clone(),
                    spender: spender.clone(),
                    available,
                    requested: subtracted,
                })?;
        self.write_allowance(owner, spender, updated);
        Ok(updated)
    }

    fn write_allowance(&mut self, owner: &AccountId, spender: &AccountId, amount: u128) {
        let key = (owner.clone(), spender.clone());
        if amount == 0 {
            self.allowances.remove(&key);
        } else {
            self.allowances.insert(key, amount);
        }
        self.events.push(LedgerEvent::Approval {
            owner: owner.clone(),
            spender: spender.clone(),
            amount,
            at: self.clock.now(),
        });
    }

    // -- Checkpoints --------------------------------------------------------

    /// Saves `account`'s record, the total supply and the event-log length.
    pub fn checkpoint(&self, account: &AccountId) -> LedgerCheckpoint {
        LedgerCheckpoint {
            account: account.clone(),
            record: self.accounts.get(account).copied(),
            total_supply: self.total_supply,
            events_len: self.events.len(),
        }
    }

    /// Rolls back to `checkpoint`. Only sound if nothing but the
    /// checkpointed account changed in between.
    pub fn restore(&mut self, checkpoint: LedgerCheckpoint) {
        match checkpoint.record {
            Some(record) => {
                self.accounts.insert(checkpoint.account, record);
            }
            None => {
                self.accounts.remove(&checkpoint.account);
            }
        }
        self.total_supply = checkpoint.total_supply;
        self.events.truncate(checkpoint.events_len);
    }

    /// Runs `step` and rolls `account` back if it fails.
    pub fn with_rollback<T, E>(
        &mut self,
        account: &AccountId,
        step: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let checkpoint = self.checkpoint(account);
        let result = step(self);
        if result.is_err() {
            tracing::debug!(account = %account, "rolling back to checkpoint");
            self.restore(checkpoint);
        }
        result
    }

    // -- Helpers ------------------------------------------------------------

    fn require(&self, caller: &AccountId, capability: Capability) -> Result<(), LedgerError> {
        if self.access.has_capability(caller, capability) {
            Ok(())
        } else {
            tracing::warn!(caller = %caller, capability = %capability, "unauthorized call");
            Err(LedgerError::Unauthorized {
                caller: caller.clone(),
                capability,
            })
        }
    }
}

fn ensure_valid(account: &AccountId) -> Result<(), LedgerError> {
    if account.is_valid() {
        Ok(())
    } else {
        Err(LedgerError::InvalidAccount)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
