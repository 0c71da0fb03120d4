//! # LedgerDb: Persistent Storage for Ledger State
//!
//! Built on sled's embedded key-value store.
//!
//! ## Tree Layout
//!
//! | Tree         | Key                              | Value                    |
//! |--------------|----------------------------------|--------------------------|
//! | `accounts`   | account id (UTF-8)               | `bincode(AccountAccrual)`|
//! | `allowances` | `bincode((owner, spender))`      | amount (16B BE)          |
//! | `metadata`   | key (UTF-8)                      | value (bytes)            |
//!
//! ## Atomicity
//!
//! Each tree is rewritten with a single `Batch`, and the metadata tree goes
//! last: a crash mid-save leaves the previous rate/supply in place next to
//! newer account rows, which the next successful save overwrites. The
//! database is flushed before `save` returns.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use sled::{Batch, Db, IVec, Tree};

use crate::ledger::{AccountAccrual, AccountId, LedgerState, TokenMetadata};

// ---------------------------------------------------------------------------
// Error Type
// ---------------------------------------------------------------------------

/// Errors that can occur during database operations.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("corrupt entry: {0}")]
    Corrupt(String),
}

pub type DbResult<T> = Result<T, DbError>;

// ---------------------------------------------------------------------------
// Metadata Keys
// ---------------------------------------------------------------------------

const META_ADDRESS: &[u8] = b"ledger_address";
const META_TOKEN: &[u8] = b"token_metadata";
const META_RATE: &[u8] = b"global_rate";
const META_RATE_VERSION: &[u8] = b"global_rate_version";
const META_TOTAL_SUPPLY: &[u8] = b"total_supply";
const META_RESERVE: &[u8] = b"rail_reserve";

// ---------------------------------------------------------------------------
// LedgerDb
// ---------------------------------------------------------------------------

/// sled-backed store for [`LedgerState`].
///
/// sled is thread-safe; `LedgerDb` can be shared via `Arc` without extra
/// locking. Callers still serialize saves so that two snapshots don't
/// interleave.
#[derive(Debug, Clone)]
pub struct LedgerDb {
    db: Db,
    accounts: Tree,
    allowances: Tree,
    metadata: Tree,
}

impl LedgerDb {
    /// Open or create a database at the given filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    /// Create a temporary database that is removed when dropped.
    pub fn open_temporary() -> DbResult<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config.open()?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> DbResult<Self> {
        let accounts = db.open_tree("accounts")?;
        let allowances = db.open_tree("allowances")?;
        let metadata = db.open_tree("metadata")?;
        Ok(Self {
            db,
            accounts,
            allowances,
            metadata,
        })
    }

    /// Returns `true` if no ledger has been saved yet.
    pub fn is_empty(&self) -> DbResult<bool> {
        Ok(self.metadata.get(META_ADDRESS)?.is_none())
    }

    /// Persists a full ledger snapshot.
    pub fn save(&self, state: &LedgerState) -> DbResult<()> {
        // -- accounts --
        let mut batch = Batch::default();
        let live: HashSet<&[u8]> = state
            .accounts
            .keys()
            .map(|id| id.as_str().as_bytes())
            .collect();
        for key in self.accounts.iter().keys() {
            let key = key?;
            let raw: &[u8] = &key;
            if !live.contains(raw) {
                batch.remove(key);
            }
        }
        for (id, record) in &state.accounts {
            batch.insert(id.as_str().as_bytes(), encode(record)?);
        }
        self.accounts.apply_batch(batch)?;

        // -- allowances --
        let mut batch = Batch::default();
        let mut live: HashSet<Vec<u8>> = HashSet::new();
        for ((owner, spender), amount) in &state.allowances {
            let key = encode(&(owner, spender))?;
            batch.insert(key.clone(), amount.to_be_bytes().to_vec());
            live.insert(key);
        }
        for key in self.allowances.iter().keys() {
            let key = key?;
            let raw: &[u8] = &key;
            if !live.contains(raw) {
                batch.remove(key);
            }
        }
        self.allowances.apply_batch(batch)?;

        // -- metadata --
        let mut batch = Batch::default();
        batch.insert(META_ADDRESS, state.address.as_str().as_bytes());
        batch.insert(META_TOKEN, encode(&state.metadata)?);
        batch.insert(META_RATE, state.rate.to_be_bytes().to_vec());
        batch.insert(META_RATE_VERSION, state.rate_version.to_be_bytes().to_vec());
        batch.insert(META_TOTAL_SUPPLY, state.total_supply.to_be_bytes().to_vec());
        self.metadata.apply_batch(batch)?;

        self.db.flush()?;
        tracing::debug!(
            accounts = state.accounts.len(),
            allowances = state.allowances.len(),
            "ledger state saved"
        );
        Ok(())
    }

    /// Loads the last saved snapshot, or `None` for a fresh database.
    pub fn load(&self) -> DbResult<Option<LedgerState>> {
        let Some(address) = self.metadata.get(META_ADDRESS)? else {
            return Ok(None);
        };
        let address = String::from_utf8(address.to_vec())
            .map_err(|e| DbError::Corrupt(format!("ledger address: {e}")))?;
        let address = AccountId::parse(address)
            .map_err(|e| DbError::Corrupt(format!("ledger address: {e}")))?;

        let metadata: TokenMetadata = decode(&self.require_meta(META_TOKEN)?)?;
        let rate = u128::from_be_bytes(fixed(&self.require_meta(META_RATE)?, "global rate")?);
        let rate_version =
            u64::from_be_bytes(fixed(&self.require_meta(META_RATE_VERSION)?, "rate version")?);
        let total_supply =
            u128::from_be_bytes(fixed(&self.require_meta(META_TOTAL_SUPPLY)?, "total supply")?);

        let mut accounts = BTreeMap::new();
        for entry in self.accounts.iter() {
            let (key, value) = entry?;
            let id = String::from_utf8(key.to_vec())
                .map_err(|e| DbError::Corrupt(format!("account key: {e}")))?;
            let record: AccountAccrual = decode(&value)?;
            accounts.insert(AccountId::from(id.as_str()), record);
        }

        let mut allowances = BTreeMap::new();
        for entry in self.allowances.iter() {
            let (key, value) = entry?;
            let pair: (AccountId, AccountId) = decode(&key)?;
            let amount = u128::from_be_bytes(fixed(&value, "allowance")?);
            allowances.insert(pair, amount);
        }

        Ok(Some(LedgerState {
            address,
            metadata,
            rate,
            rate_version,
            total_supply,
            accounts,
            allowances,
        }))
    }

    /// Records the payout reserve next to the ledger it backs.
    pub fn save_reserve(&self, reserve: u128) -> DbResult<()> {
        self.metadata
            .insert(META_RESERVE, reserve.to_be_bytes().to_vec())?;
        self.db.flush()?;
        Ok(())
    }

    /// The last saved payout reserve, if any.
    pub fn load_reserve(&self) -> DbResult<Option<u128>> {
        match self.metadata.get(META_RESERVE)? {
            Some(raw) => Ok(Some(u128::from_be_bytes(fixed(&raw, "reserve")?))),
            None => Ok(None),
        }
    }

    fn require_meta(&self, key: &[u8]) -> DbResult<IVec> {
        self.metadata.get(key)?.ok_or_else(|| {
            DbError::Corrupt(format!("missing metadata key {}", String::from_utf8_lossy(key)))
        })
    }
}

fn encode<T: serde::Serialize>(value: &T) -> DbResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| DbError::Serialization(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> DbResult<T> {
    bincode::deserialize(bytes).map_err(|e| DbError::Serialization(e.to_string()))
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> DbResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| DbError::Corrupt(format!("{what}: expected {N} bytes, got {}", bytes.len())))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_state() -> LedgerState {
        let mut accounts = BTreeMap::new();
        accounts.insert(AccountId::from("alice"), AccountAccrual::new(100, 50, 1_000));
        accounts.insert(AccountId::from("bob"), AccountAccrual::new(0, 40, 2_000));
        let mut allowances = BTreeMap::new();
        allowances.insert((AccountId::from("alice"), AccountId::from("carol")), 25);

        LedgerState {
            address: AccountId::from("ledger"),
            metadata: TokenMetadata::default(),
            rate: 40,
            rate_version: 3,
            total_supply: 100,
            accounts,
            allowances,
        }
    }

    #[test]
    fn fresh_database_is_empty() {
        let db = LedgerDb::open_temporary().unwrap();
        assert!(db.is_empty().unwrap());
        assert!(db.load().unwrap().is_none());
    }

    #[test]
    fn save_then_load() {
        let db = LedgerDb::open_temporary().unwrap();
        let state = sample_state();
        db.save(&state).unwrap();

        assert!(!db.is_empty().unwrap());
        assert_eq!(db.load().unwrap(), Some(state));
    }

    #[test]
    fn removed_allowances_are_deleted() {
        let db = LedgerDb::open_temporary().unwrap();
        let mut state = sample_state();
        db.save(&state).unwrap();

        state.allowances.clear();
        state.total_supply = 90;
        db.save(&state).unwrap();

        let loaded = db.load().unwrap().unwrap();
        assert!(loaded.allowances.is_empty());
        assert_eq!(loaded.total_supply, 90);
    }

    #[test]
    fn reserve_round_trip() {
        let db = LedgerDb::open_temporary().unwrap();
        assert_eq!(db.load_reserve().unwrap(), None);
        db.save_reserve(1_000).unwrap();
        db.save_reserve(750).unwrap();
        assert_eq!(db.load_reserve().unwrap(), Some(750));
        // The reserve alone does not make a ledger.
        assert!(db.is_empty().unwrap());
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let state = sample_state();
        {
            let db = LedgerDb::open(dir.path()).unwrap();
            db.save(&state).unwrap();
        }
        let db = LedgerDb::open(dir.path()).unwrap();
        assert_eq!(db.load().unwrap(), Some(state));
    }
}
