//! # Capability Gate
//!
//! The ledger never manages roles. It asks an injected [`AccessControl`]
//! whether a caller holds a [`Capability`] and refuses the call otherwise.
//! Granting and revoking belong to whoever owns the collaborator.
//!
//! [`CapabilityRegistry`] is the in-memory collaborator used by the node and
//! by tests. It uses interior locking so that one `Arc` can be shared
//! between the ledger (reads) and an administrator (writes).

use std::collections::{HashMap, HashSet};
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::types::AccountId;

/// A permission the ledger gates privileged operations on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capability {
    /// May mint and burn receipt tokens. Held by the vault.
    MintBurn,
    /// May lower the global rate.
    RateAdmin,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::MintBurn => write!(f, "MintBurn"),
            Capability::RateAdmin => write!(f, "RateAdmin"),
        }
    }
}

/// Capability membership check.
pub trait AccessControl: Send + Sync {
    /// Returns `true` if `who` currently holds `capability`.
    fn has_capability(&self, who: &AccountId, capability: Capability) -> bool;
}

/// In-memory capability table.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    grants: RwLock<HashMap<AccountId, HashSet<Capability>>>,
}

impl CapabilityRegistry {
    /// Creates an empty registry. Nobody holds anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants `capability` to `who`. Returns `false` if it was already held.
    pub fn grant(&self, who: &AccountId, capability: Capability) -> bool {
        self.grants
            .write()
            .entry(who.clone())
            .or_default()
            .insert(capability)
    }

    /// Revokes `capability` from `who`. Returns `false` if it was not held.
    pub fn revoke(&self, who: &AccountId, capability: Capability) -> bool {
        let mut grants = self.grants.write();
        match grants.get_mut(who) {
            Some(caps) => {
                let removed = caps.remove(&capability);
                if caps.is_empty() {
                    grants.remove(who);
                }
                removed
            }
            None => false,
        }
    }

    /// Lists every holder of `capability`, sorted for stable output.
    pub fn holders(&self, capability: Capability) -> Vec<AccountId> {
        let mut holders: Vec<AccountId> = self
            .grants
            .read()
            .iter()
            .filter(|(_, caps)| caps.contains(&capability))
            .map(|(who, _)| who.clone())
            .collect();
        holders.sort();
        holders
    }
}

impl AccessControl for CapabilityRegistry {
    fn has_capability(&self, who: &AccountId, capability: Capability) -> bool {
        self.grants
            .read()
            .get(who)
            .map(|caps| caps.contains(&capability))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grant_and_revoke() {
        let registry = CapabilityRegistry::new();
        let vault = AccountId::from("vault");

        assert!(!registry.has_capability(&vault, Capability::MintBurn));
        assert!(registry.grant(&vault, Capability::MintBurn));
        assert!(!registry.grant(&vault, Capability::MintBurn));
        assert!(registry.has_capability(&vault, Capability::MintBurn));
        assert!(!registry.has_capability(&vault, Capability::RateAdmin));

        assert!(registry.revoke(&vault, Capability::MintBurn));
        assert!(!registry.revoke(&vault, Capability::MintBurn));
        assert!(!registry.has_capability(&vault, Capability::MintBurn));
    }

    #[test]
    fn holders_are_sorted() {
        let registry = CapabilityRegistry::new();
        registry.grant(&AccountId::from("zed"), Capability::RateAdmin);
        registry.grant(&AccountId::from("amy"), Capability::RateAdmin);
        registry.grant(&AccountId::from("bob"), Capability::MintBurn);

        let admins = registry.holders(Capability::RateAdmin);
        assert_eq!(admins, vec![AccountId::from("amy"), AccountId::from("zed")]);
    }
}
