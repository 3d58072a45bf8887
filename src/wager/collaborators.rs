// ============================================================================
// External collaborators
// ============================================================================
//
// The engine consumes two subsystems it does not own:
//   - CreationGate: "does address X hold the wager-creation entitlement"
//   - PublicMarketSource: the resolved boolean outcome of a public
//     conditional market, used by pegged settlement
//
// Both are traits so the server, tests and the remote feed can plug in their
// own backing. The in-process implementations below are what the server uses;
// `public_feed` keeps the PublicMarketBook in sync with a remote service.
// ============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::errors::WagerError;
use super::types::{Address, PublicMarketId};

pub trait CreationGate {
    fn has_creation_entitlement(&self, who: &Address) -> bool;
}

pub trait PublicMarketSource {
    fn market_exists(&self, id: PublicMarketId) -> bool;

    /// `None` while the public market is unresolved
    fn resolved_outcome(&self, id: PublicMarketId) -> Option<bool>;
}

// ============================================================================
// ENTITLEMENT REGISTRY
// ============================================================================

/// Creation entitlements: either open to everyone or an explicit allowlist
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntitlementRegistry {
    open: bool,
    holders: BTreeSet<Address>,
}

impl EntitlementRegistry {
    pub fn open() -> Self {
        Self { open: true, holders: BTreeSet::new() }
    }

    pub fn allowlist() -> Self {
        Self { open: false, holders: BTreeSet::new() }
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn set_open(&mut self, open: bool) {
        self.open = open;
    }

    /// Returns false if the address already held the entitlement
    pub fn grant(&mut self, who: &Address) -> Result<bool, WagerError> {
        if who.is_zero() {
            return Err(WagerError::InvalidAddress("cannot entitle the zero address".into()));
        }
        Ok(self.holders.insert(who.clone()))
    }

    pub fn revoke(&mut self, who: &Address) -> bool {
        self.holders.remove(who)
    }

    pub fn holders(&self) -> impl Iterator<Item = &Address> {
        self.holders.iter()
    }
}

impl CreationGate for EntitlementRegistry {
    fn has_creation_entitlement(&self, who: &Address) -> bool {
        self.open || self.holders.contains(who)
    }
}

// ============================================================================
// PUBLIC MARKET BOOK
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicMarketRecord {
    pub id: PublicMarketId,
    #[serde(default)]
    pub question: Option<String>,
    pub outcome: Option<bool>,
    pub resolved_at: Option<u64>,
}

/// Local mirror of public conditional-market outcomes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublicMarketBook {
    markets: BTreeMap<PublicMarketId, PublicMarketRecord>,
}

impl PublicMarketBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a public market; re-registering keeps the existing record
    pub fn register(&mut self, id: PublicMarketId, question: Option<String>) -> &PublicMarketRecord {
        self.markets.entry(id).or_insert(PublicMarketRecord {
            id,
            question,
            outcome: None,
            resolved_at: None,
        })
    }

    /// Records the resolved outcome. Repeating the same outcome is a no-op;
    /// a conflicting outcome is rejected.
    pub fn record_outcome(&mut self, id: PublicMarketId, outcome: bool, now: u64) -> Result<bool, WagerError> {
        let record = self.markets.entry(id).or_insert(PublicMarketRecord {
            id,
            question: None,
            outcome: None,
            resolved_at: None,
        });
        match record.outcome {
            Some(existing) if existing == outcome => Ok(false),
            Some(_) => Err(WagerError::OutcomeAlreadyRecorded(id)),
            None => {
                record.outcome = Some(outcome);
                record.resolved_at = Some(now);
                Ok(true)
            }
        }
    }

    pub fn get(&self, id: PublicMarketId) -> Option<&PublicMarketRecord> {
        self.markets.get(&id)
    }

    pub fn unresolved_ids(&self) -> Vec<PublicMarketId> {
        self.markets
            .values()
            .filter(|m| m.outcome.is_none())
            .map(|m| m.id)
            .collect()
    }

    pub fn all(&self) -> Vec<PublicMarketRecord> {
        self.markets.values().cloned().collect()
    }
}

impl PublicMarketSource for PublicMarketBook {
    fn market_exists(&self, id: PublicMarketId) -> bool {
        self.markets.contains_key(&id)
    }

    fn resolved_outcome(&self, id: PublicMarketId) -> Option<bool> {
        self.markets.get(&id).and_then(|m| m.outcome)
    }
}
