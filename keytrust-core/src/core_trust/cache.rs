//! Single-slot acceptance cache
//!
//! Remembers the decision and email set of the most recently mutated
//! fingerprint. Only mutations write to it; read paths consult it but
//! never warm it on a miss. The slot is owned by a [`TrustStore`] and is
//! not authoritative: concurrent writers race on it, so every miss must
//! fall through to storage.
//!
//! [`TrustStore`]: super::store::TrustStore

use super::types::{AcceptanceDecision, EmailSet, Fingerprint};
use std::sync::{Mutex, PoisonError};

/// Cached state for one fingerprint
///
/// `decision == None` is a tombstone left by a delete.
#[derive(Debug, Clone, PartialEq, Eq)]
struct CacheEntry {
    fingerprint: Fingerprint,
    decision: Option<AcceptanceDecision>,
    emails: EmailSet,
}

/// Cache hit: a decided fingerprint with its email set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedAcceptance {
    pub decision: AcceptanceDecision,
    pub emails: EmailSet,
}

#[derive(Debug, Default)]
pub struct AcceptanceCache {
    slot: Mutex<Option<CacheEntry>>,
}

impl AcceptanceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hit only when `fingerprint` is the cached one and its decision is
    /// present and not undecided
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CachedAcceptance> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = slot.as_ref().filter(|e| &e.fingerprint == fingerprint)?;
        match entry.decision {
            Some(decision) if decision != AcceptanceDecision::Undecided => Some(CachedAcceptance {
                decision,
                emails: entry.emails.clone(),
            }),
            _ => None,
        }
    }

    pub fn store(&self, fingerprint: Fingerprint, decision: AcceptanceDecision, emails: EmailSet) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CacheEntry {
            fingerprint,
            decision: Some(decision),
            emails,
        });
    }

    /// Leave an empty entry for `fingerprint`; lookups treat it as a miss
    pub fn tombstone(&self, fingerprint: Fingerprint) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(CacheEntry {
            fingerprint,
            decision: None,
            emails: EmailSet::new(),
        });
    }

    pub fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }

    /// Drop the entry only if it still describes `fingerprint`
    pub fn invalidate_if(&self, fingerprint: &Fingerprint) {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|e| &e.fingerprint == fingerprint) {
            *slot = None;
        }
    }

    /// Fingerprint currently held in the slot, tombstones included
    pub fn cached_fingerprint(&self) -> Option<Fingerprint> {
        let slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        slot.as_ref().map(|e| e.fingerprint.clone())
    }
}
