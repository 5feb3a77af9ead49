//! Acceptance change notifications
//!
//! Every successful mutation of the trust store emits one
//! [`AcceptanceEvent`]. Observers that only care that "something changed"
//! can ignore the payload and refresh their view.

use super::types::{AcceptanceDecision, Fingerprint};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AcceptanceEvent {
    /// Decision and email set for a fingerprint were replaced
    DecisionUpdated {
        fingerprint: Fingerprint,
        decision: AcceptanceDecision,
    },

    /// One email was added to an accepted fingerprint
    EmailAccepted { fingerprint: Fingerprint, email: String },

    /// All acceptance state for a fingerprint was removed
    Deleted { fingerprint: Fingerprint },
}

impl AcceptanceEvent {
    pub fn fingerprint(&self) -> &Fingerprint {
        match self {
            AcceptanceEvent::DecisionUpdated { fingerprint, .. }
            | AcceptanceEvent::EmailAccepted { fingerprint, .. }
            | AcceptanceEvent::Deleted { fingerprint } => fingerprint,
        }
    }
}

/// Fan-out of acceptance events to any number of subscribers
///
/// Subscribers that fall more than `capacity` events behind observe
/// `RecvError::Lagged` and should re-read whatever state they display.
#[derive(Clone)]
pub struct EventBroadcaster {
    tx: broadcast::Sender<AcceptanceEvent>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Returns the number of subscribers the event reached
    pub fn emit(&self, event: AcceptanceEvent) -> usize {
        // No active receivers is not an error
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AcceptanceEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(64)
    }
}
