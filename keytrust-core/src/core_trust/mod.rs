//! Key acceptance (trust decision) store
//!
//! Records, per key fingerprint, whether the key is undecided, unverified,
//! verified, rejected or one of our own (personal), and which email
//! addresses have been decided for under it.
//!
//! Layout:
//! - [`storage`]: connection opening with busy retry, table schema
//! - [`cache`]: single-slot memo of the last mutated fingerprint
//! - [`store`]: the public [`TrustStore`] API
//! - [`events`]: change notifications
//! - [`keyring`]: secret key lookup used as trust-on-first-use fallback

pub mod cache;
pub mod errors;
pub mod events;
pub mod keyring;
pub mod storage;
pub mod store;
pub mod types;

pub use cache::{AcceptanceCache, CachedAcceptance};
pub use errors::{TrustError, TrustErrorKind, TrustResult};
pub use events::{AcceptanceEvent, EventBroadcaster};
pub use keyring::{MemorySecretKeys, NoSecretKeys, SecretKeyLookup};
pub use storage::{ConnectionManager, StoreConnection};
pub use store::TrustStore;
pub use types::{
    dedupe_emails, normalize_email, Acceptance, AcceptanceDecision, EmailSet, Fingerprint,
    FINGERPRINT_LEN, LEGACY_FINGERPRINT_LEN,
};
