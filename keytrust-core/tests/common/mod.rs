//! Shared helpers for trust store integration tests

#![allow(dead_code)]

use keytrust_core::config::Config;
use keytrust_core::core_trust::{MemorySecretKeys, NoSecretKeys, SecretKeyLookup, TrustStore};
use std::sync::Arc;
use tempfile::TempDir;

pub const FPR_A: &str = "0123456789abcdef0123456789abcdef01234567";
pub const FPR_B: &str = "89abcdef0123456789abcdef0123456789abcdef";
pub const LEGACY_FPR: &str = "0123456789abcdef0123456789abcdef";

/// A store on a fresh database file; keep the `TempDir` alive for the test
pub struct TestStore {
    pub store: Arc<TrustStore>,
    pub config: Config,
    _dir: TempDir,
}

impl TestStore {
    pub async fn new() -> Self {
        Self::with_keys(Arc::new(NoSecretKeys)).await
    }

    pub async fn with_secret_keys(emails: &[&str]) -> Self {
        Self::with_keys(Arc::new(MemorySecretKeys::with_emails(emails))).await
    }

    async fn with_keys(keys: Arc<dyn SecretKeyLookup>) -> Self {
        let dir = TempDir::new().unwrap();
        let config = Config::with_db_path(dir.path().join("openpgp.sqlite"));
        let store = TrustStore::open(&config, keys).await.unwrap();
        Self {
            store: Arc::new(store),
            config,
            _dir: dir,
        }
    }

    /// A second store instance over the same file, with its own cache
    pub async fn reopen(&self) -> TrustStore {
        TrustStore::open(&self.config, Arc::new(NoSecretKeys)).await.unwrap()
    }
}
