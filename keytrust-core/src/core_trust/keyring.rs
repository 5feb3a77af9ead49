//! Secret key lookup used as the trust-on-first-use fallback
//!
//! The key ring itself lives elsewhere; the trust store only needs to
//! know whether a usable private key exists for an email address.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use super::types::normalize_email;

#[async_trait]
pub trait SecretKeyLookup: Send + Sync {
    /// Whether a usable secret key exists for `email` (already lowercased)
    async fn has_secret_key(&self, email: &str) -> bool;
}

/// Lookup for a client that holds no secret keys
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSecretKeys;

#[async_trait]
impl SecretKeyLookup for NoSecretKeys {
    async fn has_secret_key(&self, _email: &str) -> bool {
        false
    }
}

/// In-memory set of emails with secret keys (for tests and the CLI)
#[derive(Debug, Clone, Default)]
pub struct MemorySecretKeys {
    emails: Arc<RwLock<HashSet<String>>>,
}

impl MemorySecretKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_emails<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keys = Self::new();
        for email in emails {
            keys.insert(email.as_ref());
        }
        keys
    }

    pub fn insert(&self, email: &str) {
        self.emails
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(normalize_email(email));
    }

    pub fn remove(&self, email: &str) -> bool {
        self.emails
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&normalize_email(email))
    }
}

#[async_trait]
impl SecretKeyLookup for MemorySecretKeys {
    async fn has_secret_key(&self, email: &str) -> bool {
        self.emails
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&normalize_email(email))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_no_secret_keys() {
        assert!(!NoSecretKeys.has_secret_key("me@example.com").await);
    }

    #[tokio::test]
    async fn test_memory_secret_keys() {
        let keys = MemorySecretKeys::with_emails(["Me@Example.com"]);
        assert!(keys.has_secret_key("me@example.com").await);
        assert!(!keys.has_secret_key("you@example.com").await);

        assert!(keys.remove("ME@EXAMPLE.COM"));
        assert!(!keys.has_secret_key("me@example.com").await);
    }
}
