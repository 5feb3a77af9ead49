//! Trust store API
//!
//! Reads and replaces the acceptance decision and accepted emails of key
//! fingerprints. Every mutation replaces rows inside a single immediate
//! transaction, so no half-applied decision is ever visible, and emits an
//! [`AcceptanceEvent`] once committed.
//!
//! There is no in-process lock over the database: concurrent writers to
//! the same fingerprint are serialized by SQLite's own write lock.

use super::cache::AcceptanceCache;
use super::errors::{TrustError, TrustResult};
use super::events::{AcceptanceEvent, EventBroadcaster};
use super::keyring::SecretKeyLookup;
use super::storage::{ensure_schema, ConnectionManager, StoreConnection};
use super::types::{dedupe_emails, normalize_email, Acceptance, AcceptanceDecision, EmailSet, Fingerprint};
use crate::config::Config;
use crate::metrics as metric;
use metrics::counter;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument};

pub struct TrustStore {
    connections: ConnectionManager,
    open_timeout: Duration,
    cache: AcceptanceCache,
    events: EventBroadcaster,
    secret_keys: Arc<dyn SecretKeyLookup>,
}

impl TrustStore {
    /// Create a store without touching the database
    pub fn new(config: &Config, secret_keys: Arc<dyn SecretKeyLookup>) -> Self {
        Self {
            connections: ConnectionManager::from_config(&config.store),
            open_timeout: config.store.open_timeout,
            cache: AcceptanceCache::new(),
            events: EventBroadcaster::new(config.events.capacity),
            secret_keys,
        }
    }

    /// Create a store and make sure the acceptance tables exist
    pub async fn open(config: &Config, secret_keys: Arc<dyn SecretKeyLookup>) -> TrustResult<Self> {
        let store = Self::new(config, secret_keys);
        store.check_database_structure().await?;
        Ok(store)
    }

    /// Open a new handle; the deadline is computed from now
    pub async fn open_connection(&self) -> TrustResult<StoreConnection> {
        self.connections.open(Instant::now() + self.open_timeout).await
    }

    /// Create the acceptance tables if they are missing
    pub async fn check_database_structure(&self) -> TrustResult<()> {
        let result = self.with_connection(|c| Ok(ensure_schema(c)?)).await;
        match result {
            Ok(created) => {
                debug!(created, path = %self.connections.path().display(), "Checked acceptance tables");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Check db structure failed");
                Err(e)
            }
        }
    }

    /// Subscribe to change notifications
    pub fn subscribe(&self) -> broadcast::Receiver<AcceptanceEvent> {
        self.events.subscribe()
    }

    pub fn cache(&self) -> &AcceptanceCache {
        &self.cache
    }

    /// Decision recorded for `fingerprint`, `None` when undecided
    ///
    /// Uses `conn` when given, otherwise opens and closes its own handle.
    /// A cache miss does not populate the cache.
    #[instrument(skip(self, conn))]
    pub async fn get_fingerprint_acceptance(
        &self,
        conn: Option<&mut StoreConnection>,
        fingerprint: &str,
    ) -> TrustResult<Option<AcceptanceDecision>> {
        let fingerprint = Fingerprint::parse(fingerprint)?;

        if let Some(hit) = self.cache.lookup(&fingerprint) {
            counter!(metric::CACHE_HIT).increment(1);
            debug!(decision = %hit.decision, "Acceptance cache hit");
            return Ok(Some(hit.decision));
        }
        counter!(metric::CACHE_MISS).increment(1);

        let query = move |c: &mut Connection| query_decision(c, &fingerprint);
        match conn {
            Some(conn) => conn.run(query).await,
            None => self.with_connection(query).await,
        }
    }

    /// Whether any verified or unverified key is accepted for `email`
    ///
    /// Falls back to trusting our own keys: an email with a usable secret
    /// key counts as accepted.
    #[instrument(skip(self))]
    pub async fn has_any_accepted_key_for_email(&self, email: &str) -> TrustResult<bool> {
        let email = normalize_email(email);

        let lookup_email = email.clone();
        let hits = self
            .with_connection(move |c| {
                let hits: i64 = c.query_row(
                    "SELECT count(decision) FROM acceptance_email \
                     INNER JOIN acceptance_decision ON acceptance_decision.fpr = acceptance_email.fpr \
                     WHERE (decision = 'verified' OR decision = 'unverified') \
                     AND lower(email) = ?",
                    params![lookup_email],
                    |row| row.get(0),
                )?;
                Ok(hits)
            })
            .await?;

        if hits > 0 {
            return Ok(true);
        }
        Ok(self.secret_keys.has_secret_key(&email).await)
    }

    /// Acceptance of `fingerprint` and whether `email` is decided for it
    #[instrument(skip(self))]
    pub async fn get_acceptance(&self, fingerprint: &str, email: &str) -> TrustResult<Acceptance> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        let email = normalize_email(email);

        if let Some(hit) = self.cache.lookup(&fingerprint) {
            if hit.emails.contains(&email) {
                counter!(metric::CACHE_HIT).increment(1);
                return Ok(Acceptance {
                    fingerprint_acceptance: Some(hit.decision),
                    email_decided: true,
                });
            }
        }

        let mut conn = self.open_connection().await?;
        let result = self.acceptance_on(&mut conn, fingerprint, email).await;
        conn.close_quietly().await;
        result
    }

    async fn acceptance_on(
        &self,
        conn: &mut StoreConnection,
        fingerprint: Fingerprint,
        email: String,
    ) -> TrustResult<Acceptance> {
        let decision = self
            .get_fingerprint_acceptance(Some(&mut *conn), fingerprint.as_str())
            .await?;

        let email_decided = match decision {
            Some(_) => conn.run(move |c| is_email_decided(c, &fingerprint, &email)).await?,
            None => false,
        };

        Ok(Acceptance {
            fingerprint_acceptance: decision,
            email_decided,
        })
    }

    /// Emails currently decided for under `fingerprint`
    #[instrument(skip(self))]
    pub async fn accepted_emails(&self, fingerprint: &str) -> TrustResult<EmailSet> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        self.with_connection(move |c| {
            let mut stmt = c.prepare("SELECT email FROM acceptance_email WHERE fpr = ?")?;
            let emails = stmt
                .query_map(params![fingerprint], |row| row.get::<_, String>(0))?
                .collect::<Result<EmailSet, _>>()?;
            Ok(emails)
        })
        .await
    }

    /// Remove the decision and all emails for `fingerprint`
    #[instrument(skip(self))]
    pub async fn delete_acceptance(&self, fingerprint: &str) -> TrustResult<()> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        self.cache.tombstone(fingerprint.clone());

        let target = fingerprint.clone();
        let result = self
            .with_connection(move |c| {
                let tx = c.transaction_with_behavior(TransactionBehavior::Immediate)?;
                delete_rows(&tx, &target)?;
                tx.commit()?;
                Ok(())
            })
            .await;

        self.finish_mutation("delete", result, AcceptanceEvent::Deleted { fingerprint })
    }

    /// Add one accepted email to an undecided or accepted key
    ///
    /// An undecided key becomes `unverified` with this single email. It is
    /// an error to call this for a rejected or personal key, or for an
    /// email that is already accepted.
    #[instrument(skip(self))]
    pub async fn add_accepted_email(&self, fingerprint: &str, email: &str) -> TrustResult<()> {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        let email = normalize_email(email);

        let mut conn = self.open_connection().await?;
        let result = self
            .add_accepted_email_on(&mut conn, fingerprint.clone(), email.clone())
            .await;
        conn.close_quietly().await;

        self.finish_mutation("add_email", result, AcceptanceEvent::EmailAccepted { fingerprint, email })
    }

    async fn add_accepted_email_on(
        &self,
        conn: &mut StoreConnection,
        fingerprint: Fingerprint,
        email: String,
    ) -> TrustResult<()> {
        let current = self
            .get_fingerprint_acceptance(Some(&mut *conn), fingerprint.as_str())
            .await?;

        check_email_addable(current)?;

        self.cache.invalidate();

        conn.run(move |c| {
            let tx = c.transaction_with_behavior(TransactionBehavior::Immediate)?;
            // Decide on the row read under the write lock; a concurrent
            // writer may have changed it since the check above
            let current = query_decision(&tx, &fingerprint)?;
            if check_email_addable(current)? {
                if is_email_decided(&tx, &fingerprint, &email)? {
                    return Err(TrustError::DuplicateEmail {
                        fingerprint: fingerprint.to_string(),
                        email,
                    });
                }
            } else {
                // Start fresh, dropping stale email rows
                delete_rows(&tx, &fingerprint)?;
                insert_decision(&tx, &fingerprint, AcceptanceDecision::Unverified)?;
            }
            insert_email(&tx, &fingerprint, &email)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Replace the decision and email set of `fingerprint`
    ///
    /// Emails are lowercased and deduplicated. `Undecided` removes all
    /// state; `Rejected` keeps no emails. The cache is updated to the
    /// intended state before the transaction runs.
    #[instrument(skip(self, emails))]
    pub async fn update_acceptance<I, S>(
        &self,
        fingerprint: &str,
        emails: I,
        decision: AcceptanceDecision,
    ) -> TrustResult<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fingerprint = Fingerprint::parse(fingerprint)?;
        let emails = if decision.keeps_emails() {
            dedupe_emails(emails)
        } else {
            EmailSet::new()
        };

        self.cache.store(fingerprint.clone(), decision, emails.clone());

        let target = fingerprint.clone();
        let result = self
            .with_connection(move |c| {
                let tx = c.transaction_with_behavior(TransactionBehavior::Immediate)?;
                delete_rows(&tx, &target)?;
                if decision != AcceptanceDecision::Undecided {
                    insert_decision(&tx, &target, decision)?;
                }
                // A key may carry several user IDs with the same email
                for email in &emails {
                    insert_email(&tx, &target, email)?;
                }
                tx.commit()?;
                Ok(())
            })
            .await;

        if result.is_err() {
            self.cache.invalidate_if(&fingerprint);
        }

        self.finish_mutation(
            "update",
            result,
            AcceptanceEvent::DecisionUpdated { fingerprint, decision },
        )
    }

    pub async fn accept_as_personal_key(&self, fingerprint: &str) -> TrustResult<()> {
        self.update_acceptance(fingerprint, std::iter::empty::<&str>(), AcceptanceDecision::Personal)
            .await
    }

    pub async fn delete_personal_key_acceptance(&self, fingerprint: &str) -> TrustResult<()> {
        self.delete_acceptance(fingerprint).await
    }

    pub async fn is_accepted_as_personal_key(&self, fingerprint: &str) -> TrustResult<bool> {
        let decision = self.get_fingerprint_acceptance(None, fingerprint).await?;
        Ok(decision == Some(AcceptanceDecision::Personal))
    }

    /// Open a handle, run `f`, close the handle whatever the outcome
    async fn with_connection<F, T>(&self, f: F) -> TrustResult<T>
    where
        F: FnOnce(&mut Connection) -> TrustResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self.open_connection().await?;
        let result = conn.run(f).await;
        conn.close_quietly().await;
        result
    }

    fn finish_mutation(
        &self,
        op: &'static str,
        result: TrustResult<()>,
        event: AcceptanceEvent,
    ) -> TrustResult<()> {
        match result {
            Ok(()) => {
                counter!(metric::MUTATIONS_COMMITTED, "op" => op).increment(1);
                info!(op, fingerprint = %event.fingerprint(), "Acceptance changed");
                self.events.emit(event);
                Ok(())
            }
            Err(e) => {
                counter!(metric::MUTATIONS_FAILED, "op" => op).increment(1);
                error!(op, fingerprint = %event.fingerprint(), error = %e, "Acceptance change failed");
                Err(e)
            }
        }
    }
}

/// Whether the key already accepts emails; rejected and personal keys
/// take none
fn check_email_addable(current: Option<AcceptanceDecision>) -> TrustResult<bool> {
    match current {
        None | Some(AcceptanceDecision::Undecided) => Ok(false),
        Some(AcceptanceDecision::Unverified) | Some(AcceptanceDecision::Verified) => Ok(true),
        Some(other) => Err(TrustError::InvalidState(format!(
            "add_accepted_email() is invalid for a key with acceptance {}",
            other
        ))),
    }
}

fn query_decision(conn: &Connection, fingerprint: &Fingerprint) -> TrustResult<Option<AcceptanceDecision>> {
    let decision = conn
        .query_row(
            "SELECT decision FROM acceptance_decision WHERE fpr = ?",
            params![fingerprint],
            |row| row.get(0),
        )
        .optional()?;
    Ok(decision)
}

fn is_email_decided(conn: &Connection, fingerprint: &Fingerprint, email: &str) -> TrustResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT count(*) FROM acceptance_email WHERE fpr = ? AND email = ?",
        params![fingerprint, email],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn delete_rows(tx: &Transaction<'_>, fingerprint: &Fingerprint) -> rusqlite::Result<()> {
    tx.execute("DELETE FROM acceptance_decision WHERE fpr = ?", params![fingerprint])?;
    tx.execute("DELETE FROM acceptance_email WHERE fpr = ?", params![fingerprint])?;
    Ok(())
}

fn insert_decision(
    tx: &Transaction<'_>,
    fingerprint: &Fingerprint,
    decision: AcceptanceDecision,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO acceptance_decision (fpr, decision) VALUES (?, ?)",
        params![fingerprint, decision],
    )?;
    Ok(())
}

fn insert_email(tx: &Transaction<'_>, fingerprint: &Fingerprint, email: &str) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO acceptance_email (fpr, email) VALUES (?, ?)",
        params![fingerprint, email],
    )?;
    Ok(())
}
