//! Connection handling for the acceptance database
//!
//! Handles are not pooled: every [`ConnectionManager::open`] yields an
//! independent [`StoreConnection`] that the caller closes when done.
//! Opening retries while the engine reports it is busy, until the
//! caller's deadline passes.

use crate::config::StoreConfig;
use crate::core_trust::errors::{TrustError, TrustResult};
use crate::metrics as metric;
use metrics::counter;
use rusqlite::{Connection, ErrorCode};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Engine error codes worth waiting out
pub const TRANSIENT_ERROR_CODES: &[ErrorCode] = &[ErrorCode::DatabaseBusy, ErrorCode::DatabaseLocked];

/// Whether `err` is a transient "engine busy" failure
pub fn is_transient(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => TRANSIENT_ERROR_CODES.contains(&e.code),
        _ => false,
    }
}

/// Opens handles to the database file at a fixed path
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    path: PathBuf,
    retry_interval: Duration,
    busy_timeout: Duration,
}

impl ConnectionManager {
    /// # Arguments
    /// * `path` - SQLite database file
    /// * `retry_interval` - Wait between attempts while the engine is busy
    /// * `busy_timeout` - Engine-level lock wait applied to each handle
    pub fn new(path: impl Into<PathBuf>, retry_interval: Duration, busy_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            retry_interval,
            busy_timeout,
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.db_path.clone(), config.retry_interval, config.busy_timeout)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a handle, retrying on busy until `deadline`
    ///
    /// Returns `StorageUnavailable` carrying the last busy error once the
    /// deadline has passed; any other engine error is returned at once.
    pub async fn open(&self, deadline: Instant) -> TrustResult<StoreConnection> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let path = self.path.clone();
            let busy_timeout = self.busy_timeout;
            let result = tokio::task::spawn_blocking(move || open_blocking(&path, busy_timeout)).await?;

            match result {
                Ok(conn) => {
                    debug!(path = %self.path.display(), attempts, "Opened acceptance database");
                    return Ok(StoreConnection::new(conn));
                }
                Err(e) if is_transient(&e) => {
                    if Instant::now() > deadline {
                        warn!(path = %self.path.display(), attempts, "Acceptance database still busy at deadline");
                        return Err(TrustError::StorageUnavailable(e));
                    }
                    counter!(metric::CONNECTION_RETRY).increment(1);
                    debug!(attempts, error = %e, "Acceptance database busy, retrying");
                    tokio::time::sleep(self.retry_interval).await;
                }
                Err(e) => return Err(TrustError::StorageError(e)),
            }
        }
    }

    /// Open with a deadline of `timeout` from now
    pub async fn open_within(&self, timeout: Duration) -> TrustResult<StoreConnection> {
        self.open(Instant::now() + timeout).await
    }
}

fn open_blocking(path: &Path, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(busy_timeout)?;
    // Opening is lazy; touch the file so a held lock surfaces here
    conn.query_row("SELECT count(*) FROM sqlite_master", [], |row| row.get::<_, i64>(0))?;
    Ok(conn)
}

/// An open handle to the acceptance database
///
/// Engine work runs on the blocking pool so callers never stall the
/// async runtime while SQLite waits on I/O or locks.
pub struct StoreConnection {
    conn: Option<Connection>,
}

impl StoreConnection {
    pub fn new(conn: Connection) -> Self {
        Self { conn: Some(conn) }
    }

    /// Run blocking work against the handle
    pub async fn run<F, T>(&mut self, f: F) -> TrustResult<T>
    where
        F: FnOnce(&mut Connection) -> TrustResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut conn = self
            .conn
            .take()
            .ok_or_else(|| TrustError::Internal("Connection lost by a failed task".to_string()))?;

        let (conn, result) = tokio::task::spawn_blocking(move || {
            let result = f(&mut conn);
            (conn, result)
        })
        .await?;

        self.conn = Some(conn);
        result
    }

    /// Close the handle, reporting close failures
    pub async fn close(mut self) -> TrustResult<()> {
        let Some(conn) = self.conn.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || conn.close().map_err(|(_, e)| e)).await??;
        Ok(())
    }

    /// Close the handle, logging and swallowing close failures
    pub async fn close_quietly(self) {
        if let Err(e) = self.close().await {
            warn!(error = %e, "Failed to close acceptance database connection");
        }
    }
}
