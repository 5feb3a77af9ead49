//! Error types for trust store operations

use thiserror::Error;

/// Result type for trust store operations
pub type TrustResult<T> = Result<T, TrustError>;

/// Errors that can occur while reading or changing acceptance state
#[derive(Debug, Error)]
pub enum TrustError {
    /// Fingerprint is not 32 or 40 hex characters
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    /// Operation is not allowed for the current acceptance of the key
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Email already has acceptance under this fingerprint
    #[error("{email} already has acceptance for {fingerprint}")]
    DuplicateEmail { fingerprint: String, email: String },

    /// Engine stayed busy until the connection deadline passed
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] rusqlite::Error),

    /// Any other engine failure, propagated unchanged
    #[error("Storage error: {0}")]
    StorageError(#[from] rusqlite::Error),

    /// Background task failed or a handle was used after it was lost
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Discriminant of [`TrustError`], for callers that branch on the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrustErrorKind {
    InvalidFingerprint,
    InvalidState,
    DuplicateEmail,
    StorageUnavailable,
    StorageError,
    Internal,
}

impl TrustError {
    pub fn kind(&self) -> TrustErrorKind {
        match self {
            TrustError::InvalidFingerprint(_) => TrustErrorKind::InvalidFingerprint,
            TrustError::InvalidState(_) => TrustErrorKind::InvalidState,
            TrustError::DuplicateEmail { .. } => TrustErrorKind::DuplicateEmail,
            TrustError::StorageUnavailable(_) => TrustErrorKind::StorageUnavailable,
            TrustError::StorageError(_) => TrustErrorKind::StorageError,
            TrustError::Internal(_) => TrustErrorKind::Internal,
        }
    }

    /// True for caller mistakes that fail before any I/O or state change
    pub fn is_misuse(&self) -> bool {
        matches!(
            self.kind(),
            TrustErrorKind::InvalidFingerprint
                | TrustErrorKind::InvalidState
                | TrustErrorKind::DuplicateEmail
        )
    }
}

impl From<tokio::task::JoinError> for TrustError {
    fn from(e: tokio::task::JoinError) -> Self {
        TrustError::Internal(format!("Task join error: {}", e))
    }
}
