//! Persistent store of key acceptance decisions for an end-to-end
//! encrypted messaging client.
//!
//! ```no_run
//! use keytrust_core::config::Config;
//! use keytrust_core::core_trust::{AcceptanceDecision, NoSecretKeys, TrustStore};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = TrustStore::open(&Config::default(), Arc::new(NoSecretKeys)).await?;
//! store
//!     .update_acceptance(
//!         "0123456789abcdef0123456789abcdef01234567",
//!         ["alice@example.com"],
//!         AcceptanceDecision::Verified,
//!     )
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core_trust;
pub mod logging;
pub mod metrics;

pub use config::Config;
pub use core_trust::{AcceptanceDecision, Fingerprint, TrustError, TrustResult, TrustStore};
pub use logging::{init_logging, LogLevel};
