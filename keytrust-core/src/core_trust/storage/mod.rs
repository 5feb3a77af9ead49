//! Persistent storage for acceptance decisions
//!
//! SQLite-backed; see [`schema`] for the tables and [`connection`] for
//! how handles are opened.

pub mod connection;
pub mod schema;

pub use connection::{is_transient, ConnectionManager, StoreConnection, TRANSIENT_ERROR_CODES};
pub use schema::{ensure_schema, table_exists, DECISION_TABLE, EMAIL_TABLE};
