//! Metric names recorded by the trust store
//!
//! Counters are emitted through the `metrics` facade; installing a
//! recorder/exporter is left to the embedding application.

use metrics::describe_counter;

pub const CACHE_HIT: &str = "trust.cache.hit";
pub const CACHE_MISS: &str = "trust.cache.miss";
pub const CONNECTION_RETRY: &str = "trust.connection.retry";
pub const MUTATIONS_COMMITTED: &str = "trust.mutations.committed";
pub const MUTATIONS_FAILED: &str = "trust.mutations.failed";

/// Register metric descriptions with the installed recorder
pub fn init_metrics() {
    describe_counter!(CACHE_HIT, "Acceptance lookups answered from the cache");
    describe_counter!(CACHE_MISS, "Acceptance lookups that went to the database");
    describe_counter!(CONNECTION_RETRY, "Database opens retried because the engine was busy");
    describe_counter!(MUTATIONS_COMMITTED, "Committed acceptance changes, labelled by operation");
    describe_counter!(MUTATIONS_FAILED, "Failed acceptance changes, labelled by operation");
}
