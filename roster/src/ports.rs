use crate::domain::{Registration, RegistrationChanges, RegistrationView};
use crate::events::{DeadLetter, Delivery, RegistrationEvent};
use async_trait::async_trait;
use shared::Result;
use std::time::Duration;
use uuid::Uuid;

// Ports are the pluggable extension points for the stores the core coordinates through

/// Port for the shared cache/lock store (e.g. Redis).
///
/// Every instance of the service talks to the same store, so anything written here is visible
/// cluster-wide. Every entry carries a TTL.
#[async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Atomic set-if-absent. Returns true when this call created the entry.
    async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<bool>;

    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomic compare-and-delete: removes the entry only while it still holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &[u8]) -> Result<bool>;

    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;

    /// Atomically adds `delta` to an existing integer entry, clamping at zero and renewing its TTL.
    ///
    /// Returns `None` without creating anything when the key is absent.
    async fn adjust(&self, key: &str, delta: i64, ttl: Duration) -> Result<Option<i64>>;
}

/// Read side of the source of truth. Slow and authoritative.
#[async_trait]
pub trait RegistrationSource: Send + Sync + 'static {
    /// Records ordered newest first, ties broken by ascending id.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Vec<RegistrationView>>;

    async fn count_all(&self) -> Result<u64>;

    async fn find_by_identity(&self, identity_key: &str) -> Result<Option<RegistrationView>>;
}

/// Write side of the source of truth.
#[async_trait]
pub trait RegistrationRepository: Send + Sync + 'static {
    /// Fails with `Error::Conflict` when the identity is already registered.
    async fn insert(&self, registration: Registration) -> Result<Registration>;

    /// Returns the record after the change and the previous identity key if it moved.
    async fn update(
        &self,
        id: Uuid,
        changes: RegistrationChanges,
    ) -> Result<(Registration, Option<String>)>;

    async fn delete(&self, id: Uuid) -> Result<Registration>;

    async fn get(&self, id: Uuid) -> Result<Option<Registration>>;
}

/// Durable, ordered, at-least-once event log with per-group cursors.
#[async_trait]
pub trait EventLog: Send + Sync + 'static {
    async fn append(&self, event: &RegistrationEvent) -> Result<u64>;

    /// Deliveries after the group's committed cursor, in append order.
    async fn read_from(&self, group: &str, max: usize) -> Result<Vec<Delivery>>;

    /// Commits the group's cursor up to and including `seq`.
    async fn ack(&self, group: &str, seq: u64) -> Result<()>;

    /// Records a failed attempt and returns the total attempts so far.
    async fn record_failure(&self, group: &str, seq: u64) -> Result<u32>;

    /// Parks the delivery in the group's dead-letter area and moves the cursor past it.
    async fn dead_letter(&self, group: &str, delivery: &Delivery, reason: &str) -> Result<()>;

    async fn dead_letters(&self, group: &str) -> Result<Vec<DeadLetter>>;

    /// Resolves when something is appended or `max_wait` elapses.
    async fn wait_for_append(&self, max_wait: Duration);

    async fn flush(&self) -> Result<()>;
}
