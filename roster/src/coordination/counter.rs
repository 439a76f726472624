use super::backoff::Backoff;
use super::lock::{Acquisition, DistributedLock};
use crate::keys;
use crate::ports::{KeyValueStore, RegistrationSource};
use crate::timeouts::bounded;
use shared::config::CacheSettings;
use shared::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of an event-scoped counter adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedDelta {
    /// First application of this event. Carries the new value, or `None` if the counter was absent.
    Applied(Option<u64>),
    /// The event already moved the counter once.
    Duplicate,
}

/// Running total of registrations kept in the shared store.
///
/// Values are stored as decimal strings so a Redis `INCRBY`-style backend can operate on them.
#[derive(Clone)]
pub struct AtomicCounter {
    store: Arc<dyn KeyValueStore>,
    lock: DistributedLock,
    settings: CacheSettings,
}

impl AtomicCounter {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        lock: DistributedLock,
        settings: CacheSettings,
    ) -> Self {
        Self {
            store,
            lock,
            settings,
        }
    }

    pub async fn get(&self) -> Result<Option<u64>> {
        let raw = bounded(
            "counter.get",
            self.settings.store_timeout,
            self.store.get(&keys::counter()),
        )
        .await?;

        raw.map(|bytes| parse_count(&bytes)).transpose()
    }

    pub async fn set(&self, value: u64) -> Result<()> {
        bounded(
            "counter.set",
            self.settings.store_timeout,
            self.store.set(
                &keys::counter(),
                value.to_string().into_bytes(),
                self.settings.counter_ttl,
            ),
        )
        .await
    }

    /// Adds one. Returns `None` when the counter is absent; the next read reconciles it.
    pub async fn increment(&self) -> Result<Option<u64>> {
        self.adjust(1).await
    }

    /// Subtracts one, clamping at zero.
    pub async fn decrement(&self) -> Result<Option<u64>> {
        self.adjust(-1).await
    }

    async fn adjust(&self, delta: i64) -> Result<Option<u64>> {
        let next = bounded(
            "counter.adjust",
            self.settings.store_timeout,
            self.store
                .adjust(&keys::counter(), delta, self.settings.counter_ttl),
        )
        .await?;

        Ok(next.map(|v| v.max(0) as u64))
    }

    /// Adjusts the counter at most once per event, whoever applies it and however often.
    ///
    /// A failed adjustment takes its marker back, so a redelivery of the event can retry it.
    pub async fn apply_once(&self, event_id: Uuid, delta: i64) -> Result<AppliedDelta> {
        let marker = keys::applied(event_id);
        let token = Uuid::new_v4().to_string();
        let first = bounded(
            "counter.mark_applied",
            self.settings.store_timeout,
            self.store.set_if_absent(
                &marker,
                token.clone().into_bytes(),
                self.settings.applied_marker_ttl,
            ),
        )
        .await?;

        if !first {
            debug!(%event_id, "counter delta already applied");
            return Ok(AppliedDelta::Duplicate);
        }

        match self.adjust(delta).await {
            Ok(value) => Ok(AppliedDelta::Applied(value)),
            Err(e) => {
                let unmarked = bounded(
                    "counter.unmark_applied",
                    self.settings.store_timeout,
                    self.store.delete_if_equals(&marker, token.as_bytes()),
                )
                .await;
                if let Err(unmark_err) = unmarked {
                    warn!(
                        %event_id,
                        error = %unmark_err,
                        "could not clear applied marker, delta waits for reconciliation"
                    );
                }
                Err(e)
            }
        }
    }

    /// Reads the counter, refilling it from the source of truth on a miss.
    ///
    /// Only one caller cluster-wide recounts; the rest back off and re-read. Once the retry
    /// budget is spent this fails with `Error::CountUnavailable`.
    pub async fn get_or_reconcile(&self, source: &dyn RegistrationSource) -> Result<u64> {
        let lock_key = keys::counter_lock();
        let mut backoff = Backoff::new(
            self.settings.lock_backoff_base,
            self.settings.lock_backoff_max,
        );

        for attempt in 0..=self.settings.count_retry_attempts {
            match self.get().await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "counter store unavailable, counting from source");
                    return self.count_source(source).await;
                }
            }

            match self.lock.try_acquire(&lock_key, self.settings.lock_ttl).await {
                Acquisition::Acquired(guard) => {
                    let result = self.refill(source).await;
                    guard.release().await;
                    return result;
                }
                Acquisition::Held => {
                    debug!(attempt, "counter refill in progress elsewhere, backing off");
                    backoff.wait().await;
                }
                Acquisition::Unavailable => return self.count_source(source).await,
            }
        }

        warn!(
            attempts = self.settings.count_retry_attempts,
            "gave up waiting for counter refill"
        );
        Err(Error::CountUnavailable)
    }

    /// Overwrites the counter with the true count. Last write wins against in-flight deltas.
    pub async fn reconcile(&self, source: &dyn RegistrationSource) -> Result<u64> {
        let count = self.count_source(source).await?;
        let previous = self.get().await.ok().flatten();
        self.set(count).await?;

        if previous.is_some_and(|p| p != count) {
            info!(previous = ?previous, actual = count, "counter drift corrected");
        }
        Ok(count)
    }

    async fn refill(&self, source: &dyn RegistrationSource) -> Result<u64> {
        if let Ok(Some(value)) = self.get().await {
            return Ok(value);
        }

        let count = self.count_source(source).await?;
        if let Err(e) = self.set(count).await {
            warn!(error = %e, "failed to store recounted total");
        }
        info!(count, "counter refilled from source of truth");
        Ok(count)
    }

    async fn count_source(&self, source: &dyn RegistrationSource) -> Result<u64> {
        bounded("source.count_all", self.settings.source_timeout, source.count_all()).await
    }
}

fn parse_count(bytes: &[u8]) -> Result<u64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .map(|v| v.max(0) as u64)
        .ok_or_else(|| Error::Serialization("counter value is not an integer".to_string()))
}
