use crate::ports::KeyValueStore;
use crate::timeouts::bounded;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of a single acquisition attempt.
pub enum Acquisition {
    Acquired(LockGuard),
    /// Somebody else holds the lock.
    Held,
    /// The lock store could not be reached; treated as not acquired.
    Unavailable,
}

impl Acquisition {
    pub fn is_acquired(&self) -> bool {
        matches!(self, Acquisition::Acquired(_))
    }
}

/// Cluster-wide mutual exclusion keyed by string, backed by set-if-absent on the shared store.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn KeyValueStore>,
    call_timeout: Duration,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn KeyValueStore>, call_timeout: Duration) -> Self {
        Self {
            store,
            call_timeout,
        }
    }

    /// Tries once to take the lock. The entry expires after `ttl` even if the holder dies.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> Acquisition {
        let token = Uuid::new_v4().to_string();
        let attempt = bounded(
            "lock.acquire",
            self.call_timeout,
            self.store.set_if_absent(key, token.clone().into_bytes(), ttl),
        )
        .await;

        match attempt {
            Ok(true) => {
                debug!(key, "lock acquired");
                Acquisition::Acquired(LockGuard {
                    store: Some(self.store.clone()),
                    key: key.to_string(),
                    token,
                    call_timeout: self.call_timeout,
                })
            }
            Ok(false) => Acquisition::Held,
            Err(e) => {
                warn!(key, error = %e, "lock store unavailable, treating lock as not acquired");
                Acquisition::Unavailable
            }
        }
    }

    /// Removes the lock only if `token` still owns it. No-op when it is already gone.
    pub async fn release(&self, key: &str, token: &str) -> bool {
        release_owned(&self.store, key, token, self.call_timeout).await
    }
}

async fn release_owned(
    store: &Arc<dyn KeyValueStore>,
    key: &str,
    token: &str,
    call_timeout: Duration,
) -> bool {
    match bounded(
        "lock.release",
        call_timeout,
        store.delete_if_equals(key, token.as_bytes()),
    )
    .await
    {
        Ok(released) => {
            if !released {
                debug!(key, "lock already expired or taken over before release");
            }
            released
        }
        Err(e) => {
            warn!(key, error = %e, "failed to release lock, it will expire on its own");
            false
        }
    }
}

/// Proof of holding a lock. Release it explicitly; a guard dropped mid-flight
/// (e.g. a cancelled request) schedules its own release.
pub struct LockGuard {
    store: Option<Arc<dyn KeyValueStore>>,
    key: String,
    token: String,
    call_timeout: Duration,
}

impl LockGuard {
    pub async fn release(mut self) -> bool {
        match self.store.take() {
            Some(store) => release_owned(&store, &self.key, &self.token, self.call_timeout).await,
            None => false,
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let key = std::mem::take(&mut self.key);
            let token = std::mem::take(&mut self.token);
            let call_timeout = self.call_timeout;
            handle.spawn(async move {
                release_owned(&store, &key, &token, call_timeout).await;
            });
        }
    }
}
