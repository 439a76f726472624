use crate::domain::{RegistrationView, identity_key};
use crate::keys;
use crate::ports::{KeyValueStore, RegistrationSource};
use crate::timeouts::bounded;
use serde::{Deserialize, Serialize};
use shared::Result;
use shared::config::CacheSettings;
use std::sync::Arc;
use tracing::warn;

/// Snapshot of one identity, including the explicit "not registered" answer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "registration", rename_all = "snake_case")]
pub enum StatusEntry {
    Present(RegistrationView),
    Absent,
}

/// Per-identity cache. No locking: misses are single-row lookups and keys are not shared hot spots.
#[derive(Clone)]
pub struct StatusCache {
    store: Arc<dyn KeyValueStore>,
    settings: CacheSettings,
}

impl StatusCache {
    pub fn new(store: Arc<dyn KeyValueStore>, settings: CacheSettings) -> Self {
        Self { store, settings }
    }

    pub async fn get(&self, identity: &str) -> Result<Option<StatusEntry>> {
        let raw = bounded(
            "status.get",
            self.settings.store_timeout,
            self.store.get(&keys::status(&identity_key(identity))),
        )
        .await?;

        raw.map(|bytes| serde_json::from_slice::<StatusEntry>(&bytes).map_err(shared::Error::from))
            .transpose()
    }

    pub async fn set(&self, identity: &str, entry: &StatusEntry) -> Result<()> {
        let bytes = serde_json::to_vec(entry)?;
        bounded(
            "status.set",
            self.settings.store_timeout,
            self.store.set(
                &keys::status(&identity_key(identity)),
                bytes,
                self.settings.status_ttl,
            ),
        )
        .await
    }

    pub async fn invalidate(&self, identity: &str) -> Result<bool> {
        bounded(
            "status.invalidate",
            self.settings.store_timeout,
            self.store.delete(&keys::status(&identity_key(identity))),
        )
        .await
    }

    /// Cached status, or a single-row lookup against the source that is then cached.
    pub async fn get_or_load(
        &self,
        identity: &str,
        source: &dyn RegistrationSource,
    ) -> Result<StatusEntry> {
        match self.get(identity).await {
            Ok(Some(entry)) => return Ok(entry),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "status lookup failed, reading source"),
        }

        let found = bounded(
            "source.find_by_identity",
            self.settings.source_timeout,
            source.find_by_identity(&identity_key(identity)),
        )
        .await?;

        let entry = match found {
            Some(view) => StatusEntry::Present(view),
            None => StatusEntry::Absent,
        };
        if let Err(e) = self.set(identity, &entry).await {
            warn!(error = %e, "failed to cache identity status");
        }
        Ok(entry)
    }
}
