//! Read-through cache for roster pages with single-flight rebuilds.
//!
//! A miss takes the page's distributed lock, re-checks the shared store, and only then asks the
//! source of truth. Contenders back off and re-read instead of recomputing. Every populated page
//! is also kept on a process-local last-known shelf that explicit invalidation leaves alone, so a
//! read can still be answered with older data when coordination is impossible.

use crate::coordination::{Acquisition, Backoff, DistributedLock};
use crate::domain::{CachedPage, PageKey};
use crate::keys;
use crate::ports::{KeyValueStore, RegistrationSource};
use crate::timeouts::bounded;
use moka::future::Cache;
use shared::config::CacheSettings;
use shared::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a page handed back by [`PageCache::get_or_load`] came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageOrigin {
    Cache,
    Source,
    /// Last-known copy served because a fresh one could not be coordinated.
    Stale,
}

#[derive(Clone, Debug)]
pub struct PageRead {
    pub page: CachedPage,
    pub origin: PageOrigin,
}

impl PageRead {
    fn new(page: CachedPage, origin: PageOrigin) -> Self {
        Self { page, origin }
    }
}

#[derive(Clone)]
pub struct PageCache {
    store: Arc<dyn KeyValueStore>,
    lock: DistributedLock,
    last_known: Cache<PageKey, CachedPage>,
    settings: CacheSettings,
}

impl PageCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        lock: DistributedLock,
        settings: CacheSettings,
    ) -> Self {
        let last_known = Cache::builder()
            .name("roster-last-known-pages")
            .max_capacity(settings.stale_page_capacity)
            .time_to_live(settings.stale_page_ttl)
            .build();

        Self {
            store,
            lock,
            last_known,
            settings,
        }
    }

    pub async fn get_page(&self, key: PageKey) -> Result<Option<CachedPage>> {
        let cache_key = keys::page(key);
        let raw = bounded(
            "page.get",
            self.settings.store_timeout,
            self.store.get(&cache_key),
        )
        .await?;

        let Some(bytes) = raw else {
            return Ok(None);
        };

        match serde_json::from_slice::<CachedPage>(&bytes) {
            Ok(page) => Ok(Some(page)),
            Err(e) => {
                warn!(key = %cache_key, error = %e, "discarding undecodable page entry");
                let dropped = bounded(
                    "page.discard",
                    self.settings.store_timeout,
                    self.store.delete(&cache_key),
                )
                .await;
                if let Err(e) = dropped {
                    debug!(key = %cache_key, error = %e, "undecodable page left to expire");
                }
                Ok(None)
            }
        }
    }

    pub async fn set_page(&self, key: PageKey, page: &CachedPage) -> Result<()> {
        self.last_known.insert(key, page.clone()).await;

        let bytes = serde_json::to_vec(page)?;
        bounded(
            "page.set",
            self.settings.store_timeout,
            self.store
                .set(&keys::page(key), bytes, self.settings.page_ttl),
        )
        .await
    }

    pub async fn invalidate_page(&self, key: PageKey) -> Result<bool> {
        bounded(
            "page.invalidate",
            self.settings.store_timeout,
            self.store.delete(&keys::page(key)),
        )
        .await
    }

    /// Drops page 1 for every page size, the minimum needed after an insert.
    pub async fn invalidate_first_page(&self) -> Result<u64> {
        bounded(
            "page.invalidate_first",
            self.settings.store_timeout,
            self.store.delete_prefix(&keys::first_page_prefix()),
        )
        .await
    }

    pub async fn invalidate_all(&self) -> Result<u64> {
        let removed = bounded(
            "page.invalidate_all",
            self.settings.store_timeout,
            self.store.delete_prefix(&keys::all_pages_prefix()),
        )
        .await?;
        debug!(removed, "invalidated all cached pages");
        Ok(removed)
    }

    /// Last page this process saw for `key`, regardless of TTL or invalidation.
    pub async fn last_known(&self, key: PageKey) -> Option<CachedPage> {
        self.last_known.get(&key).await
    }

    /// Read-through lookup with single-flight rebuild and stale fallback.
    pub async fn get_or_load(
        &self,
        key: PageKey,
        source: &dyn RegistrationSource,
    ) -> Result<PageRead> {
        if let Some(page) = self.lookup(key).await {
            return Ok(PageRead::new(page, PageOrigin::Cache));
        }

        let lock_key = keys::page_lock(key);
        let mut backoff = Backoff::new(
            self.settings.lock_backoff_base,
            self.settings.lock_backoff_max,
        );

        for attempt in 0..self.settings.lock_retry_attempts {
            match self.lock.try_acquire(&lock_key, self.settings.lock_ttl).await {
                Acquisition::Acquired(guard) => {
                    let result = self.fill(key, source).await;
                    guard.release().await;
                    return result;
                }
                Acquisition::Held => {
                    debug!(
                        page = key.page,
                        size = key.size,
                        attempt,
                        "page rebuild in progress elsewhere"
                    );
                    backoff.wait().await;
                    if let Some(page) = self.lookup(key).await {
                        return Ok(PageRead::new(page, PageOrigin::Cache));
                    }
                }
                Acquisition::Unavailable => return self.degrade(key, source).await,
            }
        }

        if let Some(page) = self.last_known(key).await {
            warn!(
                page = key.page,
                size = key.size,
                "lock contention exhausted, serving last-known page"
            );
            return Ok(PageRead::new(page, PageOrigin::Stale));
        }

        Err(Error::Unavailable(format!(
            "page {} (size {}) is being rebuilt",
            key.page, key.size
        )))
    }

    /// Shared-store misses and errors both count as a miss here.
    async fn lookup(&self, key: PageKey) -> Option<CachedPage> {
        match self.get_page(key).await {
            Ok(page) => page,
            Err(e) => {
                warn!(
                    page = key.page,
                    size = key.size,
                    error = %e,
                    "page lookup failed, treating as miss"
                );
                None
            }
        }
    }

    async fn fill(&self, key: PageKey, source: &dyn RegistrationSource) -> Result<PageRead> {
        // Another holder may have populated the entry between our miss and our acquisition.
        if let Some(page) = self.lookup(key).await {
            return Ok(PageRead::new(page, PageOrigin::Cache));
        }

        let page = CachedPage::new(self.fetch(key, source).await?);
        if let Err(e) = self.set_page(key, &page).await {
            warn!(page = key.page, size = key.size, error = %e, "failed to populate page cache");
        }
        info!(
            page = key.page,
            size = key.size,
            records = page.records.len(),
            "page rebuilt from source"
        );
        Ok(PageRead::new(page, PageOrigin::Source))
    }

    async fn degrade(&self, key: PageKey, source: &dyn RegistrationSource) -> Result<PageRead> {
        if let Some(page) = self.last_known(key).await {
            warn!(
                page = key.page,
                size = key.size,
                "lock store unavailable, serving last-known page"
            );
            return Ok(PageRead::new(page, PageOrigin::Stale));
        }

        warn!(page = key.page, size = key.size, "lock store unavailable, reading source directly");
        let page = CachedPage::new(self.fetch(key, source).await?);
        self.last_known.insert(key, page.clone()).await;
        Ok(PageRead::new(page, PageOrigin::Source))
    }

    async fn fetch(
        &self,
        key: PageKey,
        source: &dyn RegistrationSource,
    ) -> Result<Vec<crate::domain::RegistrationView>> {
        bounded(
            "source.fetch_page",
            self.settings.source_timeout,
            source.fetch_page(key.offset(), key.size as usize),
        )
        .await
    }
}
