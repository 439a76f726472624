use crate::caching::{PageCache, PageOrigin, StatusCache, StatusEntry};
use crate::coordination::AtomicCounter;
use crate::domain::PageKey;
use crate::domain::response::{PageMeta, PageResponse, StatusResponse};
use crate::ports::RegistrationSource;
use shared::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, warn};

const NO_TOTAL: i64 = -1;

/// Read path over the caches, falling back to the source of truth.
#[derive(Clone)]
pub struct RegistrationQueries {
    source: Arc<dyn RegistrationSource>,
    counter: AtomicCounter,
    pages: PageCache,
    statuses: StatusCache,
    last_total: Arc<AtomicI64>,
}

impl RegistrationQueries {
    pub fn new(
        source: Arc<dyn RegistrationSource>,
        counter: AtomicCounter,
        pages: PageCache,
        statuses: StatusCache,
    ) -> Self {
        Self {
            source,
            counter,
            pages,
            statuses,
            last_total: Arc::new(AtomicI64::new(NO_TOTAL)),
        }
    }

    /// One page of the roster, newest first, with pagination metadata.
    pub async fn list(&self, page: u32, size: u32) -> Result<PageResponse> {
        let key = PageKey::new(page, size);
        let read = self.pages.get_or_load(key, self.source.as_ref()).await?;
        if read.origin == PageOrigin::Stale {
            debug!(page, size, "listing served from last-known page");
        }

        let total = self.total().await?;
        Ok(PageResponse {
            records: read.page.records,
            meta: PageMeta::new(page, size, total),
        })
    }

    /// Total registrations, or the last total this process saw when the count cannot be had.
    pub async fn total(&self) -> Result<u64> {
        match self.counter.get_or_reconcile(self.source.as_ref()).await {
            Ok(total) => {
                self.last_total.store(total as i64, Ordering::Relaxed);
                Ok(total)
            }
            Err(e) => {
                let last = self.last_total.load(Ordering::Relaxed);
                if last == NO_TOTAL {
                    return Err(e);
                }
                warn!(error = %e, last, "count unavailable, using last observed total");
                Ok(last as u64)
            }
        }
    }

    pub async fn status(&self, email: &str) -> Result<StatusResponse> {
        let entry = self
            .statuses
            .get_or_load(email, self.source.as_ref())
            .await?;

        Ok(match entry {
            StatusEntry::Present(view) => StatusResponse::Registered(view),
            StatusEntry::Absent => StatusResponse::NotRegistered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::{Acquisition, DistributedLock};
    use crate::keys;
    use crate::ports::KeyValueStore;
    use crate::testing::{CountingSource, FakeStore, fast_settings, views};
    use shared::Error;
    use std::time::Duration;

    fn queries(
        store: Arc<FakeStore>,
        source: Arc<CountingSource>,
    ) -> (RegistrationQueries, DistributedLock) {
        let mut settings = fast_settings();
        settings.count_retry_attempts = 2;
        settings.lock_backoff_base = Duration::from_millis(1);
        let lock = DistributedLock::new(store.clone(), settings.store_timeout);
        let counter = AtomicCounter::new(store.clone(), lock.clone(), settings.clone());
        let pages = PageCache::new(store.clone(), lock.clone(), settings.clone());
        let statuses = StatusCache::new(store, settings);
        (RegistrationQueries::new(source, counter, pages, statuses), lock)
    }

    #[tokio::test]
    async fn test_list_returns_page_with_meta() {
        let source = Arc::new(CountingSource::new(views(45), Duration::ZERO));
        let (queries, _) = queries(Arc::new(FakeStore::new()), source.clone());

        let response = queries.list(3, 20).await.unwrap();

        assert_eq!(response.records.len(), 5);
        assert_eq!(response.records[0].full_name, "Attendee 40");
        assert_eq!(response.meta.total, 45);
        assert_eq!(response.meta.total_pages, 3);
        assert!(!response.meta.has_next);
        assert!(response.meta.has_prev);

        queries.list(3, 20).await.unwrap();
        assert_eq!(source.fetches(), 1);
        assert_eq!(source.counts(), 1);
    }

    #[tokio::test]
    async fn test_total_falls_back_to_last_observed() {
        let store = Arc::new(FakeStore::new());
        let source = Arc::new(CountingSource::new(views(4), Duration::ZERO));
        let (queries, lock) = queries(store.clone(), source);

        assert_eq!(queries.total().await.unwrap(), 4);

        // Counter expires while a stuck holder keeps the refill lock.
        store.delete_prefix(&keys::counter()).await.unwrap();
        let held = lock
            .try_acquire(&keys::counter_lock(), Duration::from_secs(60))
            .await;
        assert!(matches!(held, Acquisition::Acquired(_)));

        assert_eq!(queries.total().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_total_without_history_surfaces_count_unavailable() {
        let store = Arc::new(FakeStore::new());
        let source = Arc::new(CountingSource::new(views(4), Duration::ZERO));
        let (queries, lock) = queries(store, source);
        let _held = lock
            .try_acquire(&keys::counter_lock(), Duration::from_secs(60))
            .await;

        assert!(matches!(queries.total().await, Err(Error::CountUnavailable)));
    }

    #[tokio::test]
    async fn test_status_reports_registered_and_not_registered() {
        let source = Arc::new(CountingSource::new(views(2), Duration::ZERO));
        let (queries, _) = queries(Arc::new(FakeStore::new()), source);

        assert!(matches!(
            queries.status("Attendee1@example.com").await.unwrap(),
            StatusResponse::Registered(v) if v.email == "attendee1@example.com"
        ));
        assert_eq!(
            queries.status("stranger@example.com").await.unwrap(),
            StatusResponse::NotRegistered
        );
    }
}
