use crate::coordination::AtomicCounter;
use crate::ports::RegistrationSource;
use shared::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Periodically overwrites the counter with the source of truth's count.
///
/// Last write wins: an increment landing between the count and the set is lost until the next pass.
#[derive(Clone)]
pub struct CountReconciler {
    counter: AtomicCounter,
    source: Arc<dyn RegistrationSource>,
    interval: Duration,
}

impl CountReconciler {
    pub fn new(
        counter: AtomicCounter,
        source: Arc<dyn RegistrationSource>,
        interval: Duration,
    ) -> Self {
        Self {
            counter,
            source,
            interval,
        }
    }

    pub async fn reconcile_now(&self) -> Result<u64> {
        self.counter.reconcile(self.source.as_ref()).await
    }

    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; a fresh counter is refilled lazily by readers instead.
        ticker.tick().await;

        info!(interval_secs = self.interval.as_secs(), "count reconciler started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    match self.reconcile_now().await {
                        Ok(count) => info!(count, "counter reconciled"),
                        Err(e) => warn!(
                            error = %e,
                            "counter reconciliation failed, will retry next interval"
                        ),
                    }
                }
            }
        }
        info!("count reconciler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::DistributedLock;
    use crate::testing::{CountingSource, FakeStore, fast_settings, views};

    fn reconciler(
        store: Arc<FakeStore>,
        source: Arc<CountingSource>,
        every: Duration,
    ) -> (CountReconciler, AtomicCounter) {
        let settings = fast_settings();
        let lock = DistributedLock::new(store.clone(), settings.store_timeout);
        let counter = AtomicCounter::new(store, lock, settings);
        (CountReconciler::new(counter.clone(), source, every), counter)
    }

    #[tokio::test]
    async fn test_reconcile_now_corrects_drift() {
        let source = Arc::new(CountingSource::new(views(9), Duration::ZERO));
        let (reconciler, counter) =
            reconciler(Arc::new(FakeStore::new()), source, Duration::from_secs(60));
        counter.set(3).await.unwrap();

        assert_eq!(reconciler.reconcile_now().await.unwrap(), 9);
        assert_eq!(counter.get().await.unwrap(), Some(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_reconciles_on_interval_until_cancelled() {
        let source = Arc::new(CountingSource::new(views(2), Duration::ZERO));
        let (reconciler, counter) =
            reconciler(Arc::new(FakeStore::new()), source.clone(), Duration::from_secs(30));
        counter.set(100).await.unwrap();

        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { reconciler.run(token).await });

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(counter.get().await.unwrap(), Some(2));
        assert_eq!(source.counts(), 1);

        shutdown.cancel();
        task.await.unwrap();
    }
}
