use roster::events::RegistrationEvent;
use roster::persistence::{SledEventLog, SledRegistry};
use roster::ports::{EventLog, KeyValueStore};
use roster::{
    AtomicCounter, CountReconciler, DistributedLock, EventProducer, InvalidationConsumer,
    PageCache, RegistrationOperations, RegistrationQueries, StatusCache,
};
use shared::config::CacheSettings;
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub operations: Arc<RegistrationOperations>,
    pub queries: Arc<RegistrationQueries>,
    pub producer: Arc<EventProducer>,
    pub consumer: Arc<InvalidationConsumer>,
    pub reconciler: Arc<CountReconciler>,
    pub event_log: Arc<dyn EventLog>,
    pub event_channel: broadcast::Sender<RegistrationEvent>,
}

impl AppState {
    /// Wires the core services over one shared store, one registry and one event log.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        registry: Arc<SledRegistry>,
        event_log: Arc<SledEventLog>,
        settings: CacheSettings,
        consumer_group: &str,
    ) -> Self {
        let lock = DistributedLock::new(store.clone(), settings.store_timeout);
        let counter = AtomicCounter::new(store.clone(), lock.clone(), settings.clone());
        let pages = PageCache::new(store.clone(), lock, settings.clone());
        let statuses = StatusCache::new(store, settings.clone());

        let (event_tx, _event_rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let producer = EventProducer::with_event_broadcaster(
            event_log.clone(),
            settings.store_timeout,
            event_tx.clone(),
        );

        let operations = RegistrationOperations::new(
            registry.clone(),
            producer.clone(),
            counter.clone(),
            pages.clone(),
            statuses.clone(),
            settings.clone(),
        );
        let queries = RegistrationQueries::new(
            registry.clone(),
            counter.clone(),
            pages.clone(),
            statuses.clone(),
        );
        let consumer = InvalidationConsumer::new(
            event_log.clone(),
            counter.clone(),
            pages,
            statuses,
            consumer_group,
            settings.clone(),
        );
        let reconciler = CountReconciler::new(counter, registry, settings.reconcile_interval);

        Self {
            operations: Arc::new(operations),
            queries: Arc::new(queries),
            producer: Arc::new(producer),
            consumer: Arc::new(consumer),
            reconciler: Arc::new(reconciler),
            event_log,
            event_channel: event_tx,
        }
    }
}
