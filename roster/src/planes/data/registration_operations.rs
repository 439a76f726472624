use crate::caching::{PageCache, StatusCache};
use crate::coordination::AtomicCounter;
use crate::domain::response::WriteOutcome;
use crate::domain::{NewRegistration, Registration, RegistrationChanges};
use crate::events::RegistrationEvent;
use crate::pipeline::EventProducer;
use crate::ports::RegistrationRepository;
use crate::timeouts::bounded;
use shared::Result;
use shared::config::CacheSettings;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Write path: commit to the source of truth, publish, then nudge the caches.
///
/// Cache maintenance here is only a head start for read-your-writes. The consumer does the full
/// job, and both go through the same applied marker so the counter moves once per event.
#[derive(Clone)]
pub struct RegistrationOperations {
    repository: Arc<dyn RegistrationRepository>,
    producer: EventProducer,
    counter: AtomicCounter,
    pages: PageCache,
    statuses: StatusCache,
    settings: CacheSettings,
}

impl RegistrationOperations {
    pub fn new(
        repository: Arc<dyn RegistrationRepository>,
        producer: EventProducer,
        counter: AtomicCounter,
        pages: PageCache,
        statuses: StatusCache,
        settings: CacheSettings,
    ) -> Self {
        Self {
            repository,
            producer,
            counter,
            pages,
            statuses,
            settings,
        }
    }

    pub async fn register(&self, request: NewRegistration) -> Result<WriteOutcome> {
        let registration = bounded(
            "repository.insert",
            self.settings.source_timeout,
            self.repository.insert(Registration::new(request)),
        )
        .await?;
        info!(id = %registration.id, "registration created");

        let event = RegistrationEvent::created(&registration);
        let published = self.publish(&event).await;
        self.apply_counter(&event, 1).await;
        self.invalidate_first_page().await;
        self.invalidate_status(&registration.identity_key()).await;

        Ok(WriteOutcome::new(registration, published))
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Registration>> {
        bounded(
            "repository.get",
            self.settings.source_timeout,
            self.repository.get(id),
        )
        .await
    }

    pub async fn update(&self, id: Uuid, changes: RegistrationChanges) -> Result<WriteOutcome> {
        let (registration, previous) = bounded(
            "repository.update",
            self.settings.source_timeout,
            self.repository.update(id, changes),
        )
        .await?;
        info!(id = %registration.id, identity_changed = previous.is_some(), "registration updated");

        let event = RegistrationEvent::updated(&registration, previous.clone());
        let published = self.publish(&event).await;
        self.invalidate_first_page().await;
        if let Some(previous) = previous {
            self.invalidate_status(&previous).await;
        }
        self.invalidate_status(&registration.identity_key()).await;

        Ok(WriteOutcome::new(registration, published))
    }

    pub async fn cancel(&self, id: Uuid) -> Result<WriteOutcome> {
        let registration = bounded(
            "repository.delete",
            self.settings.source_timeout,
            self.repository.delete(id),
        )
        .await?;
        info!(id = %registration.id, "registration cancelled");

        let event = RegistrationEvent::cancelled(&registration);
        let published = self.publish(&event).await;
        self.apply_counter(&event, -1).await;
        self.invalidate_first_page().await;
        self.invalidate_status(&registration.identity_key()).await;

        Ok(WriteOutcome::new(registration, published))
    }

    /// The mutation is already committed, so a failed publish is reported, never rolled back.
    async fn publish(&self, event: &RegistrationEvent) -> bool {
        match self.producer.publish(event).await {
            Ok(_) => true,
            Err(e) => {
                warn!(
                    event_id = %event.event_id(),
                    kind = event.kind(),
                    error = %e,
                    "committed change not published, caches catch up on expiry or reconcile"
                );
                false
            }
        }
    }

    async fn apply_counter(&self, event: &RegistrationEvent, delta: i64) {
        if let Err(e) = self.counter.apply_once(event.event_id(), delta).await {
            warn!(event_id = %event.event_id(), error = %e, "direct counter update skipped");
        }
    }

    async fn invalidate_first_page(&self) {
        if let Err(e) = self.pages.invalidate_first_page().await {
            warn!(error = %e, "first page invalidation skipped");
        }
    }

    async fn invalidate_status(&self, identity: &str) {
        if let Err(e) = self.statuses.invalidate(identity).await {
            warn!(identity, error = %e, "status invalidation skipped");
        }
    }
}
