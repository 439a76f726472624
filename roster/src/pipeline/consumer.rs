//! Applies domain events to the counter and caches: receive, classify, apply, acknowledge.

use crate::caching::{PageCache, StatusCache, StatusEntry};
use crate::coordination::{AppliedDelta, AtomicCounter};
use crate::domain::RegistrationView;
use crate::events::{Delivery, RegistrationEvent};
use crate::ports::EventLog;
use crate::timeouts::bounded;
use shared::Result;
use shared::config::CacheSettings;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One idempotent cache maintenance step derived from an event.
#[derive(Clone, Debug, PartialEq)]
pub enum CacheAction {
    AdjustCounter { event_id: Uuid, delta: i64 },
    InvalidatePages,
    SetStatus { identity: String, view: RegistrationView },
    InvalidateStatus { identity: String },
}

/// Maps an event to the cache actions it requires, in the order they are applied.
pub fn classify(event: &RegistrationEvent) -> Vec<CacheAction> {
    match event {
        RegistrationEvent::Created(e) => vec![
            CacheAction::AdjustCounter {
                event_id: e.event_id,
                delta: 1,
            },
            CacheAction::InvalidatePages,
            CacheAction::SetStatus {
                identity: e.identity_key.clone(),
                view: e.snapshot.clone(),
            },
        ],
        RegistrationEvent::Updated(e) => {
            let mut actions = vec![CacheAction::InvalidatePages];
            if let Some(previous) = &e.previous_identity_key {
                actions.push(CacheAction::InvalidateStatus {
                    identity: previous.clone(),
                });
            }
            actions.push(CacheAction::SetStatus {
                identity: e.identity_key.clone(),
                view: e.snapshot.clone(),
            });
            actions
        }
        RegistrationEvent::Cancelled(e) => vec![
            CacheAction::AdjustCounter {
                event_id: e.event_id,
                delta: -1,
            },
            CacheAction::InvalidatePages,
            CacheAction::InvalidateStatus {
                identity: e.identity_key.clone(),
            },
        ],
    }
}

/// What one pass over the log did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub dead_lettered: usize,
    /// A delivery failed and will be retried; the batch stopped there.
    pub retry_pending: bool,
}

impl BatchReport {
    pub fn is_idle(&self) -> bool {
        self.applied == 0 && self.dead_lettered == 0 && !self.retry_pending
    }
}

pub struct InvalidationConsumer {
    log: Arc<dyn EventLog>,
    counter: AtomicCounter,
    pages: PageCache,
    statuses: StatusCache,
    group: String,
    settings: CacheSettings,
}

impl InvalidationConsumer {
    pub fn new(
        log: Arc<dyn EventLog>,
        counter: AtomicCounter,
        pages: PageCache,
        statuses: StatusCache,
        group: impl Into<String>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            log,
            counter,
            pages,
            statuses,
            group: group.into(),
            settings,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Applies every action for `event`. Safe to repeat for the same event.
    pub async fn apply(&self, event: &RegistrationEvent) -> Result<()> {
        for action in classify(event) {
            match action {
                CacheAction::AdjustCounter { event_id, delta } => {
                    match self.counter.apply_once(event_id, delta).await? {
                        AppliedDelta::Applied(value) => {
                            debug!(%event_id, delta, value = ?value, "counter adjusted")
                        }
                        AppliedDelta::Duplicate => {}
                    }
                }
                CacheAction::InvalidatePages => {
                    self.pages.invalidate_all().await?;
                }
                CacheAction::SetStatus { identity, view } => {
                    self.statuses
                        .set(&identity, &StatusEntry::Present(view))
                        .await?;
                }
                CacheAction::InvalidateStatus { identity } => {
                    self.statuses.invalidate(&identity).await?;
                }
            }
        }
        Ok(())
    }

    /// Reads the next deliveries for this group and applies them in order.
    ///
    /// A failing delivery is retried on the next pass until it reaches `max_deliveries`, then it is
    /// dead-lettered and the consumer moves on. Later deliveries wait behind a retrying one so
    /// per-identity order holds.
    pub async fn process_batch(&self) -> Result<BatchReport> {
        let deliveries = bounded(
            "log.read_from",
            self.settings.store_timeout,
            self.log
                .read_from(&self.group, self.settings.consumer_batch_size),
        )
        .await?;

        let mut report = BatchReport::default();
        for delivery in deliveries {
            match self.handle(&delivery).await {
                Ok(()) => {
                    bounded(
                        "log.ack",
                        self.settings.store_timeout,
                        self.log.ack(&self.group, delivery.seq),
                    )
                    .await?;
                    report.applied += 1;
                }
                Err(e) => {
                    let attempts = bounded(
                        "log.record_failure",
                        self.settings.store_timeout,
                        self.log.record_failure(&self.group, delivery.seq),
                    )
                    .await?;
                    if attempts >= self.settings.max_deliveries {
                        error!(
                            alert = "dead_letter",
                            group = %self.group,
                            seq = delivery.seq,
                            attempts,
                            error = %e,
                            "event could not be applied, moving it to dead letters"
                        );
                        let parked = Delivery {
                            attempts,
                            ..delivery
                        };
                        let reason = e.to_string();
                        bounded(
                            "log.dead_letter",
                            self.settings.store_timeout,
                            self.log.dead_letter(&self.group, &parked, &reason),
                        )
                        .await?;
                        report.dead_lettered += 1;
                    } else {
                        warn!(
                            group = %self.group,
                            seq = delivery.seq,
                            attempts,
                            error = %e,
                            "event apply failed, will redeliver"
                        );
                        report.retry_pending = true;
                        break;
                    }
                }
            }
        }
        Ok(report)
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        let envelope = delivery.decode()?;
        self.apply(&envelope.event).await?;
        debug!(
            seq = envelope.seq,
            kind = envelope.event.kind(),
            registration = %envelope.event.registration_id(),
            identity = %envelope.partition_key,
            "event applied"
        );
        Ok(())
    }

    /// Runs until `shutdown` is cancelled. Errors are logged and retried, never fatal.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(group = %self.group, "invalidation consumer started");

        while !shutdown.is_cancelled() {
            let pause = match self.process_batch().await {
                Ok(report) if report.retry_pending => Some(self.settings.redelivery_backoff),
                Ok(report) if report.is_idle() => None,
                Ok(_) => continue,
                Err(e) => {
                    warn!(group = %self.group, error = %e, "event log unavailable, backing off");
                    Some(self.settings.consumer_poll_interval)
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = async {
                    match pause {
                        Some(delay) => tokio::time::sleep(delay).await,
                        None => {
                            self.log
                                .wait_for_append(self.settings.consumer_poll_interval)
                                .await
                        }
                    }
                } => {}
            }
        }

        info!(group = %self.group, "invalidation consumer stopped");
    }
}
