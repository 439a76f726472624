use crate::events::RegistrationEvent;
use crate::ports::EventLog;
use crate::timeouts::bounded;
use shared::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Publishes committed mutations to the durable log, then fans them out to live subscribers.
///
/// The log append is what consumers rely on; the broadcast is a best-effort live feed.
#[derive(Clone)]
pub struct EventProducer {
    log: Arc<dyn EventLog>,
    event_broadcaster: Option<broadcast::Sender<RegistrationEvent>>,
    append_timeout: Duration,
}

impl EventProducer {
    pub fn new(log: Arc<dyn EventLog>, append_timeout: Duration) -> Self {
        Self {
            log,
            event_broadcaster: None,
            append_timeout,
        }
    }

    pub fn with_event_broadcaster(
        log: Arc<dyn EventLog>,
        append_timeout: Duration,
        broadcaster: broadcast::Sender<RegistrationEvent>,
    ) -> Self {
        Self {
            log,
            event_broadcaster: Some(broadcaster),
            append_timeout,
        }
    }

    /// Appends `event` and returns its sequence number.
    ///
    /// Call only after the mutation it describes has committed.
    pub async fn publish(&self, event: &RegistrationEvent) -> Result<u64> {
        let seq = bounded("log.append", self.append_timeout, self.log.append(event)).await?;

        if let Some(ref broadcaster) = self.event_broadcaster {
            match broadcaster.send(event.clone()) {
                Ok(subscriber_count) => {
                    tracing::debug!(
                        "Broadcasted {} event for '{}' to {} subscriber(s)",
                        event.kind(),
                        event.identity_key(),
                        subscriber_count
                    );
                }
                Err(_) => {
                    tracing::debug!(
                        "No subscribers for {} event on '{}'",
                        event.kind(),
                        event.identity_key()
                    );
                }
            }
        }

        tracing::debug!(seq, event_id = %event.event_id(), kind = event.kind(), "event published");
        Ok(seq)
    }

    /// Live feed of published events. `None` when no broadcaster is configured.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<RegistrationEvent>> {
        self.event_broadcaster.as_ref().map(|b| b.subscribe())
    }

    pub async fn shutdown(&self) -> Result<()> {
        bounded("log.flush", self.append_timeout, self.log.flush()).await?;
        tracing::info!("event log flushed");
        Ok(())
    }
}
