use crate::domain::{Registration, RegistrationView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistrationEvent {
    Created(RegistrationCreated),
    Updated(RegistrationUpdated),
    Cancelled(RegistrationCancelled),
}

impl RegistrationEvent {
    pub fn created(registration: &Registration) -> Self {
        RegistrationEvent::Created(RegistrationCreated {
            event_id: Uuid::new_v4(),
            registration_id: registration.id,
            identity_key: registration.identity_key(),
            snapshot: registration.view(),
            occurred_at: Utc::now(),
        })
    }

    pub fn updated(registration: &Registration, previous_identity_key: Option<String>) -> Self {
        RegistrationEvent::Updated(RegistrationUpdated {
            event_id: Uuid::new_v4(),
            registration_id: registration.id,
            identity_key: registration.identity_key(),
            previous_identity_key,
            snapshot: registration.view(),
            occurred_at: Utc::now(),
        })
    }

    pub fn cancelled(registration: &Registration) -> Self {
        RegistrationEvent::Cancelled(RegistrationCancelled {
            event_id: Uuid::new_v4(),
            registration_id: registration.id,
            identity_key: registration.identity_key(),
            occurred_at: Utc::now(),
        })
    }

    pub fn event_id(&self) -> Uuid {
        match self {
            RegistrationEvent::Created(e) => e.event_id,
            RegistrationEvent::Updated(e) => e.event_id,
            RegistrationEvent::Cancelled(e) => e.event_id,
        }
    }

    /// Partition key for ordering-aware transports.
    pub fn identity_key(&self) -> &str {
        match self {
            RegistrationEvent::Created(e) => &e.identity_key,
            RegistrationEvent::Updated(e) => &e.identity_key,
            RegistrationEvent::Cancelled(e) => &e.identity_key,
        }
    }

    pub fn registration_id(&self) -> Uuid {
        match self {
            RegistrationEvent::Created(e) => e.registration_id,
            RegistrationEvent::Updated(e) => e.registration_id,
            RegistrationEvent::Cancelled(e) => e.registration_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RegistrationEvent::Created(_) => "created",
            RegistrationEvent::Updated(_) => "updated",
            RegistrationEvent::Cancelled(_) => "cancelled",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationCreated {
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub identity_key: String,
    pub snapshot: RegistrationView,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationUpdated {
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub identity_key: String,
    pub previous_identity_key: Option<String>,
    pub snapshot: RegistrationView,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationCancelled {
    pub event_id: Uuid,
    pub registration_id: Uuid,
    pub identity_key: String,
    pub occurred_at: DateTime<Utc>,
}

/// What the log persists for each appended event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub seq: u64,
    pub partition_key: String,
    pub appended_at: DateTime<Utc>,
    pub event: RegistrationEvent,
}

/// One delivery attempt handed to a consumer group.
///
/// The payload stays raw so a message that no longer decodes can still be dead-lettered.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub seq: u64,
    pub attempts: u32,
    pub payload: Vec<u8>,
}

impl Delivery {
    pub fn decode(&self) -> shared::Result<EventEnvelope> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub seq: u64,
    pub group: String,
    pub attempts: u32,
    pub reason: String,
    pub payload: String,
    pub dead_lettered_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewRegistration;

    #[test]
    fn test_event_tagging_and_accessors() {
        let registration = Registration::new(NewRegistration {
            email: "Grace@Navy.mil".into(),
            full_name: "Grace Hopper".into(),
            company: None,
            ticket_type: "general".into(),
            internal_notes: Some("do not cache".into()),
        });
        let event = RegistrationEvent::created(&registration);

        assert_eq!(event.kind(), "created");
        assert_eq!(event.identity_key(), "grace@navy.mil");
        assert_eq!(event.registration_id(), registration.id);

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"created\""));
        assert!(!json.contains("do not cache"));
        assert!(!json.contains(&registration.confirmation_token));
    }
}
