use roster::domain::RegistrationView;
use roster::domain::response::WriteOutcome;
use roster::events::DeadLetter;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
pub struct HealthResponse {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

#[derive(Serialize)]
pub struct RegistrationResponse {
    pub registration: RegistrationView,
    /// False when the change is saved but caches may lag until expiry or reconciliation.
    pub event_published: bool,
}

impl From<WriteOutcome> for RegistrationResponse {
    fn from(outcome: WriteOutcome) -> Self {
        Self {
            registration: outcome.registration.view(),
            event_published: outcome.event_published,
        }
    }
}

#[derive(Serialize)]
pub struct DeadLettersResponse {
    pub group: String,
    pub dead_letters: Vec<DeadLetter>,
}

#[derive(Serialize)]
pub struct ReconcileResponse {
    pub count: u64,
}
