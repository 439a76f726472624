use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single attendee registration as held by the source of truth.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub company: Option<String>,
    pub ticket_type: String,
    pub confirmation_token: String,
    pub internal_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(request: NewRegistration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            email: request.email.trim().to_string(),
            full_name: request.full_name.trim().to_string(),
            company: request.company,
            ticket_type: request.ticket_type,
            confirmation_token: Uuid::new_v4().simple().to_string(),
            internal_notes: request.internal_notes,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn identity_key(&self) -> String {
        identity_key(&self.email)
    }

    pub fn view(&self) -> RegistrationView {
        RegistrationView::from(self)
    }

    /// Applies the provided changes, returning the previous identity key when the email changed.
    pub fn apply(&mut self, changes: RegistrationChanges) -> Option<String> {
        let before = self.identity_key();
        if let Some(email) = changes.email {
            self.email = email.trim().to_string();
        }
        if let Some(full_name) = changes.full_name {
            self.full_name = full_name.trim().to_string();
        }
        if let Some(company) = changes.company {
            self.company = Some(company);
        }
        if let Some(ticket_type) = changes.ticket_type {
            self.ticket_type = ticket_type;
        }
        if let Some(notes) = changes.internal_notes {
            self.internal_notes = Some(notes);
        }
        self.updated_at = Utc::now();

        (self.identity_key() != before).then_some(before)
    }
}

/// Normalized identity used for key-status lookups and event partitioning.
pub fn identity_key(email: &str) -> String {
    email.trim().to_lowercase()
}

/// The read-only projection that is allowed into cache entries and events.
///
/// Only these fields survive serialization; tokens and internal notes stay in the source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationView {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub company: Option<String>,
    pub ticket_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Registration> for RegistrationView {
    fn from(registration: &Registration) -> Self {
        Self {
            id: registration.id,
            email: registration.email.clone(),
            full_name: registration.full_name.clone(),
            company: registration.company.clone(),
            ticket_type: registration.ticket_type.clone(),
            created_at: registration.created_at,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewRegistration {
    pub email: String,
    pub full_name: String,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default = "default_ticket_type")]
    pub ticket_type: String,
    #[serde(default)]
    pub internal_notes: Option<String>,
}

fn default_ticket_type() -> String {
    "general".to_string()
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RegistrationChanges {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub company: Option<String>,
    pub ticket_type: Option<String>,
    pub internal_notes: Option<String>,
}

/// Cache key for one page of the roster listing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub page: u32,
    pub size: u32,
}

impl PageKey {
    pub fn new(page: u32, size: u32) -> Self {
        Self { page, size }
    }

    pub fn offset(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.size as usize
    }
}

/// A page of projections exactly as the source of truth ordered them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CachedPage {
    pub records: Vec<RegistrationView>,
    pub cached_at: DateTime<Utc>,
}

impl CachedPage {
    pub fn new(records: Vec<RegistrationView>) -> Self {
        Self {
            records,
            cached_at: Utc::now(),
        }
    }
}

pub mod response {
    use super::{Registration, RegistrationView};
    use serde::Serialize;

    #[derive(Clone, Debug)]
    pub struct WriteOutcome {
        pub registration: Registration,
        /// False when the commit succeeded but the domain event could not be published.
        pub event_published: bool,
    }

    impl WriteOutcome {
        pub fn new(registration: Registration, event_published: bool) -> Self {
            Self {
                registration,
                event_published,
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct PageMeta {
        pub page: u32,
        pub size: u32,
        pub total: u64,
        pub total_pages: u64,
        pub has_next: bool,
        pub has_prev: bool,
    }

    impl PageMeta {
        pub fn new(page: u32, size: u32, total: u64) -> Self {
            let total_pages = if size == 0 {
                0
            } else {
                total.div_ceil(u64::from(size))
            };
            Self {
                page,
                size,
                total,
                total_pages,
                has_next: u64::from(page) < total_pages,
                has_prev: page > 1,
            }
        }
    }

    #[derive(Clone, Debug, Serialize)]
    pub struct PageResponse {
        pub records: Vec<RegistrationView>,
        pub meta: PageMeta,
    }

    #[derive(Clone, Debug, PartialEq, Serialize)]
    #[serde(tag = "status", content = "registration", rename_all = "snake_case")]
    pub enum StatusResponse {
        Registered(RegistrationView),
        NotRegistered,
    }
}
