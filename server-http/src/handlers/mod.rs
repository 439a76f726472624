pub mod admin;
pub mod events;
pub mod health;
pub mod registrations;

pub use admin::{list_dead_letters, reconcile_count};
pub use events::stream_events;
pub use health::health_check;
pub use registrations::{
    cancel_registration, create_registration, list_registrations, registration_status,
    update_registration,
};
