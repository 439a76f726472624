//! Key layout in the shared store.

use crate::domain::PageKey;
use uuid::Uuid;

const NAMESPACE: &str = "roster";

pub fn counter() -> String {
    format!("{NAMESPACE}:count:registrations")
}

pub fn counter_lock() -> String {
    format!("{NAMESPACE}:lock:count:registrations")
}

pub fn page(key: PageKey) -> String {
    format!("{NAMESPACE}:page:{}:{}", key.page, key.size)
}

pub fn page_lock(key: PageKey) -> String {
    format!("{NAMESPACE}:lock:page:{}:{}", key.page, key.size)
}

/// Matches every cached page regardless of size.
pub fn all_pages_prefix() -> String {
    format!("{NAMESPACE}:page:")
}

/// Matches page 1 of every page size.
pub fn first_page_prefix() -> String {
    format!("{NAMESPACE}:page:1:")
}

pub fn status(identity_key: &str) -> String {
    format!("{NAMESPACE}:status:{identity_key}")
}

pub fn applied(event_id: Uuid) -> String {
    format!("{NAMESPACE}:applied:{event_id}")
}
