//! Sled-backed adapters: the registration source of truth and the durable event log.

pub mod sled_event_log;
pub mod sled_registry;

pub use sled_event_log::SledEventLog;
pub use sled_registry::SledRegistry;

use shared::Error;
use std::path::Path;

fn ensure_parent_dir(path: &Path) -> shared::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| Error::Internal(format!("Failed to create directory: {}", e)))?;
    }
    Ok(())
}

fn storage_err(e: sled::Error) -> Error {
    Error::Storage(e.to_string())
}
