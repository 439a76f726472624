pub mod caching;
pub mod coordination;
pub mod domain;
pub mod events;
pub mod keys;
pub mod persistence;
pub mod pipeline;
pub mod planes;
pub mod ports;
mod timeouts;

#[cfg(test)]
mod testing;

pub use caching::{PageCache, StatusCache};
pub use coordination::{AtomicCounter, DistributedLock};
pub use pipeline::{EventProducer, InvalidationConsumer};
pub use planes::control::CountReconciler;
pub use planes::data::{RegistrationOperations, RegistrationQueries};
