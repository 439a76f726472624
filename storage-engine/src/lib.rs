//! Implementations of the shared cache/lock store.
//!
//! `MemoryStore` serves a single node and tests. `RedisStore` (feature `redis`) is what lets
//! several instances share locks, counters and cached pages.

pub mod memory_store;
#[cfg(feature = "redis")]
pub mod redis_store;

pub use memory_store::{CachedEntry, MemoryStore};
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;
