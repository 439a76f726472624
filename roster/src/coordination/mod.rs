pub mod backoff;
pub mod counter;
pub mod lock;

pub use backoff::Backoff;
pub use counter::{AppliedDelta, AtomicCounter};
pub use lock::{Acquisition, DistributedLock, LockGuard};
