pub mod page_cache;
pub mod status_cache;

pub use page_cache::{PageCache, PageOrigin, PageRead};
pub use status_cache::{StatusCache, StatusEntry};
