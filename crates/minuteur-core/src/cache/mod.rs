//! Offline cache management module

mod entry;
mod manager;
pub mod policy;

pub use entry::{to_response, to_stored};
pub use manager::{CacheStats, OfflineCacheManager, spawn_refresh_task};
