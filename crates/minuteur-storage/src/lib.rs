//! Minuteur Offline Storage Layer
//!
//! This crate provides the partitioned response store used by the offline
//! cache manager, with an in-memory store and a local disk store.

pub mod backend;
pub mod error;
pub mod local;
pub mod memory;

pub use backend::{CacheKey, CacheStore, StoredResponse};
pub use error::StorageError;
pub use local::LocalStore;
pub use memory::MemoryStore;
