//! Time-bounded cache for fetched values.
//!
//! This module provides:
//! - `CacheStorage`: the storage backend trait, with in-memory and no-op implementations
//! - `CacheLayer`: lazy freshness checks against each key's registered lifetime
//! - `CacheResult`: a value tagged with where it was served from

mod layer;
mod storage;
mod traits;

pub use layer::CacheLayer;
pub use storage::{MemoryStorage, NoopStorage};
pub use traits::{CacheResult, CacheSource, CacheStorage, CachedEntry};
