//! Core traits and types for the caching system.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// A cached value and when it was fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry {
  /// The last fetched value
  pub value: Value,
  /// When the value was fetched
  pub cached_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// The storage only holds entries; deciding whether an entry is fresh is the job of
/// [`CacheLayer`](super::CacheLayer).
pub trait CacheStorage: Send + Sync {
  /// Get the entry for `key`.
  fn get(&self, key: &str) -> Option<CachedEntry>;

  /// Store `value` under `key`, replacing any previous entry and its timestamp.
  fn store(&self, key: &str, value: Value, cached_at: DateTime<Utc>);

  /// Overwrite the value of an existing entry, keeping its timestamp.
  ///
  /// Returns false (and stores nothing) when there is no entry for `key`.
  fn replace_value(&self, key: &str, value: Value) -> bool;

  /// Remove the entry for `key`.
  fn remove(&self, key: &str);

  /// Remove every entry.
  fn clear(&self);

  /// Number of entries held.
  fn len(&self) -> usize;

  fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

/// A resolved value plus metadata about where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheResult {
  /// The actual data
  pub data: Value,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if served from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl CacheResult {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: Value) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from a fresh cache entry.
  pub fn from_cache(entry: CachedEntry) -> Self {
    Self {
      data: entry.value,
      source: CacheSource::CacheFresh,
      cached_at: Some(entry.cached_at),
    }
  }

  pub fn is_cached(&self) -> bool {
    self.source == CacheSource::CacheFresh
  }
}

/// Where a value returned by the store came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from the fetch handler
  Network,
  /// Data from cache, still within its lifetime
  CacheFresh,
}
