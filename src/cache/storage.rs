//! In-memory cache storage and a no-op backend for when caching is disabled.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::{CacheStorage, CachedEntry};

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Option<CachedEntry> {
    None // Always miss
  }

  fn store(&self, _key: &str, _value: Value, _cached_at: DateTime<Utc>) {
    // Discard
  }

  fn replace_value(&self, _key: &str, _value: Value) -> bool {
    false
  }

  fn remove(&self, _key: &str) {}

  fn clear(&self) {}

  fn len(&self) -> usize {
    0
  }
}

/// Process-local cache storage. Entries live until replaced or cleared.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CachedEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn entries(&self) -> MutexGuard<'_, HashMap<String, CachedEntry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Option<CachedEntry> {
    self.entries().get(key).cloned()
  }

  fn store(&self, key: &str, value: Value, cached_at: DateTime<Utc>) {
    self
      .entries()
      .insert(key.to_string(), CachedEntry { value, cached_at });
  }

  fn replace_value(&self, key: &str, value: Value) -> bool {
    match self.entries().get_mut(key) {
      Some(entry) => {
        entry.value = value;
        true
      }
      None => false,
    }
  }

  fn remove(&self, key: &str) {
    self.entries().remove(key);
  }

  fn clear(&self) {
    self.entries().clear();
  }

  fn len(&self) -> usize {
    self.entries().len()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;
  use serde_json::json;

  #[test]
  fn test_replace_value_keeps_timestamp() {
    let storage = MemoryStorage::new();
    let fetched = Utc::now() - Duration::seconds(30);
    storage.store("users", json!([1]), fetched);

    assert!(storage.replace_value("users", json!([1, 2])));

    let entry = storage.get("users").expect("entry exists");
    assert_eq!(entry.value, json!([1, 2]));
    assert_eq!(entry.cached_at, fetched);
  }

  #[test]
  fn test_replace_value_does_not_create_entries() {
    let storage = MemoryStorage::new();
    assert!(!storage.replace_value("users", json!([])));
    assert!(storage.is_empty());
  }

  #[test]
  fn test_remove_only_touches_one_key() {
    let storage = MemoryStorage::new();
    storage.store("a", json!(1), Utc::now());
    storage.store("b", json!(2), Utc::now());

    storage.remove("a");

    assert!(storage.get("a").is_none());
    assert_eq!(storage.get("b").map(|e| e.value), Some(json!(2)));
  }

  #[test]
  fn test_noop_storage_always_misses() {
    let storage = NoopStorage;
    storage.store("a", json!(1), Utc::now());
    assert!(storage.get("a").is_none());
    assert!(storage.is_empty());
  }
}
