//! Cache layer that decides whether a cached value may be served.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tracing::trace;

use super::storage::MemoryStorage;
use super::traits::{CacheStorage, CachedEntry};
use crate::registry::Registry;

/// Cache layer over a storage backend.
///
/// Freshness is evaluated lazily on read: an entry is fresh while
/// `now - cached_at <= lifetime`, where the lifetime comes from the key's current
/// registration; a key with no registration is never fresh. Stale entries are never swept; they stay until overwritten or cleared.
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new<S: CacheStorage + 'static>(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
    }
  }

  /// Whether `key` has an entry young enough to serve at `now`.
  pub fn is_fresh(&self, key: &str, registry: &Registry, now: DateTime<Utc>) -> bool {
    self
      .storage
      .get(key)
      .map(|entry| self.entry_is_fresh(key, &entry, registry, now))
      .unwrap_or(false)
  }

  /// The entry for `key` if it is fresh at `now`.
  pub fn get_fresh(&self, key: &str, registry: &Registry, now: DateTime<Utc>) -> Option<CachedEntry> {
    self
      .storage
      .get(key)
      .filter(|entry| self.entry_is_fresh(key, entry, registry, now))
  }

  fn entry_is_fresh(&self, key: &str, entry: &CachedEntry, registry: &Registry, now: DateTime<Utc>) -> bool {
    let Some(registration) = registry.get(key) else {
      trace!(key, "No registration, cache entry is never fresh");
      return false;
    };
    let age = now - entry.cached_at;
    let lifetime = registration.cache_duration;
    trace!(
      key,
      age_ms = age.num_milliseconds(),
      lifetime_ms = lifetime.num_milliseconds(),
      "Checking cache freshness"
    );
    age <= lifetime
  }

  /// The entry for `key`, fresh or not.
  pub fn get(&self, key: &str) -> Option<CachedEntry> {
    self.storage.get(key)
  }

  pub fn set(&self, key: &str, value: Value, now: DateTime<Utc>) {
    self.storage.store(key, value, now);
  }

  /// Overwrite a cached value without renewing its freshness window.
  pub fn replace_value(&self, key: &str, value: Value) -> bool {
    self.storage.replace_value(key, value)
  }

  /// Clear one key, or everything when `key` is `None`.
  pub fn clear(&self, key: Option<&str>) {
    match key {
      Some(key) => self.storage.remove(key),
      None => self.storage.clear(),
    }
  }

  pub fn len(&self) -> usize {
    self.storage.len()
  }

  pub fn is_empty(&self) -> bool {
    self.storage.is_empty()
  }
}

impl Default for CacheLayer {
  fn default() -> Self {
    Self::new(MemoryStorage::new())
  }
}

impl Clone for CacheLayer {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::NoopStorage;
  use crate::registry::handler;
  use chrono::Duration;
  use serde_json::json;

  fn registry_with(key: &str, lifetime_ms: i64) -> Registry {
    let registry = Registry::new();
    registry.register(
      key,
      handler(|_| async { Ok(Value::Null) }),
      Duration::milliseconds(lifetime_ms),
    );
    registry
  }

  #[test]
  fn test_fresh_within_lifetime_inclusive() {
    let registry = registry_with("users", 1000);
    let cache = CacheLayer::default();
    let t0 = Utc::now();
    cache.set("users", json!([]), t0);

    assert!(cache.is_fresh("users", &registry, t0));
    assert!(cache.is_fresh("users", &registry, t0 + Duration::milliseconds(1000)));
    assert!(!cache.is_fresh("users", &registry, t0 + Duration::milliseconds(1001)));
  }

  #[test]
  fn test_never_fresh_without_registration() {
    let registry = Registry::new();
    let cache = CacheLayer::default();
    let t0 = Utc::now();
    cache.set("users", json!([]), t0);

    assert!(!cache.is_fresh("users", &registry, t0));
    assert!(cache.get_fresh("users", &registry, t0).is_none());
    assert!(!cache.is_fresh("users", &registry, t0 + Duration::milliseconds(1)));
  }

  #[test]
  fn test_missing_entry_is_not_fresh() {
    let registry = registry_with("users", 1000);
    let cache = CacheLayer::default();
    assert!(!cache.is_fresh("users", &registry, Utc::now()));
  }

  #[test]
  fn test_reregistration_changes_lifetime_of_existing_entry() {
    let registry = registry_with("users", 10_000);
    let cache = CacheLayer::default();
    let t0 = Utc::now();
    cache.set("users", json!([1]), t0);

    registry.register(
      "users",
      handler(|_| async { Ok(Value::Null) }),
      Duration::milliseconds(10),
    );

    assert!(!cache.is_fresh("users", &registry, t0 + Duration::milliseconds(50)));
    // Entry itself survives re-registration
    assert_eq!(cache.get("users").map(|e| e.value), Some(json!([1])));
  }

  #[test]
  fn test_clear_all_and_single() {
    let cache = CacheLayer::default();
    let now = Utc::now();
    cache.set("a", json!(1), now);
    cache.set("b", json!(2), now);

    cache.clear(Some("a"));
    assert!(cache.get("a").is_none());
    assert_eq!(cache.len(), 1);

    cache.clear(None);
    assert!(cache.is_empty());
  }

  #[test]
  fn test_disabled_cache_never_serves() {
    let registry = registry_with("users", 60_000);
    let cache = CacheLayer::new(NoopStorage);
    let now = Utc::now();
    cache.set("users", json!([1]), now);

    assert!(cache.get_fresh("users", &registry, now).is_none());
  }
}
