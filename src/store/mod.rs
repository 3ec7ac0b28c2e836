//! The shared store: keyed state, fetch registry, cache and subscribers.
//!
//! A `Store` is a cheap handle; clones share the same state. Construct one at startup and
//! pass it to whatever needs it. Separate `Store::new` calls give fully independent stores.

mod local;
mod subscribers;
mod sync;

pub use local::{MutationStatus, DEFAULT_ID_KEY};
pub use subscribers::{Callback, SubscriberId, Subscription};
pub use sync::{FetchRequest, Method};

use chrono::Duration;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::cache::CacheLayer;
use crate::clock::{Clock, SystemClock};
use crate::registry::{FetchFn, Registry, DEFAULT_CACHE_DURATION_MS};
use crate::retry::RetryPolicy;
use subscribers::Subscribers;

/// Full store state: key → value.
pub type State = BTreeMap<String, Value>;

#[derive(Clone)]
pub struct Store {
  state: Arc<Mutex<State>>,
  registry: Registry,
  cache: CacheLayer,
  subscribers: Subscribers,
  retry: RetryPolicy,
  clock: Arc<dyn Clock>,
}

impl Store {
  /// Create a store holding `initial`, with an in-memory cache, the default retry policy
  /// and the system clock.
  pub fn new(initial: State) -> Self {
    Self {
      state: Arc::new(Mutex::new(initial)),
      registry: Registry::new(),
      cache: CacheLayer::default(),
      subscribers: Subscribers::default(),
      retry: RetryPolicy::default(),
      clock: Arc::new(SystemClock),
    }
  }

  pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn with_cache(mut self, cache: CacheLayer) -> Self {
    self.cache = cache;
    self
  }

  /// Snapshot of the whole state.
  pub fn get_state(&self) -> State {
    self.lock_state().clone()
  }

  /// Current value under `key`.
  pub fn get(&self, key: &str) -> Option<Value> {
    self.lock_state().get(key).cloned()
  }

  /// Shallow-merge `partial` into the state and broadcast.
  pub fn set_state<I>(&self, partial: I)
  where
    I: IntoIterator<Item = (String, Value)>,
  {
    let snapshot = {
      let mut state = self.lock_state();
      state.extend(partial);
      state.clone()
    };
    self.subscribers.notify(&snapshot);
  }

  /// Replace the value under one key and broadcast. The sole mutation primitive used by
  /// fetches and local edits.
  pub(crate) fn replace(&self, key: &str, value: Value) {
    self.set_state([(key.to_string(), value)]);
  }

  /// Register `callback` to be called with the full state after every change.
  pub fn subscribe<F>(&self, callback: F) -> Subscription
  where
    F: Fn(&State) + Send + Sync + 'static,
  {
    self.subscribers.subscribe(Arc::new(callback))
  }

  pub fn subscriber_count(&self) -> usize {
    self.subscribers.len()
  }

  /// Drop the cache entry for `key`, or every entry when `key` is `None`.
  pub fn clear_cache(&self, key: Option<&str>) {
    debug!(key = key.unwrap_or("*"), "Clearing cache");
    self.cache.clear(key);
  }

  /// Register a fetch handler with the default 60s cache lifetime.
  pub fn register_api(&self, key: &str, handler: FetchFn) {
    self.register_api_with_lifetime(key, handler, Duration::milliseconds(DEFAULT_CACHE_DURATION_MS));
  }

  pub fn register_api_with_lifetime(&self, key: &str, handler: FetchFn, cache_duration: Duration) {
    self.registry.register(key, handler, cache_duration);
  }

  pub fn registry(&self) -> &Registry {
    &self.registry
  }

  pub fn cache(&self) -> &CacheLayer {
    &self.cache
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    self.retry
  }

  fn lock_state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl Default for Store {
  fn default() -> Self {
    Self::new(State::new())
  }
}

impl std::fmt::Debug for Store {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Store")
      .field("keys", &self.lock_state().keys().collect::<Vec<_>>())
      .field("registry", &self.registry)
      .field("cached", &self.cache.len())
      .field("retry", &self.retry)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  #[test]
  fn test_set_state_merges_and_broadcasts() {
    let mut initial = State::new();
    initial.insert("a".to_string(), json!(1));
    let store = Store::new(initial);

    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    store.subscribe(move |state| {
      assert_eq!(state.get("a"), Some(&json!(1)));
      c.fetch_add(1, Ordering::SeqCst);
    });

    store.set_state([("b".to_string(), json!(2))]);

    assert_eq!(store.get("a"), Some(json!(1)));
    assert_eq!(store.get("b"), Some(json!(2)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn test_clones_share_state() {
    let store = Store::default();
    let other = store.clone();
    other.set_state([("k".to_string(), json!("v"))]);
    assert_eq!(store.get("k"), Some(json!("v")));
  }

  #[test]
  fn test_independent_stores_do_not_share() {
    let a = Store::default();
    let b = Store::default();
    a.set_state([("k".to_string(), json!(1))]);
    assert!(b.get("k").is_none());
  }

  #[test]
  fn test_subscriber_may_reenter_store() {
    let store = Store::default();
    let inner = store.clone();
    store.subscribe(move |state| {
      if !state.contains_key("echo") {
        inner.set_state([("echo".to_string(), json!(true))]);
      }
    });

    store.set_state([("k".to_string(), json!(1))]);
    assert_eq!(store.get("echo"), Some(json!(true)));
  }
}
