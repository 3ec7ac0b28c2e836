//! Per-key query handle for UI bindings.
//!
//! Inspired by TanStack Query, a `KeyQuery` tracks loading and error state for one store
//! key while the data itself stays in the [`Store`]. Async work runs on spawned tasks and
//! is collected by [`KeyQuery::poll`].
//!
//! # Example
//!
//! ```ignore
//! let mut users = KeyQuery::new(store.clone(), "users");
//!
//! // Start fetching
//! users.fetch();
//!
//! // In event loop tick
//! if users.poll() {
//!     // State changed, trigger re-render
//! }
//!
//! // In render
//! if users.is_loading() {
//!     render_spinner();
//! } else if let Some(list) = users.state() {
//!     render_list(&list);
//! }
//! ```

use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::store::{FetchRequest, Method, MutationStatus, Store, Subscription};

/// Request status of a query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStatus {
  /// Nothing has been requested yet
  Idle,
  /// A request is in flight
  Loading,
  /// The last request finished without error
  Settled,
  /// The last request failed
  Error(String),
}

impl QueryStatus {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryStatus::Loading)
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryStatus::Error(_))
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryStatus::Error(e) => Some(e),
      _ => None,
    }
  }
}

type Outcome = Result<Option<Value>, SyncError>;

/// Binding for a single store key.
pub struct KeyQuery {
  store: Store,
  key: String,
  status: QueryStatus,
  receiver: Option<mpsc::UnboundedReceiver<Outcome>>,
  changed: Arc<AtomicBool>,
  subscription: Option<Subscription>,
}

impl KeyQuery {
  /// Bind to `key`. Broadcasts that change the value under `key` are reported by the
  /// next [`poll`](Self::poll); changes to other keys are not.
  pub fn new(store: Store, key: impl Into<String>) -> Self {
    let key = key.into();
    let changed = Arc::new(AtomicBool::new(false));
    let flag = changed.clone();
    let watched = key.clone();
    let last_seen = Mutex::new(store.get(&key));
    let subscription = store.subscribe(move |state| {
      let current = state.get(&watched);
      let mut last = last_seen.lock().unwrap_or_else(PoisonError::into_inner);
      if last.as_ref() != current {
        *last = current.cloned();
        flag.store(true, Ordering::SeqCst);
      }
    });

    Self {
      store,
      key,
      status: QueryStatus::Idle,
      receiver: None,
      changed,
      subscription: Some(subscription),
    }
  }

  pub fn key(&self) -> &str {
    &self.key
  }

  /// Current value under the key.
  pub fn state(&self) -> Option<Value> {
    self.store.get(&self.key)
  }

  pub fn status(&self) -> &QueryStatus {
    &self.status
  }

  pub fn is_loading(&self) -> bool {
    self.status.is_loading()
  }

  pub fn is_error(&self) -> bool {
    self.status.is_error()
  }

  pub fn error(&self) -> Option<&str> {
    self.status.error()
  }

  /// Start a read if not already loading. A fresh cached value satisfies it without a
  /// network call.
  pub fn fetch(&mut self) {
    if self.status.is_loading() {
      return;
    }
    self.start(FetchRequest::get(self.key.clone()));
  }

  /// Read with a URL-path suffix, e.g. `/5`.
  pub fn fetch_path(&mut self, url_path: impl Into<String>) {
    if self.status.is_loading() {
      return;
    }
    self.start(FetchRequest::get(self.key.clone()).with_url_path(url_path));
  }

  /// Drop the key's cache entry and fetch again, replacing any pending request.
  pub fn refresh_data(&mut self) {
    self.store.clear_cache(Some(&self.key));
    self.receiver = None;
    self.start(FetchRequest::get(self.key.clone()));
  }

  /// Send a write through the key's handler, replacing any pending request.
  ///
  /// With `keep_cache` false the response updates state but leaves the cache untouched.
  pub fn execute_mutation(&mut self, method: Method, payload: Option<Value>, keep_cache: bool) {
    let mut request = FetchRequest::new(self.key.clone(), method).keep_cache(keep_cache);
    request.payload = payload;
    self.receiver = None;
    self.start(request);
  }

  /// Remove a record locally.
  pub fn delete_item(&self, id_key: &str, id: impl Into<Value>) {
    self.store.delete_local(&self.key, id_key, id);
  }

  /// Merge `fields` into a record locally.
  pub fn edit_item(&self, id_key: &str, id: impl Into<Value>, fields: Value) -> MutationStatus {
    self.store.edit_local(&self.key, id_key, id, fields).into()
  }

  /// Collect results and broadcasts since the last poll.
  ///
  /// Returns `true` if anything changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = self.changed.swap(false, Ordering::SeqCst);

    if let Some(receiver) = &mut self.receiver {
      match receiver.try_recv() {
        Ok(Ok(_)) => {
          self.status = QueryStatus::Settled;
          self.receiver = None;
          changed = true;
        }
        Ok(Err(e)) => {
          self.status = QueryStatus::Error(e.to_string());
          self.receiver = None;
          changed = true;
        }
        Err(mpsc::error::TryRecvError::Empty) => {}
        Err(mpsc::error::TryRecvError::Disconnected) => {
          // Sender dropped without sending - treat as error
          self.status = QueryStatus::Error("Request was cancelled".to_string());
          self.receiver = None;
          changed = true;
        }
      }
    }

    changed
  }

  /// Stop listening to store broadcasts.
  pub fn unsubscribe(&mut self) {
    if let Some(subscription) = self.subscription.take() {
      subscription.unsubscribe();
    }
  }

  fn start(&mut self, request: FetchRequest) {
    let (tx, rx) = mpsc::unbounded_channel();
    self.receiver = Some(rx);
    self.status = QueryStatus::Loading;

    let store = self.store.clone();
    tokio::spawn(async move {
      let result = store.fetch_data(request).await;
      // Ignore send errors - receiver may have been dropped
      let _ = tx.send(result);
    });
  }
}

impl Drop for KeyQuery {
  fn drop(&mut self) {
    self.unsubscribe();
  }
}

impl std::fmt::Debug for KeyQuery {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("KeyQuery")
      .field("key", &self.key)
      .field("status", &self.status)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::registry::{handler, FetchArgument};
  use crate::retry::RetryPolicy;
  use crate::store::State;
  use color_eyre::eyre::eyre;
  use serde_json::json;
  use std::sync::atomic::AtomicUsize;
  use std::time::Duration;

  fn store() -> Store {
    Store::new(State::new()).with_retry_policy(RetryPolicy::new(2, Duration::from_millis(1)))
  }

  async fn settle(query: &mut KeyQuery) {
    for _ in 0..50 {
      tokio::time::sleep(Duration::from_millis(5)).await;
      query.poll();
      if !query.is_loading() {
        return;
      }
    }
  }

  #[tokio::test]
  async fn test_fetch_success() {
    let store = store();
    store.register_api("users", handler(|_| async { Ok(json!([{"id": 1}])) }));
    let mut query = KeyQuery::new(store, "users");

    assert_eq!(query.status(), &QueryStatus::Idle);

    query.fetch();
    assert!(query.is_loading());

    settle(&mut query).await;

    assert_eq!(query.status(), &QueryStatus::Settled);
    assert_eq!(query.state(), Some(json!([{"id": 1}])));
  }

  #[tokio::test]
  async fn test_fetch_error_keeps_previous_state() {
    let store = store();
    store.set_state([("users".to_string(), json!(["old"]))]);
    store.register_api("users", handler(|_| async { Err(eyre!("offline")) }));
    let mut query = KeyQuery::new(store, "users");

    query.fetch();
    settle(&mut query).await;

    assert!(query.is_error());
    assert!(query.error().unwrap_or_default().contains("offline"));
    assert_eq!(query.state(), Some(json!(["old"])));
  }

  #[tokio::test]
  async fn test_missing_handler_sets_error() {
    let mut query = KeyQuery::new(store(), "nothing");
    query.fetch();
    settle(&mut query).await;
    assert!(query.is_error());
  }

  #[tokio::test]
  async fn test_refresh_bypasses_cache() {
    let store = store();
    let calls = Arc::new(AtomicUsize::new(0));
    let c = calls.clone();
    store.register_api("users", handler(move |_| {
      let n = c.fetch_add(1, Ordering::SeqCst) + 1;
      async move { Ok(json!([n])) }
    }));
    let mut query = KeyQuery::new(store, "users");

    query.fetch();
    settle(&mut query).await;
    query.fetch();
    settle(&mut query).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    query.refresh_data();
    settle(&mut query).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.state(), Some(json!([2])));
  }

  #[tokio::test]
  async fn test_execute_mutation_passes_payload() {
    let store = store();
    store.register_api("users", handler(|arg| async move {
      match arg {
        Some(FetchArgument::Payload(body)) => Ok(json!([body])),
        _ => Ok(Value::Null),
      }
    }));
    let mut query = KeyQuery::new(store, "users");

    query.execute_mutation(Method::Post, Some(json!({"id": 3})), true);
    settle(&mut query).await;

    assert_eq!(query.state(), Some(json!([{"id": 3}])));
    assert!(query.store.cache().get("users").is_some());
  }

  #[tokio::test]
  async fn test_execute_mutation_without_keep_cache_leaves_cache() {
    let store = store();
    store.register_api("users", handler(|_| async { Ok(json!([{"id": 4}])) }));
    let mut query = KeyQuery::new(store.clone(), "users");

    query.execute_mutation(Method::Put, Some(json!({"id": 4})), false);
    settle(&mut query).await;

    assert_eq!(query.status(), &QueryStatus::Settled);
    assert_eq!(query.state(), Some(json!([{"id": 4}])));
    assert!(store.cache().is_empty());
  }

  #[tokio::test]
  async fn test_poll_ignores_changes_to_other_keys() {
    let store = store();
    store.set_state([("users".to_string(), json!([1]))]);
    let mut query = KeyQuery::new(store.clone(), "users");

    store.set_state([("posts".to_string(), json!(["p"]))]);
    assert!(!query.poll());

    store.set_state([("users".to_string(), json!([1]))]);
    assert!(!query.poll());

    store.set_state([("users".to_string(), json!([1, 2]))]);
    assert!(query.poll());
  }

  #[tokio::test]
  async fn test_local_edits_are_reported_by_poll() {
    let store = store();
    store.set_state([("users".to_string(), json!([{"id": 1, "name": "A"}, {"id": 2}]))]);
    let mut query = KeyQuery::new(store, "users");

    let status = query.edit_item("id", 1, json!({"name": "B"}));
    assert!(status.status);
    assert!(query.poll());
    assert!(!query.poll());

    query.delete_item("id", 2);
    assert!(query.poll());
    assert_eq!(query.state(), Some(json!([{"id": 1, "name": "B"}])));
  }

  #[tokio::test]
  async fn test_edit_item_reports_failure() {
    let query = KeyQuery::new(store(), "users");
    let status = query.edit_item("id", 1, json!({}));
    assert!(!status.status);
  }

  #[tokio::test]
  async fn test_drop_unsubscribes() {
    let store = store();
    let query = KeyQuery::new(store.clone(), "users");
    assert_eq!(store.subscriber_count(), 1);
    drop(query);
    assert_eq!(store.subscriber_count(), 0);
  }
}
