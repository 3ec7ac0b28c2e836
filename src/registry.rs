//! Fetch handler registry.
//!
//! Maps a logical key to the async function that fetches (or writes) its value and to the
//! lifetime a cached copy of that value stays fresh.

use chrono::Duration;
use color_eyre::Result;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, warn};

/// Cache lifetime used when a registration doesn't specify one.
pub const DEFAULT_CACHE_DURATION_MS: i64 = 60_000;

/// Argument handed to a fetch handler.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchArgument {
  /// Body for a write (POST / PUT / DELETE)
  Payload(Value),
  /// Suffix appended to the endpoint path for a parameterized read
  UrlPath(String),
}

/// A registered fetch function. Called once per attempt, so it must be re-invocable.
pub type FetchFn = Arc<dyn Fn(Option<FetchArgument>) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// A handler together with its cache lifetime.
#[derive(Clone)]
pub struct Registration {
  pub handler: FetchFn,
  pub cache_duration: Duration,
}

impl std::fmt::Debug for Registration {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Registration")
      .field("cache_duration", &self.cache_duration)
      .finish_non_exhaustive()
  }
}

/// Box an async closure into a [`FetchFn`].
pub fn handler<F, Fut>(f: F) -> FetchFn
where
  F: Fn(Option<FetchArgument>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<Value>> + Send + 'static,
{
  Arc::new(move |arg: Option<FetchArgument>| -> BoxFuture<'static, Result<Value>> {
    Box::pin(f(arg))
  })
}

/// Key → handler map. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct Registry {
  entries: Arc<Mutex<HashMap<String, Registration>>>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register (or replace) the handler for `key`.
  ///
  /// A bad registration is a programmer error: it is logged and ignored rather than
  /// returned, so setup code never has to handle it.
  pub fn register(&self, key: &str, handler: FetchFn, cache_duration: Duration) {
    if key.trim().is_empty() {
      warn!("Ignoring fetch handler registered with an empty key");
      return;
    }

    let cache_duration = if cache_duration < Duration::zero() {
      warn!(key, "Negative cache duration, treating as 0");
      Duration::zero()
    } else {
      cache_duration
    };

    let replaced = self
      .lock()
      .insert(
        key.to_string(),
        Registration {
          handler,
          cache_duration,
        },
      )
      .is_some();

    debug!(
      key,
      cache_ms = cache_duration.num_milliseconds(),
      replaced,
      "Registered fetch handler"
    );
  }

  pub fn get(&self, key: &str) -> Option<Registration> {
    self.lock().get(key).cloned()
  }

  /// Cache lifetime for `key`; zero when nothing is registered.
  pub fn lifetime(&self, key: &str) -> Duration {
    self
      .lock()
      .get(key)
      .map(|r| r.cache_duration)
      .unwrap_or_else(Duration::zero)
  }

  pub fn contains(&self, key: &str) -> bool {
    self.lock().contains_key(key)
  }

  /// Registered keys, sorted.
  pub fn keys(&self) -> Vec<String> {
    let mut keys: Vec<String> = self.lock().keys().cloned().collect();
    keys.sort();
    keys
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Registration>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl std::fmt::Debug for Registry {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Registry").field("keys", &self.keys()).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn constant(value: Value) -> FetchFn {
    handler(move |_| {
      let value = value.clone();
      async move { Ok(value) }
    })
  }

  #[test]
  fn test_unregistered_key_has_zero_lifetime() {
    let registry = Registry::new();
    assert_eq!(registry.lifetime("missing"), Duration::zero());
    assert!(registry.get("missing").is_none());
  }

  #[test]
  fn test_last_registration_wins() {
    let registry = Registry::new();
    registry.register("users", constant(json!(1)), Duration::milliseconds(100));
    registry.register("users", constant(json!(2)), Duration::milliseconds(500));

    assert_eq!(registry.lifetime("users"), Duration::milliseconds(500));
    assert_eq!(registry.keys(), vec!["users".to_string()]);
  }

  #[test]
  fn test_empty_key_is_ignored() {
    let registry = Registry::new();
    registry.register("  ", constant(json!(null)), Duration::milliseconds(100));
    assert!(registry.keys().is_empty());
  }

  #[tokio::test]
  async fn test_registered_handler_receives_argument() {
    let registry = Registry::new();
    registry.register(
      "echo",
      handler(|arg| async move {
        match arg {
          Some(FetchArgument::UrlPath(path)) => Ok(json!(path)),
          _ => Ok(Value::Null),
        }
      }),
      Duration::milliseconds(DEFAULT_CACHE_DURATION_MS),
    );

    let registration = registry.get("echo").expect("registered");
    let value = (registration.handler)(Some(FetchArgument::UrlPath("/7".to_string())))
      .await
      .expect("handler succeeds");
    assert_eq!(value, json!("/7"));
  }
}
