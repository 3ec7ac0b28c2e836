//! Fetch-or-serve-cached coordination.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::Store;
use crate::cache::CacheResult;
use crate::error::SyncError;
use crate::registry::FetchArgument;

/// Operation kind. Only `Get` may be served from cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  #[default]
  Get,
  Post,
  Put,
  Delete,
}

impl Method {
  pub fn is_read(&self) -> bool {
    matches!(self, Method::Get)
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Delete => "DELETE",
    }
  }
}

impl fmt::Display for Method {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Method {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_uppercase().as_str() {
      "GET" => Ok(Method::Get),
      "POST" => Ok(Method::Post),
      "PUT" => Ok(Method::Put),
      "DELETE" => Ok(Method::Delete),
      other => Err(format!("unknown method '{}'", other)),
    }
  }
}

/// One fetch or write against a key.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
  pub key: String,
  pub method: Method,
  /// Body for writes; ignored for reads
  pub payload: Option<Value>,
  /// Path suffix for reads; ignored for writes
  pub url_path: Option<String>,
  /// Whether a successful result refreshes the cache entry
  pub keep_cache: bool,
}

impl FetchRequest {
  pub fn new(key: impl Into<String>, method: Method) -> Self {
    Self {
      key: key.into(),
      method,
      payload: None,
      url_path: None,
      keep_cache: true,
    }
  }

  pub fn get(key: impl Into<String>) -> Self {
    Self::new(key, Method::Get)
  }

  pub fn with_payload(mut self, payload: Value) -> Self {
    self.payload = Some(payload);
    self
  }

  pub fn with_url_path(mut self, url_path: impl Into<String>) -> Self {
    self.url_path = Some(url_path.into());
    self
  }

  pub fn keep_cache(mut self, keep_cache: bool) -> Self {
    self.keep_cache = keep_cache;
    self
  }

  /// The argument the handler receives for this request.
  fn argument(&self) -> Option<FetchArgument> {
    if self.method.is_read() {
      self.url_path.clone().map(FetchArgument::UrlPath)
    } else {
      self.payload.clone().map(FetchArgument::Payload)
    }
  }
}

/// Results that count as "no data": nothing is stored or broadcast for them.
fn is_empty_result(value: &Value) -> bool {
  match value {
    Value::Null => true,
    Value::String(s) => s.is_empty(),
    _ => false,
  }
}

impl Store {
  /// Fetch `request.key`, serving a fresh cached value for reads when possible.
  ///
  /// `Ok(None)` means the handler succeeded with an empty result. On any error the
  /// state under the key is left exactly as it was.
  pub async fn resolve(&self, request: FetchRequest) -> Result<Option<CacheResult>, SyncError> {
    let key = request.key.as_str();

    if request.method.is_read() {
      if let Some(entry) = self.cache.get_fresh(key, &self.registry, self.clock.now()) {
        debug!(key, "Cache hit");
        return Ok(Some(CacheResult::from_cache(entry)));
      }
      debug!(key, "Cache miss");
    }

    let registration = match self.registry.get(key) {
      Some(registration) => registration,
      None => {
        warn!(key, method = %request.method, "No fetch handler registered");
        return Err(SyncError::NoHandler(key.to_string()));
      }
    };

    let argument = request.argument();
    let handler = registration.handler;
    let result = self
      .retry
      .run(|| handler(argument.clone()))
      .await;

    let value = match result {
      Ok(value) => value,
      Err(e) => {
        let attempts = self.retry.attempts();
        warn!(key, method = %request.method, attempts, "Fetch failed: {:#}", e);
        return Err(SyncError::FetchFailed {
          key: key.to_string(),
          attempts,
          message: format!("{:#}", e),
        });
      }
    };

    if is_empty_result(&value) {
      debug!(key, method = %request.method, "Handler returned no data");
      return Ok(None);
    }

    if request.keep_cache {
      self.cache.set(key, value.clone(), self.clock.now());
    }
    self.replace(key, value.clone());
    info!(key, method = %request.method, cached = request.keep_cache, "Synchronized");

    Ok(Some(CacheResult::from_network(value)))
  }

  /// [`resolve`](Self::resolve) without the source metadata.
  pub async fn fetch_data(&self, request: FetchRequest) -> Result<Option<Value>, SyncError> {
    self
      .resolve(request)
      .await
      .map(|result| result.map(|r| r.data))
  }
}
