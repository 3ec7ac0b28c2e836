use chrono::Duration;
use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cache::{CacheLayer, MemoryStorage, NoopStorage};
use crate::registry::DEFAULT_CACHE_DURATION_MS;
use crate::retry::RetryPolicy;
use crate::store::{Method, State, Store};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Base URL every endpoint path is joined onto
  pub base_url: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub endpoints: Vec<EndpointConfig>,
  /// Values the store starts with, by key
  #[serde(default)]
  pub initial_state: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Set to false to fetch on every read
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Lifetime for endpoints without their own `cache_ms`
  #[serde(default = "default_ttl_ms")]
  pub default_ttl_ms: i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      default_ttl_ms: DEFAULT_CACHE_DURATION_MS,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
  #[serde(default = "default_max_attempts")]
  pub max_attempts: u32,
  #[serde(default = "default_base_delay_ms")]
  pub base_delay_ms: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: default_max_attempts(),
      base_delay_ms: default_base_delay_ms(),
    }
  }
}

impl From<&RetryConfig> for RetryPolicy {
  fn from(config: &RetryConfig) -> Self {
    RetryPolicy::new(config.max_attempts, std::time::Duration::from_millis(config.base_delay_ms))
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointConfig {
  /// Store key the endpoint feeds
  pub key: String,
  /// Path relative to `base_url`
  pub path: String,
  /// HTTP method the handler uses
  #[serde(default)]
  pub method: Method,
  /// Cache lifetime override in milliseconds
  pub cache_ms: Option<i64>,
}

fn default_true() -> bool {
  true
}

fn default_ttl_ms() -> i64 {
  DEFAULT_CACHE_DURATION_MS
}

fn default_max_attempts() -> u32 {
  3
}

fn default_base_delay_ms() -> u64 {
  1000
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./cachesync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/cachesync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/cachesync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("cachesync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("cachesync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  pub fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::from_yaml(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn from_yaml(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Cache lifetime for `endpoint`, falling back to the configured default.
  pub fn lifetime_for(&self, endpoint: &EndpointConfig) -> Duration {
    Duration::milliseconds(endpoint.cache_ms.unwrap_or(self.cache.default_ttl_ms))
  }

  /// Build a store from this configuration. Handlers are registered separately.
  pub fn build_store(&self) -> Store {
    let initial: State = self.initial_state.clone();
    let cache = if self.cache.enabled {
      CacheLayer::new(MemoryStorage::new())
    } else {
      CacheLayer::new(NoopStorage)
    };

    Store::new(initial)
      .with_cache(cache)
      .with_retry_policy(RetryPolicy::from(&self.retry))
  }
}
