//! HTTP fetch handlers built from configured endpoints.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::config::{Config, EndpointConfig};
use crate::registry::{self, FetchArgument, FetchFn};
use crate::store::{Method, Store};

/// Builds one fetch handler per endpoint, sharing a single HTTP client.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  base_url: Url,
}

impl HttpFetcher {
  pub fn new(base_url: &str) -> Result<Self> {
    let base_url =
      Url::parse(base_url).map_err(|e| eyre!("Invalid base URL '{}': {}", base_url, e))?;

    let client = reqwest::Client::builder()
      .gzip(true)
      .deflate(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base_url })
  }

  /// Handler for `endpoint`. Reads append the URL-path argument to the endpoint path;
  /// writes send the payload argument as a JSON body.
  pub fn handler(&self, endpoint: &EndpointConfig) -> FetchFn {
    let client = self.client.clone();
    let base_url = self.base_url.clone();
    let path = endpoint.path.clone();
    let method = endpoint.method;

    registry::handler(move |arg| {
      let client = client.clone();
      let base_url = base_url.clone();
      let path = path.clone();
      async move {
        let (suffix, body) = match arg {
          Some(FetchArgument::UrlPath(suffix)) => (Some(suffix), None),
          Some(FetchArgument::Payload(body)) => (None, Some(body)),
          None => (None, None),
        };
        let url = endpoint_url(&base_url, &path, suffix.as_deref())?;
        send(&client, method, url, body.as_ref()).await
      }
    })
  }
}

/// Join the base URL, endpoint path and optional suffix.
pub fn endpoint_url(base: &Url, path: &str, suffix: Option<&str>) -> Result<Url> {
  let mut full = String::new();
  full.push_str(base.as_str().trim_end_matches('/'));
  for part in [Some(path), suffix].into_iter().flatten() {
    if part.starts_with('?') {
      full.push_str(part);
      continue;
    }
    let part = part.trim_matches('/');
    if !part.is_empty() {
      full.push('/');
      full.push_str(part);
    }
  }
  Url::parse(&full).map_err(|e| eyre!("Invalid endpoint URL '{}': {}", full, e))
}

async fn send(client: &reqwest::Client, method: Method, url: Url, body: Option<&Value>) -> Result<Value> {
  let http_method = match method {
    Method::Get => reqwest::Method::GET,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Delete => reqwest::Method::DELETE,
  };

  debug!(%method, %url, "Sending request");
  let mut request = client.request(http_method, url.clone());
  if let Some(body) = body {
    let bytes = serde_json::to_vec(body).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;
    request = request.header(CONTENT_TYPE, "application/json").body(bytes);
  }

  let response = request
    .send()
    .await
    .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

  let status = response.status();
  if !status.is_success() {
    return Err(eyre!("{} {} returned {}", method, url, status));
  }

  let text = response
    .text()
    .await
    .map_err(|e| eyre!("Failed to read response from {}: {}", url, e))?;

  parse_body(&text).map_err(|e| eyre!("Failed to parse response from {}: {}", url, e))
}

/// An empty body is "no data"; anything else must be JSON.
fn parse_body(text: &str) -> std::result::Result<Value, serde_json::Error> {
  if text.trim().is_empty() {
    return Ok(Value::Null);
  }
  serde_json::from_str(text)
}

/// Register a handler for every configured endpoint.
pub fn register_endpoints(store: &Store, config: &Config) -> Result<()> {
  let fetcher = HttpFetcher::new(&config.base_url)?;
  for endpoint in &config.endpoints {
    store.register_api_with_lifetime(&endpoint.key, fetcher.handler(endpoint), config.lifetime_for(endpoint));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn base(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_endpoint_url_joins_segments() {
    let url = endpoint_url(&base("https://api.example.com/v1/"), "/users", Some("/5")).unwrap();
    assert_eq!(url.as_str(), "https://api.example.com/v1/users/5");
  }

  #[test]
  fn test_endpoint_url_without_suffix() {
    let url = endpoint_url(&base("https://api.example.com"), "users", None).unwrap();
    assert_eq!(url.as_str(), "https://api.example.com/users");
  }

  #[test]
  fn test_endpoint_url_keeps_query_suffix() {
    let url = endpoint_url(&base("https://api.example.com"), "users", Some("?page=2")).unwrap();
    assert_eq!(url.as_str(), "https://api.example.com/users?page=2");
  }

  #[test]
  fn test_endpoint_url_keeps_path_then_query() {
    let url = endpoint_url(&base("https://api.example.com"), "users/", Some("/5?expand=roles")).unwrap();
    assert_eq!(url.as_str(), "https://api.example.com/users/5?expand=roles");
  }

  #[test]
  fn test_empty_body_is_null() {
    assert_eq!(parse_body("").unwrap(), Value::Null);
    assert_eq!(parse_body("  \n").unwrap(), Value::Null);
    assert_eq!(parse_body("[1,2]").unwrap(), json!([1, 2]));
    assert!(parse_body("<html>").is_err());
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    assert!(HttpFetcher::new("not a url").is_err());
  }
}
