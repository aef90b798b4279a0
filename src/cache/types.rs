//! Request, response snapshot and served-response types.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

/// What kind of resource a request is loading.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  Script,
  Style,
  Image,
  Font,
  Document,
  #[default]
  Other,
}

/// An outgoing request from a page session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: String,
  pub url: Url,
  pub destination: Destination,
  /// Set when the request loads a new top-level document
  pub navigate: bool,
}

impl Request {
  /// A plain GET subresource request.
  pub fn get(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      destination: Destination::Other,
      navigate: false,
    }
  }

  /// A top-level document navigation.
  pub fn navigation(url: Url) -> Self {
    Self {
      method: "GET".to_string(),
      url,
      destination: Destination::Document,
      navigate: true,
    }
  }

  pub fn with_method(mut self, method: &str) -> Self {
    self.method = method.to_ascii_uppercase();
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  /// Normalized identity used for partition lookups.
  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, &self.url)
  }
}

/// Normalized request identity: method plus URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn new(method: &str, url: &Url) -> Self {
    let mut url = url.clone();
    url.set_fragment(None);
    Self {
      method: method.to_ascii_uppercase(),
      url: url.into(),
    }
  }

  pub fn method(&self) -> &str {
    &self.method
  }

  /// SHA256 of the key for stable, fixed-length storage ids.
  pub fn hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl std::fmt::Display for RequestKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{} {}", self.method, self.url)
  }
}

/// Response tainting as seen by the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
  /// Same-origin response with full access to status and headers
  Basic,
  /// Cross-origin response that passed CORS checks
  Cors,
  /// Cross-origin response without CORS access
  Opaque,
  /// Built locally, never touched the network
  Default,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
      Self::Default => "default",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(Self::Basic),
      "cors" => Some(Self::Cors),
      "opaque" => Some(Self::Opaque),
      "default" => Some(Self::Default),
      _ => None,
    }
  }
}

/// Immutable snapshot of an HTTP response.
///
/// The body is a `Bytes` handle, so cloning a response before handing it
/// to the cache leaves the caller's copy intact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub response_type: ResponseType,
  pub headers: Vec<(String, String)>,
  pub body: Bytes,
}

impl Response {
  pub fn new(status: u16, response_type: ResponseType) -> Self {
    Self {
      status,
      response_type,
      headers: Vec::new(),
      body: Bytes::new(),
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_ascii_lowercase(), value.to_string()));
    self
  }

  pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
    self.body = body.into();
    self
  }

  /// A locally built JSON response.
  pub fn json(status: u16, value: &serde_json::Value) -> Self {
    Self::new(status, ResponseType::Default)
      .with_header("content-type", "application/json")
      .with_body(value.to_string())
  }

  /// A locally built HTML response.
  pub fn html(status: u16, document: &str) -> Self {
    Self::new(status, ResponseType::Default)
      .with_header("content-type", "text/html; charset=utf-8")
      .with_body(document.to_string())
  }

  /// Status in the 200-299 range.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  #[allow(dead_code)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }
}

/// A response read back from a partition.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the response was stored
  pub cached_at: DateTime<Utc>,
}

/// Indicates where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Fresh from the network
  Network,
  /// Stored snapshot for the request itself
  Cache,
  /// Stored offline fallback document served for a failed navigation
  OfflinePage,
  /// Built by the engine because nothing else was available
  Synthetic,
}

impl ResponseSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Network => "network",
      Self::Cache => "cache",
      Self::OfflinePage => "offline-page",
      Self::Synthetic => "synthetic",
    }
  }
}

/// Response handed back to the page, plus metadata about its source.
#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
  /// When the response was cached (if served from a partition)
  pub cached_at: Option<DateTime<Utc>>,
}

impl Served {
  pub fn from_network(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Network,
      cached_at: None,
    }
  }

  pub fn from_cache(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::Cache,
      cached_at: Some(cached.cached_at),
    }
  }

  pub fn offline_page(cached: CachedResponse) -> Self {
    Self {
      response: cached.response,
      source: ResponseSource::OfflinePage,
      cached_at: Some(cached.cached_at),
    }
  }

  pub fn synthetic(response: Response) -> Self {
    Self {
      response,
      source: ResponseSource::Synthetic,
      cached_at: None,
    }
  }
}
