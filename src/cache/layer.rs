//! Cache layer that runs the fetch strategies against a partition.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::storage::CacheStorage;
use super::types::{CachedResponse, Request, RequestKey, Response, ResponseType, Served};
use crate::net::{fetch_with_timeout, Network};

/// Minimal document served for a failed navigation when no offline page was
/// ever cached.
const LAST_RESORT_OFFLINE: &str = "<!doctype html><html><head><meta charset=\"utf-8\">\
<title>Offline</title></head><body><h1>You are offline</h1>\
<p>Check your connection and try again.</p></body></html>";

/// Cache layer that manages caching logic and network fetching.
///
/// Every strategy resolves to some response: a network failure falls back to
/// the partition, then to the offline page or a synthetic 503.
pub struct CacheLayer<S: CacheStorage> {
  storage: Arc<S>,
  network: Arc<dyn Network>,
  /// Absolute URL of the offline fallback document
  offline_page: Url,
  /// Partition holding the offline page when the target partition lacks it
  shell_partition: String,
  fetch_timeout: Option<Duration>,
}

impl<S: CacheStorage> CacheLayer<S> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<dyn Network>,
    offline_page: Url,
    shell_partition: String,
  ) -> Self {
    Self {
      storage,
      network,
      offline_page,
      shell_partition,
      fetch_timeout: None,
    }
  }

  /// Give up on network fetches after `timeout`.
  pub fn with_fetch_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.fetch_timeout = timeout;
    self
  }

  /// Serve from the partition if present; hit the network only on a miss.
  ///
  /// 1. Look up the request - if stored, return it (no freshness check)
  /// 2. Fetch from network
  /// 3. Store 200 basic responses, return the response either way
  /// 4. On network failure, offline page for navigations, 503 JSON otherwise
  pub async fn cache_first(&self, partition: &str, request: &Request) -> Served {
    let key = request.key();
    self.open(partition);

    if let Some(cached) = self.lookup(partition, &key) {
      debug!(%key, partition, "cache hit");
      return Served::from_cache(cached);
    }

    match fetch_with_timeout(self.network.as_ref(), request, self.fetch_timeout).await {
      Ok(response) => {
        if response.status == 200 && response.response_type == ResponseType::Basic {
          self.store(partition, &key, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        debug!(%key, error = %e, "network failed on cache miss");
        if request.navigate {
          self.offline_fallback(partition)
        } else {
          Served::synthetic(Response::json(
            503,
            &json!({ "error": "Network request failed" }),
          ))
        }
      }
    }
  }

  /// Always try the network; fall back to the partition when it fails.
  ///
  /// 1. Fetch from network - store 200 responses, return the response either way
  /// 2. On network failure, return the stored snapshot if any
  /// 3. Otherwise offline page for navigations, 503 JSON for everything else
  pub async fn network_first(&self, partition: &str, request: &Request) -> Served {
    let key = request.key();

    match fetch_with_timeout(self.network.as_ref(), request, self.fetch_timeout).await {
      Ok(response) => {
        if response.status == 200 {
          self.store(partition, &key, &response);
        }
        Served::from_network(response)
      }
      Err(e) => {
        debug!(%key, error = %e, "network failed, trying cache");
        self.open(partition);
        if let Some(cached) = self.lookup(partition, &key) {
          return Served::from_cache(cached);
        }
        if request.navigate {
          self.offline_fallback(partition)
        } else {
          Served::synthetic(Response::json(
            503,
            &json!({ "error": "Service unavailable" }),
          ))
        }
      }
    }
  }

  fn open(&self, partition: &str) {
    if let Err(e) = self.storage.open_partition(partition) {
      warn!(partition, error = %e, "failed to open partition");
    }
  }

  /// Read errors count as misses.
  fn lookup(&self, partition: &str, key: &RequestKey) -> Option<CachedResponse> {
    self
      .storage
      .match_request(partition, key)
      .unwrap_or_else(|e| {
        warn!(partition, %key, error = %e, "cache read failed");
        None
      })
  }

  /// Store a copy of the response. Failures never reach the caller.
  fn store(&self, partition: &str, key: &RequestKey, response: &Response) {
    match self.storage.put(partition, key, response) {
      Ok(()) => debug!(%key, partition, "stored response"),
      Err(e) => warn!(%key, partition, error = %e, "failed to cache response"),
    }
  }

  /// Offline page from the target partition, then the shell partition, then
  /// a built-in document.
  fn offline_fallback(&self, partition: &str) -> Served {
    let key = RequestKey::new("GET", &self.offline_page);
    let found = self.lookup(partition, &key).or_else(|| {
      if partition == self.shell_partition {
        None
      } else {
        self.lookup(&self.shell_partition, &key)
      }
    });

    match found {
      Some(cached) => Served::offline_page(cached),
      None => {
        warn!(partition, "offline page not cached, serving built-in fallback");
        Served::synthetic(Response::html(503, LAST_RESORT_OFFLINE))
      }
    }
  }
}

impl<S: CacheStorage> Clone for CacheLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      network: Arc::clone(&self.network),
      offline_page: self.offline_page.clone(),
      shell_partition: self.shell_partition.clone(),
      fetch_timeout: self.fetch_timeout,
    }
  }
}
