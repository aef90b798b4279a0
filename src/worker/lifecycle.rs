//! Install and activate: versioned partition setup and stale partition cleanup.

use futures::future::{join_all, try_join_all};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::cache::{CacheStorage, PartitionNames, Purpose, Request, RequestKey, StoreError};
use crate::host::Clients;
use crate::net::{fetch_with_timeout, Network, NetworkError};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  Parsed,
  Installing,
  Installed,
  Activating,
  Activated,
}

/// Why pre-caching the app-shell manifest failed.
#[derive(Debug, Error)]
pub enum PrecacheError {
  #[error("failed to fetch {url}: {source}")]
  Fetch { url: Url, source: NetworkError },

  #[error("fetching {url} returned status {status}")]
  Status { url: Url, status: u16 },

  #[error("failed to store manifest entry: {0}")]
  Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default)]
pub struct InstallReport {
  /// Partitions that were opened (or already existed)
  pub opened: Vec<String>,
  /// Number of manifest entries stored in the app-shell partition
  pub precached: usize,
  /// Why pre-caching failed, if it did
  pub error: Option<String>,
}

impl InstallReport {
  pub fn succeeded(&self) -> bool {
    self.error.is_none()
  }
}

#[derive(Debug, Clone, Default)]
pub struct ActivateReport {
  pub claimed: bool,
  /// Stale partitions removed from disk
  pub deleted: Vec<String>,
}

pub struct Lifecycle<S: CacheStorage> {
  storage: Arc<S>,
  network: Arc<dyn Network>,
  clients: Arc<dyn Clients>,
  names: PartitionNames,
  manifest: Vec<Url>,
  fetch_timeout: Option<Duration>,
}

impl<S: CacheStorage> Lifecycle<S> {
  pub fn new(
    storage: Arc<S>,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    names: PartitionNames,
    manifest: Vec<Url>,
    fetch_timeout: Option<Duration>,
  ) -> Self {
    Self {
      storage,
      network,
      clients,
      names,
      manifest,
      fetch_timeout,
    }
  }

  /// Ask to replace the previous engine without waiting, then open every
  /// current partition and pre-cache the shell manifest.
  ///
  /// A failed pre-cache is reported and logged but does not stop activation.
  pub async fn install(&self) -> InstallReport {
    let mut report = InstallReport::default();

    // Ask to take over before any fetch: a hung manifest fetch must not hold it up
    if let Err(e) = self.clients.skip_waiting().await {
      warn!(error = %e, "skip waiting was rejected");
    }

    let opens = self.names.all().map(|name| async move {
      (name, self.storage.open_partition(name))
    });
    for (name, result) in join_all(opens).await {
      match result {
        Ok(()) => report.opened.push(name.to_string()),
        Err(e) => warn!(partition = name, error = %e, "failed to open partition"),
      }
    }

    match self.precache_shell().await {
      Ok(count) => {
        info!(count, partition = self.names.name(Purpose::Shell), "app shell cached");
        report.precached = count;
      }
      Err(e) => {
        error!(error = %e, "app shell pre-cache failed, offline support degraded");
        report.error = Some(e.to_string());
      }
    }

    report
  }

  /// Fetch the whole manifest, then store it. Any failure stores nothing:
  /// entries written before a failed store are removed again.
  async fn precache_shell(&self) -> Result<usize, PrecacheError> {
    let fetches = self.manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = fetch_with_timeout(self.network.as_ref(), &request, self.fetch_timeout)
        .await
        .map_err(|source| PrecacheError::Fetch {
          url: url.clone(),
          source,
        })?;
      if !response.ok() {
        return Err(PrecacheError::Status {
          url: url.clone(),
          status: response.status,
        });
      }
      Ok((request.key(), response))
    });
    let fetched = try_join_all(fetches).await?;

    let shell = self.names.name(Purpose::Shell);
    for (written, (key, response)) in fetched.iter().enumerate() {
      if let Err(e) = self.storage.put(shell, key, response) {
        self.roll_back(shell, fetched[..written].iter().map(|(key, _)| key));
        return Err(e.into());
      }
    }
    Ok(fetched.len())
  }

  fn roll_back<'a>(&self, partition: &str, keys: impl Iterator<Item = &'a RequestKey>) {
    for key in keys {
      if let Err(e) = self.storage.delete_entry(partition, key) {
        warn!(partition, %key, error = %e, "failed to roll back manifest entry");
      }
    }
  }

  /// Claim open sessions and delete stale partitions, concurrently.
  pub async fn activate(&self) -> ActivateReport {
    let (claimed, deleted) = tokio::join!(self.clients.claim(), self.delete_stale());

    let claimed = match claimed {
      Ok(()) => true,
      Err(e) => {
        warn!(error = %e, "failed to claim sessions");
        false
      }
    };

    ActivateReport { claimed, deleted }
  }

  async fn delete_stale(&self) -> Vec<String> {
    let names = match self.storage.partition_names() {
      Ok(names) => names,
      Err(e) => {
        warn!(error = %e, "failed to list partitions, skipping cleanup");
        return Vec::new();
      }
    };

    let deletions = names
      .into_iter()
      .filter(|name| !self.names.is_current(name))
      .map(|name| async move {
        let result = self.storage.delete_partition(&name);
        (name, result)
      });

    let mut deleted = Vec::new();
    for (name, result) in join_all(deletions).await {
      match result {
        Ok(_) => {
          info!(partition = %name, "deleted stale partition");
          deleted.push(name);
        }
        Err(e) => warn!(partition = %name, error = %e, "failed to delete stale partition"),
      }
    }
    deleted
  }
}
