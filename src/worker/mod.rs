//! Request interception engine.
//!
//! Sits in front of a web client and handles the events a browser would
//! dispatch to an offline worker:
//! - install / activate: versioned partition setup and stale cleanup
//! - fetch: route same-origin requests to a partition and a strategy
//! - push / notification click: show notifications and route clicks to windows

mod lifecycle;
mod notification;
mod router;

use color_eyre::{eyre::eyre, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::cache::{CacheLayer, CacheStorage, PartitionNames, Purpose, Request, Served};
use crate::config::{Config, NotificationDefaults, PartitionPrefixes};
use crate::host::{Clients, Notifier};
use crate::net::Network;

pub use lifecycle::{ActivateReport, InstallReport, Lifecycle, WorkerState};
pub use notification::{ClickOutcome, NotificationHandler, NotificationIntent};
pub use router::{classify, Strategy};

/// Everything the engine needs to know, fixed at construction.
#[derive(Debug, Clone)]
pub struct EngineConfig {
  pub origin: Url,
  pub version: u32,
  pub prefixes: PartitionPrefixes,
  /// App-shell manifest, as absolute URLs
  pub manifest: Vec<Url>,
  pub offline_page: Url,
  pub admin_landing: String,
  pub fetch_timeout: Option<Duration>,
  pub notification: NotificationDefaults,
}

impl EngineConfig {
  pub fn from_config(config: &Config) -> Result<Self> {
    let origin = Url::parse(&config.origin)
      .map_err(|e| eyre!("Invalid origin '{}': {}", config.origin, e))?;
    let resolve = |path: &str| {
      origin
        .join(path)
        .map_err(|e| eyre!("Invalid path '{}': {}", path, e))
    };

    let manifest = config
      .manifest
      .iter()
      .map(|p| resolve(p.as_str()))
      .collect::<Result<Vec<_>>>()?;
    let offline_page = resolve(config.offline_page.as_str())?;

    Ok(Self {
      origin,
      version: config.version,
      prefixes: config.partitions.clone(),
      manifest,
      offline_page,
      admin_landing: config.admin_landing.clone(),
      fetch_timeout: config.fetch_timeout_secs.map(Duration::from_secs),
      notification: config.notification.clone(),
    })
  }
}

/// Result of handing a request to the engine.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// Not intercepted: the request goes to the network untouched
  Bypass,
  Respond(Served),
}

pub struct Engine<S: CacheStorage> {
  origin: Url,
  names: PartitionNames,
  storage: Arc<S>,
  cache: CacheLayer<S>,
  lifecycle: Lifecycle<S>,
  notifications: NotificationHandler,
  state: Mutex<WorkerState>,
}

impl<S: CacheStorage> Engine<S> {
  pub fn new(
    config: EngineConfig,
    storage: S,
    network: Arc<dyn Network>,
    clients: Arc<dyn Clients>,
    notifier: Arc<dyn Notifier>,
  ) -> Self {
    let storage = Arc::new(storage);
    let names = PartitionNames::versioned(&config.prefixes, config.version);

    let cache = CacheLayer::new(
      Arc::clone(&storage),
      Arc::clone(&network),
      config.offline_page.clone(),
      names.name(Purpose::Shell).to_string(),
    )
    .with_fetch_timeout(config.fetch_timeout);

    let lifecycle = Lifecycle::new(
      Arc::clone(&storage),
      network,
      Arc::clone(&clients),
      names.clone(),
      config.manifest,
      config.fetch_timeout,
    );

    let notifications = NotificationHandler::new(
      clients,
      notifier,
      config.origin.clone(),
      config.admin_landing,
      config.notification,
    );

    Self {
      origin: config.origin,
      names,
      storage,
      cache,
      lifecycle,
      notifications,
      state: Mutex::new(WorkerState::Parsed),
    }
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or_else(|poisoned| *poisoned.into_inner())
  }

  fn set_state(&self, next: WorkerState) {
    let mut state = self
      .state
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    debug!(from = ?*state, to = ?next, "lifecycle transition");
    *state = next;
  }

  pub fn partitions(&self) -> &PartitionNames {
    &self.names
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// A new version was deployed.
  pub async fn on_install(&self) -> InstallReport {
    self.set_state(WorkerState::Installing);
    let report = self.lifecycle.install().await;
    // A failed pre-cache degrades offline support but does not block activation
    self.set_state(WorkerState::Installed);
    report
  }

  /// Install finished; take over open sessions and drop stale partitions.
  pub async fn on_activate(&self) -> ActivateReport {
    self.set_state(WorkerState::Activating);
    let report = self.lifecycle.activate().await;
    self.set_state(WorkerState::Activated);
    info!(deleted = report.deleted.len(), "engine activated");
    report
  }

  /// Intercept a request. Never fails: every intercepted request gets a response.
  pub async fn on_fetch(&self, request: &Request) -> FetchOutcome {
    let Some(route) = classify(&self.origin, request) else {
      debug!(url = %request.url, "cross-origin request, not intercepted");
      return FetchOutcome::Bypass;
    };

    let partition = self.names.name(route.purpose);
    debug!(url = %request.url, partition, strategy = ?route.strategy, "routing request");

    let served = match route.strategy {
      Strategy::CacheFirst => self.cache.cache_first(partition, request).await,
      Strategy::NetworkFirst => self.cache.network_first(partition, request).await,
    };
    FetchOutcome::Respond(served)
  }

  /// A push message arrived; show a notification for it.
  pub async fn on_push(&self, payload: Option<&[u8]>) -> NotificationIntent {
    self.notifications.on_push(payload).await
  }

  pub async fn on_notification_click(
    &self,
    intent: &NotificationIntent,
    action: Option<&str>,
  ) -> ClickOutcome {
    self.notifications.on_click(intent, action).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{Destination, ResponseSource, SqliteStorage};
  use crate::testing::{basic, FakeNetwork, RecordingClients, RecordingNotifier, ORIGIN};

  struct Harness {
    engine: Engine<SqliteStorage>,
    network: Arc<FakeNetwork>,
    clients: Arc<RecordingClients>,
    notifier: Arc<RecordingNotifier>,
  }

  fn harness() -> Harness {
    let config = EngineConfig::from_config(&Config::default()).unwrap();
    let network = Arc::new(FakeNetwork::new());
    for url in &config.manifest {
      network.respond(url.path(), basic(200, url.path()));
    }
    let clients = Arc::new(RecordingClients::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(
      config,
      SqliteStorage::open_in_memory().unwrap(),
      network.clone(),
      clients.clone(),
      notifier.clone(),
    );
    Harness {
      engine,
      network,
      clients,
      notifier,
    }
  }

  fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
  }

  fn served(outcome: FetchOutcome) -> Served {
    match outcome {
      FetchOutcome::Respond(served) => served,
      FetchOutcome::Bypass => panic!("request was not intercepted"),
    }
  }

  #[test]
  fn test_config_resolves_paths_against_origin() {
    let config = EngineConfig::from_config(&Config {
      origin: "https://orders.example.com".to_string(),
      fetch_timeout_secs: Some(3),
      ..Config::default()
    })
    .unwrap();
    assert_eq!(config.manifest[0].as_str(), "https://orders.example.com/");
    assert_eq!(
      config.offline_page.as_str(),
      "https://orders.example.com/offline.html"
    );
    assert_eq!(config.fetch_timeout, Some(Duration::from_secs(3)));

    let err = EngineConfig::from_config(&Config {
      origin: "not a url".to_string(),
      ..Config::default()
    })
    .unwrap_err();
    assert!(err.to_string().contains("Invalid origin"));
  }

  #[tokio::test]
  async fn test_lifecycle_states() {
    let h = harness();
    assert_eq!(h.engine.state(), WorkerState::Parsed);

    let install = h.engine.on_install().await;
    assert!(install.succeeded());
    assert_eq!(h.engine.state(), WorkerState::Installed);

    h.engine.on_activate().await;
    assert_eq!(h.engine.state(), WorkerState::Activated);
    assert_eq!(h.clients.events(), vec!["skip_waiting", "claim"]);
  }

  #[tokio::test]
  async fn test_cross_origin_touches_nothing() {
    let h = harness();
    let request = Request::get(Url::parse("https://cdn.example.com/logo.png").unwrap())
      .with_destination(Destination::Image);

    assert!(matches!(h.engine.on_fetch(&request).await, FetchOutcome::Bypass));
    assert!(h.engine.storage().partition_names().unwrap().is_empty());
    assert!(h.network.calls().is_empty());
  }

  #[tokio::test]
  async fn test_image_is_cached_after_first_fetch() {
    let h = harness();
    h.network.respond("/logo.png", basic(200, "png"));
    let request = Request::get(url("/logo.png")).with_destination(Destination::Image);

    let first = served(h.engine.on_fetch(&request).await);
    assert_eq!(first.source, ResponseSource::Network);
    let second = served(h.engine.on_fetch(&request).await);
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response, first.response);
    assert_eq!(h.network.call_count("/logo.png"), 1);
    assert_eq!(h.engine.storage().entry_count("app-shell-v2").unwrap(), 1);
  }

  #[tokio::test]
  async fn test_api_response_survives_outage() {
    let h = harness();
    h.network.respond("/api/orders", basic(200, r#"{"orders":[42]}"#));
    let request = Request::get(url("/api/orders"));

    served(h.engine.on_fetch(&request).await);
    assert_eq!(h.engine.storage().entry_count("api-cache-v2").unwrap(), 1);

    h.network.set_offline(true);
    let offline = served(h.engine.on_fetch(&request).await);
    assert_eq!(offline.source, ResponseSource::Cache);
    assert_eq!(&offline.response.body[..], br#"{"orders":[42]}"#);
  }

  #[tokio::test]
  async fn test_admin_assets_use_admin_partition() {
    let h = harness();
    h.network.respond("/assets/AdminDashboard-1a2b.js", basic(200, "js"));
    let request = Request::get(url("/assets/AdminDashboard-1a2b.js"))
      .with_destination(Destination::Script);

    served(h.engine.on_fetch(&request).await);
    assert_eq!(h.engine.storage().entry_count("admin-cache-v2").unwrap(), 1);
    assert_eq!(h.engine.storage().entry_count("app-shell-v2").unwrap(), 0);
  }

  #[tokio::test]
  async fn test_offline_navigation_after_install_serves_offline_page() {
    let h = harness();
    h.engine.on_install().await;
    h.engine.on_activate().await;
    h.network.set_offline(true);

    let served = served(h.engine.on_fetch(&Request::navigation(url("/reservations"))).await);
    assert_eq!(served.source, ResponseSource::OfflinePage);
    assert_eq!(&served.response.body[..], b"/offline.html");
  }

  #[tokio::test]
  async fn test_activation_after_version_bump_drops_old_partitions() {
    let h = harness();
    h.engine.on_install().await;
    h.engine.on_activate().await;

    let mut config = Config::default();
    config.version = 3;
    let next = Engine::new(
      EngineConfig::from_config(&config).unwrap(),
      SqliteStorage::open_in_memory().unwrap(),
      h.network.clone(),
      h.clients.clone(),
      h.notifier.clone(),
    );
    for name in h.engine.partitions().all() {
      next.storage().open_partition(name).unwrap();
    }
    next.on_install().await;
    let report = next.on_activate().await;

    assert_eq!(
      report.deleted,
      vec!["admin-cache-v2", "api-cache-v2", "app-shell-v2"]
    );
    assert_eq!(
      next.storage().partition_names().unwrap(),
      vec!["admin-cache-v3", "api-cache-v3", "app-shell-v3"]
    );
  }

  #[tokio::test]
  async fn test_push_then_acknowledge() {
    let h = harness();
    let payload = br#"{"title":"Order #42","body":"Ready","data":{"orderNumber":"42"}}"#;

    let intent = h.engine.on_push(Some(&payload[..])).await;
    assert_eq!(h.notifier.shown().len(), 1);

    let outcome = h.engine.on_notification_click(&intent, Some("acknowledge")).await;
    assert_eq!(
      outcome,
      ClickOutcome::Acknowledged {
        order: Some("42".to_string())
      }
    );
  }

  #[tokio::test]
  async fn test_malformed_push_still_shows_default() {
    let h = harness();

    let intent = h.engine.on_push(Some(&b"\x00\x01garbage"[..])).await;
    assert_eq!(intent.title, "New Order");
    assert_eq!(h.notifier.shown()[0].title, "New Order");
  }
}
