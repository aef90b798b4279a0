//! Test doubles for the network, the host and storage.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::cache::{
  CacheStorage, CachedResponse, Request, RequestKey, Response, ResponseType, SqliteStorage,
  StoreError, StoreResult,
};
use crate::host::{ClientMessage, Clients, HostError, HostResult, Notifier, WindowClient};
use crate::net::{Network, NetworkError};
use crate::worker::NotificationIntent;

pub const ORIGIN: &str = "http://localhost:3000";

/// A 200-style same-origin response with a text body.
pub fn basic(status: u16, body: &str) -> Response {
  Response::new(status, ResponseType::Basic).with_body(body.to_string())
}

/// Network that serves canned responses by path and records every call.
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Response>>,
  calls: Mutex<Vec<String>>,
  offline: AtomicBool,
  hang: AtomicBool,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self {
      routes: Mutex::new(HashMap::new()),
      calls: Mutex::new(Vec::new()),
      offline: AtomicBool::new(false),
      hang: AtomicBool::new(false),
    }
  }

  pub fn respond(&self, path: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(path.to_string(), response);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  /// Every fetch from now on never completes.
  pub fn hang(&self) {
    self.hang.store(true, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, path: &str) -> usize {
    self.calls().iter().filter(|p| *p == path).count()
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    self
      .calls
      .lock()
      .unwrap()
      .push(request.url.path().to_string());

    if self.hang.load(Ordering::SeqCst) {
      futures::future::pending::<()>().await;
    }
    if self.offline.load(Ordering::SeqCst) {
      return Err(NetworkError::Unreachable("offline".to_string()));
    }

    let routes = self.routes.lock().unwrap();
    Ok(
      routes
        .get(request.url.path())
        .cloned()
        .unwrap_or_else(|| basic(404, "not found")),
    )
  }
}

/// Clients that record every command as a string.
pub struct RecordingClients {
  windows: Vec<WindowClient>,
  events: Mutex<Vec<String>>,
}

impl RecordingClients {
  pub fn new() -> Self {
    Self::with_windows(&[])
  }

  /// Windows as (id, url, focused).
  pub fn with_windows(windows: &[(&str, &str, bool)]) -> Self {
    Self {
      windows: windows
        .iter()
        .map(|(id, url, focused)| WindowClient {
          id: id.to_string(),
          url: url.to_string(),
          focused: *focused,
        })
        .collect(),
      events: Mutex::new(Vec::new()),
    }
  }

  pub fn events(&self) -> Vec<String> {
    self.events.lock().unwrap().clone()
  }

  fn record(&self, event: String) {
    self.events.lock().unwrap().push(event);
  }

  fn known(&self, id: &str) -> HostResult<()> {
    if self.windows.iter().any(|w| w.id == id) {
      Ok(())
    } else {
      Err(HostError::UnknownWindow(id.to_string()))
    }
  }
}

#[async_trait]
impl Clients for RecordingClients {
  async fn skip_waiting(&self) -> HostResult<()> {
    self.record("skip_waiting".to_string());
    Ok(())
  }

  async fn claim(&self) -> HostResult<()> {
    self.record("claim".to_string());
    Ok(())
  }

  async fn windows(&self) -> HostResult<Vec<WindowClient>> {
    Ok(self.windows.clone())
  }

  async fn focus(&self, id: &str) -> HostResult<()> {
    self.known(id)?;
    self.record(format!("focus:{}", id));
    Ok(())
  }

  async fn navigate(&self, id: &str, url: &Url) -> HostResult<()> {
    self.known(id)?;
    self.record(format!("navigate:{}:{}", id, url));
    Ok(())
  }

  async fn post_message(&self, id: &str, message: &ClientMessage) -> HostResult<()> {
    self.known(id)?;
    let payload = serde_json::to_string(message).unwrap();
    self.record(format!("message:{}:{}", id, payload));
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> HostResult<()> {
    self.record(format!("open:{}", url));
    Ok(())
  }
}

/// Notification tray that keeps what it was asked to show and close.
pub struct RecordingNotifier {
  shown: Mutex<Vec<NotificationIntent>>,
  closed: Mutex<Vec<String>>,
}

impl RecordingNotifier {
  pub fn new() -> Self {
    Self {
      shown: Mutex::new(Vec::new()),
      closed: Mutex::new(Vec::new()),
    }
  }

  pub fn shown(&self) -> Vec<NotificationIntent> {
    self.shown.lock().unwrap().clone()
  }

  pub fn closed(&self) -> Vec<String> {
    self.closed.lock().unwrap().clone()
  }
}

#[async_trait]
impl Notifier for RecordingNotifier {
  async fn show(&self, intent: &NotificationIntent) -> HostResult<()> {
    self.shown.lock().unwrap().push(intent.clone());
    Ok(())
  }

  async fn close(&self, tag: &str) -> HostResult<()> {
    self.closed.lock().unwrap().push(tag.to_string());
    Ok(())
  }
}

/// Storage whose writes fail as if the disk were full.
pub struct FailingStorage {
  inner: SqliteStorage,
  put_attempts: AtomicUsize,
  /// Writes that succeed before the disk fills up
  capacity: usize,
}

impl FailingStorage {
  pub fn new() -> Self {
    Self::failing_after(0)
  }

  pub fn failing_after(capacity: usize) -> Self {
    Self {
      inner: SqliteStorage::open_in_memory().unwrap(),
      put_attempts: AtomicUsize::new(0),
      capacity,
    }
  }

  pub fn put_attempts(&self) -> usize {
    self.put_attempts.load(Ordering::SeqCst)
  }
}

impl CacheStorage for FailingStorage {
  fn open_partition(&self, name: &str) -> StoreResult<()> {
    self.inner.open_partition(name)
  }

  fn partition_names(&self) -> StoreResult<Vec<String>> {
    self.inner.partition_names()
  }

  fn delete_partition(&self, name: &str) -> StoreResult<bool> {
    self.inner.delete_partition(name)
  }

  fn match_request(
    &self,
    partition: &str,
    key: &RequestKey,
  ) -> StoreResult<Option<CachedResponse>> {
    self.inner.match_request(partition, key)
  }

  fn put(&self, partition: &str, key: &RequestKey, response: &Response) -> StoreResult<()> {
    if self.put_attempts.fetch_add(1, Ordering::SeqCst) < self.capacity {
      return self.inner.put(partition, key, response);
    }
    Err(StoreError::Sqlite(rusqlite::Error::SqliteFailure(
      rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
      Some("database or disk is full".to_string()),
    )))
  }

  fn delete_entry(&self, partition: &str, key: &RequestKey) -> StoreResult<bool> {
    self.inner.delete_entry(partition, key)
  }

  fn entry_count(&self, partition: &str) -> StoreResult<usize> {
    self.inner.entry_count(partition)
  }
}
