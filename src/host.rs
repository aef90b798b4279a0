//! Page sessions and the notification tray, as seen from the engine.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use thiserror::Error;
use url::Url;

use crate::worker::NotificationIntent;

#[derive(Debug, Error)]
pub enum HostError {
  #[error("no window with id {0}")]
  UnknownWindow(String),

  #[error("host rejected the operation: {0}")]
  Rejected(String),
}

pub type HostResult<T> = std::result::Result<T, HostError>;

/// An open page session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: String,
  pub url: String,
  pub focused: bool,
}

/// Messages posted from the engine to a page session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
  /// Ask the page to remember which admin tab to show
  SetAdminTab { tab: String },
}

/// The set of page sessions the engine can see and control.
#[async_trait]
pub trait Clients: Send + Sync {
  /// Activate this engine without waiting for existing sessions to close.
  async fn skip_waiting(&self) -> HostResult<()>;

  /// Take control of every open session immediately.
  async fn claim(&self) -> HostResult<()>;

  /// Open window sessions, in most-recently-focused order.
  async fn windows(&self) -> HostResult<Vec<WindowClient>>;

  async fn focus(&self, id: &str) -> HostResult<()>;

  async fn navigate(&self, id: &str, url: &Url) -> HostResult<()>;

  async fn post_message(&self, id: &str, message: &ClientMessage) -> HostResult<()>;

  async fn open_window(&self, url: &Url) -> HostResult<()>;
}

/// The OS notification tray.
#[async_trait]
pub trait Notifier: Send + Sync {
  async fn show(&self, intent: &NotificationIntent) -> HostResult<()>;

  /// Close the notification with this tag.
  async fn close(&self, tag: &str) -> HostResult<()>;
}

/// Headless host for the CLI: prints every command it receives to stdout.
pub struct ConsoleHost {
  windows: Mutex<Vec<WindowClient>>,
}

impl ConsoleHost {
  /// A host with the given windows already open. The first one is focused.
  pub fn new(open_windows: &[String]) -> Self {
    let windows = open_windows
      .iter()
      .enumerate()
      .map(|(i, url)| WindowClient {
        id: format!("window-{}", i + 1),
        url: url.clone(),
        focused: i == 0,
      })
      .collect();

    Self {
      windows: Mutex::new(windows),
    }
  }

  fn with_windows<T>(
    &self,
    f: impl FnOnce(&mut Vec<WindowClient>) -> HostResult<T>,
  ) -> HostResult<T> {
    let mut windows = self
      .windows
      .lock()
      .map_err(|_| HostError::Rejected("window list lock poisoned".to_string()))?;
    f(&mut windows)
  }
}

#[async_trait]
impl Clients for ConsoleHost {
  async fn skip_waiting(&self) -> HostResult<()> {
    println!("host: skip waiting");
    Ok(())
  }

  async fn claim(&self) -> HostResult<()> {
    println!("host: claimed sessions");
    Ok(())
  }

  async fn windows(&self) -> HostResult<Vec<WindowClient>> {
    self.with_windows(|windows| Ok(windows.clone()))
  }

  async fn focus(&self, id: &str) -> HostResult<()> {
    self.with_windows(|windows| {
      if !windows.iter().any(|w| w.id == id) {
        return Err(HostError::UnknownWindow(id.to_string()));
      }
      for w in windows.iter_mut() {
        w.focused = w.id == id;
      }
      println!("host: focus {}", id);
      Ok(())
    })
  }

  async fn navigate(&self, id: &str, url: &Url) -> HostResult<()> {
    self.with_windows(|windows| {
      let window = windows
        .iter_mut()
        .find(|w| w.id == id)
        .ok_or_else(|| HostError::UnknownWindow(id.to_string()))?;
      window.url = url.to_string();
      println!("host: navigate {} -> {}", id, url);
      Ok(())
    })
  }

  async fn post_message(&self, id: &str, message: &ClientMessage) -> HostResult<()> {
    let payload =
      serde_json::to_string(message).map_err(|e| HostError::Rejected(e.to_string()))?;
    println!("host: message {} {}", id, payload);
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> HostResult<()> {
    self.with_windows(|windows| {
      let id = format!("window-{}", windows.len() + 1);
      for w in windows.iter_mut() {
        w.focused = false;
      }
      println!("host: open {} -> {}", id, url);
      windows.push(WindowClient {
        id,
        url: url.to_string(),
        focused: true,
      });
      Ok(())
    })
  }
}

#[async_trait]
impl Notifier for ConsoleHost {
  async fn show(&self, intent: &NotificationIntent) -> HostResult<()> {
    let payload =
      serde_json::to_string_pretty(intent).map_err(|e| HostError::Rejected(e.to_string()))?;
    println!("host: show notification\n{}", payload);
    Ok(())
  }

  async fn close(&self, tag: &str) -> HostResult<()> {
    println!("host: close notification {}", tag);
    Ok(())
  }
}
