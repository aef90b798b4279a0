//! Push payload decoding and notification click handling.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::NotificationDefaults;
use crate::host::{ClientMessage, Clients, Notifier, WindowClient};

/// Push message body as sent by the backend. Every field is optional, and a
/// field of the wrong type is treated as missing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushPayload {
  #[serde(default, deserialize_with = "lenient")]
  pub title: Option<String>,
  #[serde(default, deserialize_with = "lenient")]
  pub body: Option<String>,
  #[serde(default, deserialize_with = "lenient")]
  pub icon: Option<String>,
  #[serde(default, deserialize_with = "lenient")]
  pub badge: Option<String>,
  #[serde(default, deserialize_with = "lenient")]
  pub tag: Option<String>,
  #[serde(default, deserialize_with = "lenient")]
  pub data: Option<NotificationData>,
  #[serde(default, deserialize_with = "deserialize_actions")]
  pub actions: Option<Vec<NotificationAction>>,
}

/// Extra data carried by a notification and handed back on click.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationData {
  #[serde(
    default,
    deserialize_with = "lenient",
    skip_serializing_if = "Option::is_none"
  )]
  pub url: Option<String>,
  #[serde(
    default,
    deserialize_with = "deserialize_identifier",
    skip_serializing_if = "Option::is_none"
  )]
  pub order_number: Option<String>,
  /// Older payloads send `orderId` instead of `orderNumber`
  #[serde(
    default,
    deserialize_with = "deserialize_identifier",
    skip_serializing_if = "Option::is_none"
  )]
  pub order_id: Option<String>,
  #[serde(
    default,
    deserialize_with = "lenient",
    skip_serializing_if = "Option::is_none"
  )]
  pub default_tab: Option<String>,
  /// Anything else the backend sent along
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl NotificationData {
  /// The order this notification is about: `orderNumber` when present,
  /// otherwise the legacy `orderId`.
  pub fn order_identifier(&self) -> Option<&str> {
    self.order_number.as_deref().or(self.order_id.as_deref())
  }
}

/// Any value that does not fit `T` becomes `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
  D: Deserializer<'de>,
  T: DeserializeOwned,
{
  let value = Value::deserialize(deserializer)?;
  Ok(T::deserialize(value).ok())
}

/// Keep every action that names itself; an action without a title is
/// labelled with its name.
fn deserialize_actions<'de, D>(deserializer: D) -> Result<Option<Vec<NotificationAction>>, D::Error>
where
  D: Deserializer<'de>,
{
  let Value::Array(items) = Value::deserialize(deserializer)? else {
    return Ok(None);
  };
  let actions = items
    .into_iter()
    .filter_map(|item| {
      let mut action = NotificationAction::deserialize(item).ok()?;
      if action.title.is_empty() {
        action.title = action.action.clone();
      }
      Some(action)
    })
    .collect();
  Ok(Some(actions))
}

/// Identifiers arrive as strings or bare numbers.
fn deserialize_identifier<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(match Option::<Value>::deserialize(deserializer)? {
    Some(Value::String(s)) => Some(s),
    Some(Value::Number(n)) => Some(n.to_string()),
    _ => None,
  })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  #[serde(default)]
  pub title: String,
  #[serde(
    default,
    deserialize_with = "lenient",
    skip_serializing_if = "Option::is_none"
  )]
  pub icon: Option<String>,
}

impl NotificationAction {
  fn new(action: &str, title: &str) -> Self {
    Self {
      action: action.to_string(),
      title: title.to_string(),
      icon: None,
    }
  }
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationIntent {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Dedup key: a new notification with the same tag replaces the old one
  pub tag: String,
  pub data: NotificationData,
  pub actions: Vec<NotificationAction>,
  pub vibrate: Vec<u32>,
  pub require_interaction: bool,
  pub renotify: bool,
}

impl NotificationIntent {
  /// Decode a raw push body. Missing or malformed payloads still produce a
  /// notification built from the defaults; a JSON object with some bad fields
  /// keeps the good ones.
  pub fn from_push(payload: Option<&[u8]>, defaults: &NotificationDefaults) -> Self {
    let Some(raw) = payload else {
      debug!("push without payload, using default notification");
      return Self::from_payload(PushPayload::default(), defaults);
    };
    let payload = match serde_json::from_slice::<Value>(raw) {
      Ok(value @ Value::Object(_)) => PushPayload::deserialize(value).unwrap_or_else(|e| {
        warn!(error = %e, "malformed push payload, using default notification");
        PushPayload::default()
      }),
      Ok(_) => {
        warn!("push payload is not a JSON object, using default notification");
        PushPayload::default()
      }
      Err(e) => {
        warn!(error = %e, "malformed push payload, using default notification");
        PushPayload::default()
      }
    };
    Self::from_payload(payload, defaults)
  }

  pub fn from_payload(payload: PushPayload, defaults: &NotificationDefaults) -> Self {
    Self {
      title: payload.title.unwrap_or_else(|| defaults.title.clone()),
      body: payload.body.unwrap_or_else(|| defaults.body.clone()),
      icon: payload.icon.unwrap_or_else(|| defaults.icon.clone()),
      badge: payload.badge.unwrap_or_else(|| defaults.badge.clone()),
      tag: payload.tag.unwrap_or_else(|| defaults.tag.clone()),
      data: payload.data.unwrap_or_default(),
      actions: payload.actions.unwrap_or_else(|| {
        vec![
          NotificationAction::new("view", "View Order"),
          NotificationAction::new("acknowledge", "Acknowledge"),
        ]
      }),
      vibrate: defaults.vibrate.clone(),
      require_interaction: true,
      renotify: true,
    }
  }
}

/// What a notification click ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// Closed, nothing else to do
  Dismissed,
  /// Acknowledge action; the order id is only logged for now
  Acknowledged { order: Option<String> },
  /// An existing window was focused and navigated
  FocusedWindow {
    window: String,
    url: Url,
    tab: Option<String>,
  },
  /// A new window was opened; a requested tab cannot reach it
  OpenedWindow { url: Url },
}

pub struct NotificationHandler {
  clients: Arc<dyn Clients>,
  notifier: Arc<dyn Notifier>,
  origin: Url,
  admin_landing: String,
  defaults: NotificationDefaults,
}

impl NotificationHandler {
  pub fn new(
    clients: Arc<dyn Clients>,
    notifier: Arc<dyn Notifier>,
    origin: Url,
    admin_landing: String,
    defaults: NotificationDefaults,
  ) -> Self {
    Self {
      clients,
      notifier,
      origin,
      admin_landing,
      defaults,
    }
  }

  /// Decode and display a push message.
  pub async fn on_push(&self, payload: Option<&[u8]>) -> NotificationIntent {
    let intent = NotificationIntent::from_push(payload, &self.defaults);
    if let Err(e) = self.notifier.show(&intent).await {
      warn!(tag = %intent.tag, error = %e, "failed to show notification");
    }
    intent
  }

  pub async fn on_click(&self, intent: &NotificationIntent, action: Option<&str>) -> ClickOutcome {
    if let Err(e) = self.notifier.close(&intent.tag).await {
      warn!(tag = %intent.tag, error = %e, "failed to close notification");
    }

    match action {
      Some("view") => match intent.data.url.as_deref() {
        Some(target) => {
          let url = self.resolve(target);
          self.open_window(url).await
        }
        None => ClickOutcome::Dismissed,
      },
      Some("acknowledge") => {
        let order = intent.data.order_identifier().map(String::from);
        // No backend call yet, the id is only recorded
        info!(
          order = order.as_deref().unwrap_or("unknown"),
          "order acknowledged from notification"
        );
        ClickOutcome::Acknowledged { order }
      }
      Some(other) => {
        debug!(action = other, "ignoring unknown notification action");
        ClickOutcome::Dismissed
      }
      None => self.open_target(intent).await,
    }
  }

  /// Body click: reuse an open window if there is one, otherwise open a new one.
  async fn open_target(&self, intent: &NotificationIntent) -> ClickOutcome {
    let target = intent
      .data
      .url
      .as_deref()
      .unwrap_or(self.admin_landing.as_str());
    let url = self.resolve(target);
    let tab = intent.data.default_tab.clone();

    let windows = self.clients.windows().await.unwrap_or_else(|e| {
      warn!(error = %e, "failed to list windows");
      Vec::new()
    });

    let Some(window) = pick_window(&windows) else {
      if let Some(tab) = &tab {
        debug!(tab = %tab, "new window cannot receive the tab preference");
      }
      return self.open_window(url).await;
    };

    if let Some(tab) = &tab {
      let message = ClientMessage::SetAdminTab { tab: tab.clone() };
      if let Err(e) = self.clients.post_message(&window.id, &message).await {
        warn!(window = %window.id, error = %e, "failed to send tab preference");
      }
    }
    if let Err(e) = self.clients.focus(&window.id).await {
      warn!(window = %window.id, error = %e, "failed to focus window");
    }
    if let Err(e) = self.clients.navigate(&window.id, &url).await {
      warn!(window = %window.id, error = %e, "failed to navigate window");
    }

    ClickOutcome::FocusedWindow {
      window: window.id.clone(),
      url,
      tab,
    }
  }

  async fn open_window(&self, url: Url) -> ClickOutcome {
    if let Err(e) = self.clients.open_window(&url).await {
      warn!(url = %url, error = %e, "failed to open window");
    }
    ClickOutcome::OpenedWindow { url }
  }

  /// Resolve a payload URL against the origin; unusable URLs land on the admin page.
  fn resolve(&self, target: &str) -> Url {
    self.origin.join(target).unwrap_or_else(|e| {
      warn!(url = target, error = %e, "bad notification url, using admin landing");
      self
        .origin
        .join(&self.admin_landing)
        .unwrap_or_else(|_| self.origin.clone())
    })
  }
}

/// Prefer the focused window, otherwise the first one.
fn pick_window(windows: &[WindowClient]) -> Option<&WindowClient> {
  windows.iter().find(|w| w.focused).or_else(|| windows.first())
}
