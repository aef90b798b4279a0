use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
  /// Origin of the web client the engine sits in front of
  pub origin: String,
  /// Engine version, stamped into every partition name
  pub version: u32,
  pub partitions: PartitionPrefixes,
  /// Core asset paths pre-cached into the app-shell partition on install
  pub manifest: Vec<String>,
  /// Document served when a navigation fails offline
  pub offline_page: String,
  /// Where a notification click lands when the payload carries no URL
  pub admin_landing: String,
  /// Give up on a network fetch after this many seconds (no limit if unset)
  pub fetch_timeout_secs: Option<u64>,
  /// Cache database location (defaults to $XDG_DATA_HOME/swcache/cache.db)
  pub database: Option<PathBuf>,
  /// Write logs to this file instead of stderr
  pub log_file: Option<PathBuf>,
  pub notification: NotificationDefaults,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: "http://localhost:3000".to_string(),
      version: 2,
      partitions: PartitionPrefixes::default(),
      manifest: [
        "/",
        "/index.html",
        "/offline.html",
        "/icons/icon-192.png",
        "/icons/icon-512.png",
        "/icons/badge-96.png",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      offline_page: "/offline.html".to_string(),
      admin_landing: "/admin".to_string(),
      fetch_timeout_secs: None,
      database: None,
      log_file: None,
      notification: NotificationDefaults::default(),
    }
  }
}

/// Name prefixes for each partition purpose; the version is appended as `-v{N}`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PartitionPrefixes {
  pub shell: String,
  pub admin: String,
  pub api: String,
}

impl Default for PartitionPrefixes {
  fn default() -> Self {
    Self {
      shell: "app-shell".to_string(),
      admin: "admin-cache".to_string(),
      api: "api-cache".to_string(),
    }
  }
}

/// Content used for any field a push payload leaves out, and for the whole
/// notification when the payload cannot be decoded.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NotificationDefaults {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub tag: String,
  /// Vibration pattern in milliseconds (on, off, on, ...)
  pub vibrate: Vec<u32>,
}

impl Default for NotificationDefaults {
  fn default() -> Self {
    Self {
      title: "New Order".to_string(),
      body: "You have a new order waiting.".to_string(),
      icon: "/icons/icon-192.png".to_string(),
      badge: "/icons/badge-96.png".to_string(),
      tag: "order-notification".to_string(),
      vibrate: vec![200, 100, 200],
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swcache.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swcache/config.yaml
  ///
  /// Falls back to built-in defaults when no file is found.
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
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swcache.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swcache").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_partial_config_keeps_defaults() {
    let config = Config::parse(
      r#"
origin: https://orders.example.com
version: 7
partitions:
  api: api-responses
notification:
  title: Kitchen
"#,
    )
    .unwrap();

    assert_eq!(config.origin, "https://orders.example.com");
    assert_eq!(config.version, 7);
    assert_eq!(config.partitions.api, "api-responses");
    assert_eq!(config.partitions.shell, "app-shell");
    assert_eq!(config.notification.title, "Kitchen");
    assert_eq!(config.notification.vibrate, vec![200, 100, 200]);
    assert_eq!(config.manifest.len(), 6);
    assert_eq!(config.offline_page, "/offline.html");
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/swcache.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_load_from_file() {
    let dir = std::env::temp_dir().join(format!("swcache-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.yaml");
    std::fs::write(&path, "fetch_timeout_secs: 5\nadmin_landing: /admin/orders\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.fetch_timeout_secs, Some(5));
    assert_eq!(config.admin_landing, "/admin/orders");

    std::fs::remove_dir_all(&dir).unwrap();
  }
}
