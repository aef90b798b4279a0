//! Versioned partition naming.

use crate::config::PartitionPrefixes;

/// What a partition holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
  /// Root document, offline page, icons and other static assets
  Shell,
  /// Admin dashboard bundles and pages
  AdminAssets,
  /// REST responses
  ApiResponses,
}

/// The current partition name for each purpose.
///
/// Every name carries the engine version, so anything on disk that is not in
/// this table belongs to an older version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionNames {
  shell: String,
  admin: String,
  api: String,
}

impl PartitionNames {
  pub fn versioned(prefixes: &PartitionPrefixes, version: u32) -> Self {
    Self {
      shell: format!("{}-v{}", prefixes.shell, version),
      admin: format!("{}-v{}", prefixes.admin, version),
      api: format!("{}-v{}", prefixes.api, version),
    }
  }

  pub fn name(&self, purpose: Purpose) -> &str {
    match purpose {
      Purpose::Shell => &self.shell,
      Purpose::AdminAssets => &self.admin,
      Purpose::ApiResponses => &self.api,
    }
  }

  pub fn all(&self) -> [&str; 3] {
    [&self.shell, &self.admin, &self.api]
  }

  pub fn is_current(&self, name: &str) -> bool {
    self.all().contains(&name)
  }
}
