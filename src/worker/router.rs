//! Request classification: which partition, which strategy.

use url::Url;

use crate::cache::{Destination, Purpose, Request};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  CacheFirst,
  NetworkFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
  pub purpose: Purpose,
  pub strategy: Strategy,
}

impl Route {
  const fn new(purpose: Purpose, strategy: Strategy) -> Self {
    Self { purpose, strategy }
  }
}

/// Classify a request. Rules are checked in order, first match wins.
///
/// Returns `None` for cross-origin requests, which are never intercepted.
pub fn classify(origin: &Url, request: &Request) -> Option<Route> {
  if request.url.origin() != origin.origin() {
    return None;
  }

  let path = request.url.path();
  let route = if is_admin_path(path) {
    Route::new(Purpose::AdminAssets, Strategy::CacheFirst)
  } else if path.starts_with("/api/") {
    Route::new(Purpose::ApiResponses, Strategy::NetworkFirst)
  } else if matches!(
    request.destination,
    Destination::Script | Destination::Style | Destination::Image
  ) {
    Route::new(Purpose::Shell, Strategy::CacheFirst)
  } else {
    Route::new(Purpose::Shell, Strategy::NetworkFirst)
  };

  Some(route)
}

/// Admin pages and the admin bundle chunks (`admin-*.js`, `AdminDashboard-*.js`).
fn is_admin_path(path: &str) -> bool {
  path.starts_with("/admin") || path.contains("admin-") || path.contains("Admin")
}
