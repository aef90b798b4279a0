//! Network access used by the engine.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::cache::{Request, Response, ResponseType};

#[derive(Debug, Error)]
pub enum NetworkError {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("network unreachable: {0}")]
  Unreachable(String),

  #[error("request timed out after {0:?}")]
  Timeout(Duration),
}

/// Something that can put a request on the wire.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError>;
}

/// Fetch with an optional deadline.
///
/// Without a deadline a hung fetch hangs the caller.
pub async fn fetch_with_timeout(
  network: &dyn Network,
  request: &Request,
  timeout: Option<Duration>,
) -> Result<Response, NetworkError> {
  match timeout {
    Some(limit) => tokio::time::timeout(limit, network.fetch(request))
      .await
      .map_err(|_| NetworkError::Timeout(limit))?,
    None => network.fetch(request).await,
  }
}

/// reqwest-backed network.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: Url) -> Result<Self, NetworkError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("swcache/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client, origin })
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| NetworkError::Unreachable(format!("invalid method {}: {}", request.method, e)))?;

    let resp = self
      .client
      .request(method, request.url.clone())
      .send()
      .await?;

    // Redirects can land on another origin
    let response_type = if resp.url().origin() == self.origin.origin() {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    };
    let status = resp.status().as_u16();
    let headers = resp
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();
    let body = resp.bytes().await?;

    Ok(Response {
      status,
      response_type,
      headers,
      body,
    })
  }
}
