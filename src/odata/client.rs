use std::collections::BTreeMap;

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::Method;
use serde_json::Value;
use url::Url;

use crate::cache::{Transport, TransportError};

/// HTTP transport for an OData v4 service.
#[derive(Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
  service_root: Url,
}

impl HttpTransport {
  /// Create a transport for the service at `service_url`.
  ///
  /// Resource URLs passed to [`Transport::request`] are resolved against it.
  pub fn new(service_url: &str, headers: &BTreeMap<String, String>) -> Result<Self> {
    let service_root = Self::service_root(service_url)?;

    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
    default_headers.insert(
      HeaderName::from_static("odata-version"),
      HeaderValue::from_static("4.0"),
    );
    for (name, value) in headers {
      let name = HeaderName::from_bytes(name.as_bytes())
        .map_err(|e| eyre!("Invalid header name {}: {}", name, e))?;
      let value = HeaderValue::from_str(value)
        .map_err(|e| eyre!("Invalid value for header {}: {}", name, e))?;
      default_headers.insert(name, value);
    }

    let client = reqwest::Client::builder()
      .default_headers(default_headers)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      client,
      service_root,
    })
  }

  /// Parse the service URL; a missing trailing slash is added so relative
  /// resource paths resolve below it.
  fn service_root(service_url: &str) -> Result<Url> {
    let mut root = Url::parse(service_url)
      .map_err(|e| eyre!("Invalid service URL {}: {}", service_url, e))?;
    if !root.path().ends_with('/') {
      let path = format!("{}/", root.path());
      root.set_path(&path);
    }
    Ok(root)
  }

  /// Resolve a resource URL against the service root.
  pub fn resolve(&self, url: &str) -> Result<Url, TransportError> {
    self
      .service_root
      .join(url)
      .map_err(|source| TransportError::InvalidUrl {
        url: url.to_string(),
        source,
      })
  }
}

impl Transport for HttpTransport {
  fn request(&self, method: Method, url: &str) -> BoxFuture<'static, Result<Value, TransportError>> {
    let resolved = self.resolve(url);
    let client = self.client.clone();
    let url = url.to_string();

    async move {
      let response = client
        .request(method, resolved?)
        .send()
        .await
        .map_err(|source| TransportError::Network {
          url: url.clone(),
          source,
        })?;

      let status = response.status();
      let body = response
        .bytes()
        .await
        .map_err(|source| TransportError::Network {
          url: url.clone(),
          source,
        })?;

      if !status.is_success() {
        return Err(TransportError::Status {
          url,
          status: status.as_u16(),
          body: String::from_utf8_lossy(&body).into_owned(),
        });
      }

      serde_json::from_slice(&body).map_err(|source| TransportError::Decode { url, source })
    }
    .boxed()
  }
}
