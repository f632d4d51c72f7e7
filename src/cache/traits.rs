//! Core traits and types for the caching system.

use futures::future::BoxFuture;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{CacheError, TransportError};

/// Capability to send requests to an OData service.
///
/// The returned future resolves to the decoded JSON body. Caches treat
/// failures as opaque and hand them to their callers unchanged. `request` is
/// called while the cache holds its lock and must not call back into it.
pub trait Transport: Send + Sync {
  fn request(&self, method: Method, url: &str) -> BoxFuture<'static, Result<Value, TransportError>>;
}

/// A range of a collection as an OData response object.
///
/// Used both for the responses of `$skip`/`$top` requests and for the
/// result of `CollectionCache::read`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPage {
  /// The `@odata.context` annotation of the response
  #[serde(
    rename = "@odata.context",
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub context: Option<String>,
  /// The records in order
  pub value: Vec<Value>,
}

impl CollectionPage {
  /// Decode a collection response body received from `url`.
  pub(crate) fn from_response(body: Value, url: &str) -> Result<Self, CacheError> {
    serde_json::from_value(body).map_err(|e| CacheError::InvalidResponse {
      url: url.to_string(),
      message: e.to_string(),
    })
  }
}
