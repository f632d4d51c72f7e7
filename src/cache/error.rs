//! Cache and transport errors.

use std::sync::Arc;

use thiserror::Error;

/// Errors raised by the transport while performing a request.
#[derive(Debug, Error)]
pub enum TransportError {
  /// The request URL could not be resolved against the service root.
  #[error("Invalid request URL {url}: {source}")]
  InvalidUrl {
    url: String,
    #[source]
    source: url::ParseError,
  },

  /// The service answered with a non-success status.
  #[error("Request to {url} failed with status {status}: {body}")]
  Status {
    url: String,
    status: u16,
    body: String,
  },

  /// The request could not be sent or the response could not be read.
  #[error("Request to {url} failed: {source}")]
  Network {
    url: String,
    #[source]
    source: reqwest::Error,
  },

  /// The response body was not valid JSON.
  #[error("Response from {url} is not valid JSON: {source}")]
  Decode {
    url: String,
    #[source]
    source: serde_json::Error,
  },
}

/// Errors returned by cache reads.
///
/// `InvalidIndex` and `InvalidLength` are returned synchronously by
/// `CollectionCache::read`. All other variants are delivered through the
/// returned future. The type is `Clone` because a single failed request is
/// shared by every caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
  #[error("Illegal index {0}, must be >= 0")]
  InvalidIndex(i64),

  #[error("Illegal length {0}, must be >= 0")]
  InvalidLength(i64),

  /// A refresh happened while the request was in flight.
  #[error("Refresh canceled processing of pending request: {url}")]
  Canceled { url: String },

  #[error(transparent)]
  Transport(Arc<TransportError>),

  /// The response did not have the expected shape.
  #[error("Invalid response from {url}: {message}")]
  InvalidResponse { url: String, message: String },
}

impl CacheError {
  pub(crate) fn canceled(url: impl Into<String>) -> Self {
    Self::Canceled { url: url.into() }
  }

  /// True if the error only signals that a refresh discarded the request.
  pub fn is_canceled(&self) -> bool {
    matches!(self, Self::Canceled { .. })
  }
}

impl From<TransportError> for CacheError {
  fn from(err: TransportError) -> Self {
    Self::Transport(Arc::new(err))
  }
}
