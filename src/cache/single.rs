//! Cache for a single entity.

use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use super::error::CacheError;
use super::{lock, spawn_request};
use super::traits::Transport;
use crate::query::{build_query_string, QueryError, QueryOptions};

/// Future returned by [`SingleCache::read`]; every clone yields the same outcome.
pub type SingleRead = Shared<BoxFuture<'static, Result<Value, CacheError>>>;

struct SingleState {
  /// Advanced by each refresh
  epoch: u64,
  read: Option<SingleRead>,
}

/// Cache for a single entity: at most one request until the next refresh.
pub struct SingleCache {
  transport: Arc<dyn Transport>,
  url: String,
  state: Arc<Mutex<SingleState>>,
}

impl SingleCache {
  /// Create a cache for the entity at `path`.
  pub fn new(
    transport: Arc<dyn Transport>,
    path: &str,
    options: Option<&QueryOptions>,
  ) -> Result<Self, QueryError> {
    let query = build_query_string(options)?;

    Ok(Self {
      transport,
      url: format!("{}{}", path, query),
      state: Arc::new(Mutex::new(SingleState {
        epoch: 0,
        read: None,
      })),
    })
  }

  /// Read the entity.
  ///
  /// The first call sends the request; later calls share its outcome, success
  /// or failure, until [`refresh`](Self::refresh). A refresh while the request
  /// is in flight fails it with [`CacheError::Canceled`].
  pub fn read(&self) -> SingleRead {
    let mut state = lock(&self.state);
    if let Some(read) = &state.read {
      return read.clone();
    }

    let url = self.url.clone();
    debug!(%url, "requesting entity");
    let response = self.transport.request(Method::GET, &url);
    let weak = Arc::downgrade(&self.state);
    let epoch = state.epoch;

    let read = async move {
      let record = response.await?;
      let current = match weak.upgrade() {
        Some(shared) => {
          let state = lock(&shared);
          state.epoch == epoch
        }
        None => false,
      };
      if !current {
        debug!(%url, "discarding response of a request issued before refresh");
        return Err(CacheError::canceled(url));
      }
      Ok(record)
    }
    .boxed()
    .shared();

    state.read = Some(read.clone());
    spawn_request(read.clone());
    read
  }

  /// Forget the entity. A request still in flight is not aborted; its
  /// readers get [`CacheError::Canceled`] instead of the response.
  pub fn refresh(&self) {
    debug!(url = %self.url, "refreshing entity cache");
    let mut state = lock(&self.state);
    state.epoch += 1;
    state.read = None;
  }
}

impl fmt::Display for SingleCache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::mock::{server_error, MockTransport};
  use serde_json::json;

  const URL: &str = "/~/Employees('1')";

  #[tokio::test]
  async fn test_read_shares_one_request() {
    let transport = MockTransport::new(|_, _| Ok(json!({ "ID": "1" })));
    let options = json!({ "sap-client": "300" });
    let cache = SingleCache::new(transport.clone(), URL, options.as_object()).unwrap();

    let first = cache.read();
    let second = cache.read();

    assert_eq!(first.await.unwrap(), json!({ "ID": "1" }));
    assert_eq!(second.await.unwrap(), json!({ "ID": "1" }));
    assert_eq!(cache.read().await.unwrap(), json!({ "ID": "1" }));
    assert_eq!(transport.requests(), vec![format!("{}?sap-client=300", URL)]);
  }

  #[tokio::test]
  async fn test_failure_is_shared_until_refresh() {
    let transport = MockTransport::new(|call, url| {
      if call == 0 {
        Err(server_error(url))
      } else {
        Ok(json!({}))
      }
    });
    let cache = SingleCache::new(transport.clone(), URL, None).unwrap();

    assert!(cache.read().await.is_err());
    let err = cache.read().await.unwrap_err();
    assert!(matches!(err, CacheError::Transport(_)));
    assert_eq!(transport.requests().len(), 1);

    cache.refresh();
    assert_eq!(cache.read().await.unwrap(), json!({}));
    assert_eq!(transport.requests().len(), 2);
  }

  #[tokio::test]
  async fn test_refresh_basics() {
    let transport = MockTransport::new(|_, _| Ok(json!({})));
    let cache = SingleCache::new(transport.clone(), URL, None).unwrap();

    let read = cache.read();
    read.clone().await.unwrap();
    assert!(lock(&cache.state)
      .read
      .as_ref()
      .is_some_and(|cached| cached.ptr_eq(&read)));

    cache.refresh();
    assert!(lock(&cache.state).read.is_none());
  }

  #[tokio::test]
  async fn test_refresh_cancels_pending_request() {
    let transport = MockTransport::new(|call, _| Ok(json!({ "call": call })));
    let cache = SingleCache::new(transport.clone(), URL, None).unwrap();

    let canceled = cache.read();
    cache.refresh();
    let fresh = cache.read();

    let err = canceled.await.unwrap_err();
    assert!(err.is_canceled());
    assert_eq!(
      err.to_string(),
      "Refresh canceled processing of pending request: /~/Employees('1')"
    );
    assert_eq!(fresh.await.unwrap(), json!({ "call": 1 }));
    assert_eq!(transport.requests(), vec![URL.to_string(), URL.to_string()]);
  }

  #[tokio::test]
  async fn test_request_is_sent_before_read_is_awaited() {
    let transport = MockTransport::new(|_, _| Ok(json!({ "ID": "1" })));
    let cache = SingleCache::new(transport.clone(), URL, None).unwrap();

    let read = cache.read();
    tokio::task::yield_now().await;
    assert_eq!(transport.sent(), 1);

    assert_eq!(read.await.unwrap(), json!({ "ID": "1" }));
    assert_eq!(transport.sent(), 1);
  }

  #[test]
  fn test_to_string() {
    let transport = MockTransport::new(|_, _| Ok(json!({})));
    let cache = SingleCache::new(transport, URL, None).unwrap();
    assert_eq!(cache.to_string(), URL);
  }
}
