//! Cache for a collection of entities, read in ranges.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Mutex};

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use reqwest::Method;
use tracing::{debug, warn};

use super::error::CacheError;
use super::{lock, spawn_request};
use super::store::ElementStore;
use super::traits::{CollectionPage, Transport};
use crate::query::{build_query_string, QueryError, QueryOptions};

/// Future returned by cache reads.
pub type ReadFuture<T> = BoxFuture<'static, Result<T, CacheError>>;

/// Cache for a collection of entities.
///
/// Elements are requested in contiguous `$skip`/`$top` ranges and kept in a
/// sparse store. A read only requests the indexes nobody has requested yet;
/// indexes already pending are awaited, resolved ones are reused.
pub struct CollectionCache {
  transport: Arc<dyn Transport>,
  /// Resource path plus query string, ready for `$skip`/`$top` to be appended
  url: String,
  store: Arc<Mutex<ElementStore>>,
}

impl CollectionCache {
  /// Create a cache for the collection at `path`.
  ///
  /// The query options are encoded once; fails if they contain an
  /// unsupported system query option.
  pub fn new(
    transport: Arc<dyn Transport>,
    path: &str,
    options: Option<&QueryOptions>,
  ) -> Result<Self, QueryError> {
    let query = build_query_string(options)?;
    let separator = if query.is_empty() { "?" } else { "&" };

    Ok(Self {
      transport,
      url: format!("{}{}{}", path, query, separator),
      store: Arc::new(Mutex::new(ElementStore::new())),
    })
  }

  /// Read the range `index..index + length`.
  ///
  /// Negative arguments are rejected right away. The returned future
  /// resolves with the `@odata.context` and the records of the range, clipped
  /// to the collection length once it is known. If a request for the range
  /// fails, its indexes are forgotten and the error is returned, so a later
  /// read retries. A refresh while the range is pending fails the future with
  /// [`CacheError::Canceled`].
  pub fn read(&self, index: i64, length: i64) -> Result<ReadFuture<CollectionPage>, CacheError> {
    let start = usize::try_from(index).map_err(|_| CacheError::InvalidIndex(index))?;
    let length = usize::try_from(length).map_err(|_| CacheError::InvalidLength(length))?;
    let end = start.saturating_add(length);

    // Gaps are filled with their pending requests before the lock is
    // released, so an overlapping read never requests them again.
    let (pending, epoch) = {
      let mut store = lock(&self.store);
      let clipped = store.clip(end);
      for gap in store.gaps(start, clipped) {
        self.request_elements(&mut store, gap);
      }
      (store.pending_in(start, clipped), store.epoch())
    };

    let store = Arc::downgrade(&self.store);
    let url = self.url.clone();

    Ok(
      async move {
        future::try_join_all(pending).await?;

        let store = store
          .upgrade()
          .ok_or_else(|| CacheError::canceled(url.as_str()))?;
        let store = lock(&store);
        if store.epoch() != epoch {
          return Err(CacheError::canceled(url));
        }

        let end = store.clip(end);
        Ok(CollectionPage {
          context: store.context().map(String::from),
          value: store.slice(start, end),
        })
      }
      .boxed(),
    )
  }

  /// Clear the cache. Requests still in flight are not aborted, but their
  /// responses are discarded and their readers get [`CacheError::Canceled`].
  pub fn refresh(&self) {
    debug!(url = %self.url, "refreshing collection cache");
    lock(&self.store).clear();
  }

  /// Request `range` and mark it pending in `store`. The request runs in the
  /// background; readers only await its shared completion.
  fn request_elements(&self, store: &mut ElementStore, range: Range<usize>) {
    let url = format!(
      "{}$skip={}&$top={}",
      self.url,
      range.start,
      range.len()
    );
    debug!(%url, "requesting elements");

    let response = self.transport.request(Method::GET, &url);
    let weak = Arc::downgrade(&self.store);
    let epoch = store.epoch();
    let gap = range.clone();

    let pending = async move {
      let result = match response.await {
        Ok(body) => CollectionPage::from_response(body, &url),
        Err(err) => Err(CacheError::from(err)),
      };

      let Some(shared) = weak.upgrade() else {
        return Err(result.err().unwrap_or_else(|| CacheError::canceled(url)));
      };
      let mut store = lock(&shared);
      let current = store.epoch() == epoch;

      match result {
        Ok(page) if current => {
          store.apply(gap, page);
          Ok(())
        }
        Ok(_) => {
          debug!(%url, "discarding response of a request issued before refresh");
          Err(CacheError::canceled(url))
        }
        Err(err) => {
          if current {
            warn!(%url, error = %err, "request failed, range will be requested again");
            store.reset(gap);
          }
          Err(err)
        }
      }
    }
    .boxed()
    .shared();

    store.fill_pending(range, &pending);
    spawn_request(pending);
  }
}

impl fmt::Display for CollectionCache {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.url)
  }
}
