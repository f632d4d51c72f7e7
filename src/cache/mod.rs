//! Read caches for OData resources.
//!
//! This module mediates between consumers and an OData service:
//! - `CollectionCache` keeps a sparse, growing view of a collection and only
//!   requests the `$skip`/`$top` ranges nobody has requested yet
//! - `SingleCache` requests one entity at most once until refreshed
//! - A refresh never lets a response of an older request overwrite newer
//!   state; such responses fail with [`CacheError::Canceled`]

mod collection;
mod error;
mod single;
mod store;
mod traits;

#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub use collection::{CollectionCache, ReadFuture};
pub use error::{CacheError, TransportError};
pub use single::{SingleCache, SingleRead};
pub use traits::{CollectionPage, Transport};

use crate::query::{QueryError, QueryOptions};

/// Create a cache for the collection at `url`.
pub fn create(
  transport: Arc<dyn Transport>,
  url: &str,
  options: Option<&QueryOptions>,
) -> Result<CollectionCache, QueryError> {
  CollectionCache::new(transport, url, options)
}

/// Create a cache for the single entity at `url`.
pub fn create_single(
  transport: Arc<dyn Transport>,
  url: &str,
  options: Option<&QueryOptions>,
) -> Result<SingleCache, QueryError> {
  SingleCache::new(transport, url, options)
}

/// Cache state is only mutated in short critical sections that leave it
/// consistent, so a poisoned lock is still usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drive a request on the current tokio runtime, so it is sent and its
/// response merged whether or not anybody awaits it. Outside a runtime the
/// request only makes progress when awaited.
fn spawn_request<F>(request: F)
where
  F: Future + Send + 'static,
  F::Output: Send + 'static,
{
  if let Ok(handle) = tokio::runtime::Handle::try_current() {
    handle.spawn(request);
  }
}
