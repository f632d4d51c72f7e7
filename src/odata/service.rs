//! OData service facade that hands out caches with default query options.

use std::sync::Arc;

use color_eyre::Result;

use crate::cache::{self, CollectionCache, SingleCache, Transport};
use crate::config::Config;
use crate::query::QueryOptions;

use super::client::HttpTransport;

/// An OData service with a shared transport.
///
/// Every cache created here gets the configured default query options;
/// options passed by the caller override defaults with the same name.
#[derive(Clone)]
pub struct ODataService {
  transport: Arc<dyn Transport>,
  default_options: QueryOptions,
}

impl ODataService {
  /// Create a service client from configuration.
  pub fn new(config: &Config) -> Result<Self> {
    let transport = HttpTransport::new(&config.service.url, &config.service.headers)?;
    Ok(Self::with_transport(
      Arc::new(transport),
      config.query_options.clone(),
    ))
  }

  /// Create a service client on top of an existing transport.
  pub fn with_transport(transport: Arc<dyn Transport>, default_options: QueryOptions) -> Self {
    Self {
      transport,
      default_options,
    }
  }

  /// Create a cache for the collection at `path`.
  pub fn collection(&self, path: &str, options: &QueryOptions) -> Result<CollectionCache> {
    let options = self.merged_options(options);
    Ok(cache::create(
      Arc::clone(&self.transport),
      path,
      Some(&options),
    )?)
  }

  /// Create a cache for the entity at `path`.
  pub fn entity(&self, path: &str, options: &QueryOptions) -> Result<SingleCache> {
    let options = self.merged_options(options);
    Ok(cache::create_single(
      Arc::clone(&self.transport),
      path,
      Some(&options),
    )?)
  }

  fn merged_options(&self, options: &QueryOptions) -> QueryOptions {
    let mut merged = self.default_options.clone();
    for (key, value) in options {
      merged.insert(key.clone(), value.clone());
    }
    merged
  }
}
