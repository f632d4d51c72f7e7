use clap::{Args, Subcommand};
use color_eyre::{eyre::eyre, Result};
use futures::future;
use serde_json::{json, Value};
use tracing::info;

use odc::cache::CollectionPage;
use odc::config::Config;
use odc::odata::ODataService;
use odc::query::QueryOptions;

/// Commands of the command line interface
#[derive(Subcommand, Debug)]
pub enum Command {
  /// Read ranges of a collection
  Read {
    /// Collection path relative to the service root (e.g. "SalesOrders")
    path: String,

    /// Range as skip:top; repeat to read several ranges through one cache
    #[arg(short, long = "range", value_parser = parse_range, allow_hyphen_values = true)]
    ranges: Vec<(i64, i64)>,

    #[command(flatten)]
    options: OptionArgs,
  },
  /// Read a single entity
  Get {
    /// Entity path relative to the service root (e.g. "SalesOrders('42')")
    path: String,

    #[command(flatten)]
    options: OptionArgs,
  },
}

/// Query options given on the command line
#[derive(Args, Debug, Default)]
pub struct OptionArgs {
  /// Properties to select, comma separated
  #[arg(long, value_delimiter = ',')]
  select: Vec<String>,

  /// Navigation property to expand; repeat for several
  #[arg(long)]
  expand: Vec<String>,

  /// Custom query option as key=value
  #[arg(long = "param", value_parser = parse_param)]
  params: Vec<(String, String)>,
}

impl OptionArgs {
  fn to_query_options(&self) -> QueryOptions {
    let mut options = QueryOptions::new();
    for (key, value) in &self.params {
      options.insert(key.clone(), json!(value));
    }
    if !self.expand.is_empty() {
      let expand: QueryOptions = self
        .expand
        .iter()
        .map(|path| (path.clone(), Value::Bool(true)))
        .collect();
      options.insert("$expand".to_string(), Value::Object(expand));
    }
    if !self.select.is_empty() {
      options.insert("$select".to_string(), json!(self.select));
    }
    options
  }
}

fn parse_range(s: &str) -> Result<(i64, i64), String> {
  let (skip, top) = s
    .split_once(':')
    .ok_or_else(|| format!("expected skip:top, got '{}'", s))?;
  let skip = skip
    .trim()
    .parse()
    .map_err(|e| format!("invalid skip '{}': {}", skip, e))?;
  let top = top
    .trim()
    .parse()
    .map_err(|e| format!("invalid top '{}': {}", top, e))?;
  Ok((skip, top))
}

fn parse_param(s: &str) -> Result<(String, String), String> {
  let (key, value) = s
    .split_once('=')
    .ok_or_else(|| format!("expected key=value, got '{}'", s))?;
  if key.is_empty() {
    return Err(format!("empty key in '{}'", s));
  }
  Ok((key.to_string(), value.to_string()))
}

/// Main application state
pub struct App {
  service: ODataService,
  /// Range length used when no range is given
  page_size: usize,
}

impl App {
  pub fn new(config: &Config) -> Result<Self> {
    Ok(Self::with_service(
      ODataService::new(config)?,
      config.page_size,
    ))
  }

  fn with_service(service: ODataService, page_size: usize) -> Self {
    Self { service, page_size }
  }

  pub async fn run(&self, command: Command) -> Result<()> {
    match command {
      Command::Read {
        path,
        ranges,
        options,
      } => {
        let pages = self.read(&path, ranges, &options).await?;
        for page in pages {
          println!("{}", serde_json::to_string_pretty(&page)?);
        }
      }
      Command::Get { path, options } => {
        let record = self.get(&path, &options).await?;
        println!("{}", serde_json::to_string_pretty(&record)?);
      }
    }
    Ok(())
  }

  /// Read all ranges through one collection cache.
  ///
  /// Every read is issued before any is awaited, so overlapping ranges share
  /// their requests.
  async fn read(
    &self,
    path: &str,
    ranges: Vec<(i64, i64)>,
    options: &OptionArgs,
  ) -> Result<Vec<CollectionPage>> {
    let cache = self
      .service
      .collection(path, &options.to_query_options())?;
    let ranges = if ranges.is_empty() {
      let top = i64::try_from(self.page_size).map_err(|e| eyre!("Invalid page size: {}", e))?;
      vec![(0, top)]
    } else {
      ranges
    };
    info!(%cache, ranges = ranges.len(), "reading collection");

    let reads = ranges
      .iter()
      .map(|&(skip, top)| cache.read(skip, top))
      .collect::<Result<Vec<_>, _>>()?;
    let pages = future::try_join_all(reads).await?;

    Ok(pages)
  }

  async fn get(&self, path: &str, options: &OptionArgs) -> Result<Value> {
    let cache = self.service.entity(path, &options.to_query_options())?;
    info!(%cache, "reading entity");

    Ok(cache.read().await?)
  }
}
