use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::query::QueryOptions;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub service: ServiceConfig,
  /// Query options applied to every cache (e.g. `sap-client`)
  #[serde(default)]
  pub query_options: QueryOptions,
  /// Range length used when no explicit range is given
  #[serde(default = "default_page_size")]
  pub page_size: usize,
  #[serde(default)]
  pub log: LogConfig,
}

fn default_page_size() -> usize {
  20
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
  /// Root URL of the OData service; resource paths are resolved against it
  pub url: String,
  /// Extra headers sent with every request
  #[serde(default)]
  pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
  /// Default filter directive when RUST_LOG is not set (e.g. "odc=debug")
  pub level: Option<String>,
  /// Write logs to this file instead of stderr
  pub file: Option<PathBuf>,
}

impl Config {
  /// Configuration for a service given on the command line only.
  pub fn for_service(url: impl Into<String>) -> Self {
    Self {
      service: ServiceConfig {
        url: url.into(),
        headers: BTreeMap::new(),
      },
      query_options: QueryOptions::new(),
      page_size: default_page_size(),
      log: LogConfig::default(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./odc.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/odc/config.yaml
  ///
  /// Returns `Ok(None)` if no explicit path was given and no file was found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Option<Self>> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    path.map(|p| Self::load_from_path(&p)).transpose()
  }

  /// Look for `odc.yaml` in the working directory first, then for
  /// `odc/config.yaml` under the platform config directory.
  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("odc.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("odc").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }
}
