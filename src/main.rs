mod app;

use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use odc::config::{Config, LogConfig, ServiceConfig};

#[derive(Parser, Debug)]
#[command(name = "odc")]
#[command(about = "Read OData v4 collections and entities through a coalescing cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/odc/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// OData service root URL
  #[arg(short, long)]
  service: Option<String>,

  /// Increase log verbosity (-v info, -vv debug, -vvv trace)
  #[arg(short, long, action = clap::ArgAction::Count)]
  verbose: u8,

  #[command(subcommand)]
  command: app::Command,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration, the command line service overrides the file
  let config = match (Config::load(args.config.as_deref())?, args.service) {
    (Some(config), Some(url)) => Config {
      service: ServiceConfig {
        url,
        ..config.service
      },
      ..config
    },
    (Some(config), None) => config,
    (None, Some(url)) => Config::for_service(url),
    (None, None) => {
      return Err(eyre!(
        "No configuration file found. Create one at ~/.config/odc/config.yaml\n\
                 or pass the service URL with --service."
      ))
    }
  };

  let _guard = init_tracing(&config.log, args.verbose)?;

  let app = app::App::new(&config)?;
  app.run(args.command).await?;

  Ok(())
}

/// Install the tracing subscriber.
///
/// The returned guard flushes the log file and must live until exit.
fn init_tracing(log: &LogConfig, verbose: u8) -> Result<Option<WorkerGuard>> {
  let filter = match verbose {
    0 => EnvFilter::try_from_default_env()
      .unwrap_or_else(|_| EnvFilter::new(log.level.as_deref().unwrap_or("warn"))),
    1 => EnvFilter::new("info"),
    2 => EnvFilter::new("debug"),
    _ => EnvFilter::new("trace"),
  };

  match &log.file {
    Some(path) => {
      let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
      let name = path
        .file_name()
        .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;

      let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}
