mod cache;
mod config;
mod host;
mod net;
mod worker;

#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use cache::{CacheStorage, Destination, Request, SqliteStorage};
use host::ConsoleHost;
use net::HttpNetwork;
use worker::{Engine, EngineConfig, FetchOutcome};

#[derive(Parser, Debug)]
#[command(name = "swcache")]
#[command(about = "Offline caching and push notification engine for a web client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swcache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Origin of the web client, overrides the config file
  #[arg(short, long)]
  origin: Option<String>,

  /// Keep the cache in memory for this run only
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Install the current version, then activate it
  Install,

  /// Route one request through the engine
  Fetch {
    /// Absolute URL, or a path on the origin
    target: String,

    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    #[arg(short, long, value_enum, default_value_t = Destination::Other)]
    destination: Destination,

    /// Treat the request as a top-level navigation
    #[arg(short, long)]
    navigate: bool,

    /// Write the body here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
  },

  /// List partitions and their entry counts
  Partitions,

  /// Decode a push payload and show the notification
  Push {
    /// Payload file (reads stdin if omitted)
    file: Option<PathBuf>,
  },

  /// Simulate a click on a notification built from a push payload
  Click {
    /// Payload file (reads stdin if omitted)
    file: Option<PathBuf>,

    /// Named action button that was clicked
    #[arg(short, long)]
    action: Option<String>,

    /// URL of an already open window (repeatable)
    #[arg(short, long = "window")]
    windows: Vec<String>,
  },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    config::Config { origin, ..config }
  } else {
    config
  };

  let _guard = init_tracing(config.log_file.as_deref())?;

  let storage = if args.ephemeral {
    SqliteStorage::open_in_memory()?
  } else {
    SqliteStorage::open(config.database.as_deref())?
  };

  let engine_config = EngineConfig::from_config(&config)?;
  let origin = engine_config.origin.clone();
  let network = Arc::new(HttpNetwork::new(origin.clone())?);
  let windows = match &args.command {
    Command::Click { windows, .. } => windows.clone(),
    _ => Vec::new(),
  };
  let host = Arc::new(ConsoleHost::new(&windows));
  let engine = Engine::new(engine_config, storage, network, host.clone(), host);

  match args.command {
    Command::Install => {
      let install = engine.on_install().await;
      println!(
        "installed: {} partitions opened, {} assets cached",
        install.opened.len(),
        install.precached
      );
      if !install.succeeded() {
        println!("pre-cache failed: {}", install.error.unwrap_or_default());
      }
      let activate = engine.on_activate().await;
      println!(
        "activated: claimed={}, deleted={:?}, state={:?}",
        activate.claimed,
        activate.deleted,
        engine.state()
      );
    }
    Command::Fetch {
      target,
      method,
      destination,
      navigate,
      output,
    } => {
      let url = origin
        .join(&target)
        .map_err(|e| eyre!("Invalid target '{}': {}", target, e))?;
      let request = if navigate {
        Request::navigation(url)
      } else {
        Request::get(url).with_destination(destination)
      };
      let request = request.with_method(&method);
      fetch(&engine, &request, output.as_deref()).await?;
    }
    Command::Partitions => {
      let storage = engine.storage();
      for name in storage.partition_names()? {
        let marker = if engine.partitions().is_current(&name) {
          "current"
        } else {
          "stale"
        };
        println!("{}\t{}\t{}", name, storage.entry_count(&name)?, marker);
      }
    }
    Command::Push { file } => {
      let payload = read_payload(file.as_deref())?;
      engine.on_push(non_empty(&payload)).await;
    }
    Command::Click {
      file,
      action,
      windows: _,
    } => {
      let payload = read_payload(file.as_deref())?;
      let intent = worker::NotificationIntent::from_push(
        non_empty(&payload),
        &config.notification,
      );
      let outcome = engine
        .on_notification_click(&intent, action.as_deref())
        .await;
      println!("{:?}", outcome);
    }
  }

  Ok(())
}

async fn fetch<S: CacheStorage>(
  engine: &Engine<S>,
  request: &Request,
  output: Option<&Path>,
) -> Result<()> {
  let served = match engine.on_fetch(request).await {
    FetchOutcome::Respond(served) => served,
    FetchOutcome::Bypass => {
      return Err(eyre!(
        "{} is cross-origin and is not intercepted",
        request.url
      ))
    }
  };

  let response = &served.response;
  eprintln!("HTTP {} ({})", response.status, served.source.as_str());
  if let Some(cached_at) = served.cached_at {
    eprintln!("cached-at: {}", cached_at.to_rfc3339());
  }
  for (name, value) in &response.headers {
    eprintln!("{}: {}", name, value);
  }

  match output {
    Some(path) => std::fs::write(path, &response.body)
      .map_err(|e| eyre!("Failed to write {}: {}", path.display(), e))?,
    None => std::io::stdout().write_all(&response.body)?,
  }
  Ok(())
}

fn read_payload(file: Option<&Path>) -> Result<Vec<u8>> {
  match file {
    Some(path) => {
      std::fs::read(path).map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))
    }
    None => {
      let mut buf = Vec::new();
      std::io::stdin().read_to_end(&mut buf)?;
      Ok(buf)
    }
  }
}

/// An empty push body is a push without payload.
fn non_empty(payload: &[u8]) -> Option<&[u8]> {
  if payload.iter().all(u8::is_ascii_whitespace) {
    None
  } else {
    Some(payload)
  }
}

/// Log to stderr, or to a file when one is configured.
fn init_tracing(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter =
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("swcache=info"));

  let Some(path) = log_file else {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  };

  let file_name = path
    .file_name()
    .ok_or_else(|| eyre!("Invalid log file path: {}", path.display()))?;
  let dir = path
    .parent()
    .filter(|p| !p.as_os_str().is_empty())
    .unwrap_or_else(|| Path::new("."));
  std::fs::create_dir_all(dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;

  let appender = tracing_appender::rolling::never(dir, file_name);
  let (writer, guard) = tracing_appender::non_blocking(appender);
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(Some(guard))
}
