use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use outpost::bridge::UiBridge;
use outpost::cache::{BucketStore, CacheGeneration, RouteTable};
use outpost::config::Config;
use outpost::db::Database;
use outpost::lifecycle::LifecycleManager;
use outpost::net::ReqwestClient;
use outpost::outbox::{OutboxStore, SyncCoordinator};

#[derive(Parser, Debug)]
#[command(name = "outpost")]
#[command(about = "Offline resilience worker: shell precache, cache rollover and outbox replay")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/outpost/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Database path override
  #[arg(long)]
  database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_tracing()?;

  let mut config = Config::load(args.config.as_deref())?;
  if args.database.is_some() {
    config.database = args.database;
  }

  // A store that cannot open degrades the layer instead of aborting it:
  // reads become passthrough, queued delivery reports sync unavailable.
  let db = match &config.database {
    Some(path) => Database::open_at(path),
    None => Database::open(),
  };
  let db = match db {
    Ok(db) => Some(db),
    Err(e) => {
      warn!("Persistent store unavailable, running degraded: {}", e);
      None
    }
  };

  let network = Arc::new(ReqwestClient::new()?);
  let routes = Arc::new(RouteTable::new(config.origin_url()?, &config.routes));
  let generation = CacheGeneration::new(config.generation.clone());

  let outbox = db.clone().map(OutboxStore::new);
  let bridge = Arc::new(UiBridge::new(true, outbox.clone(), &config.sync.tag));

  if let Some(db) = &db {
    let store = BucketStore::new(db.clone());
    let mut lifecycle = LifecycleManager::new(
      generation.clone(),
      store,
      Arc::clone(&network),
      Arc::clone(&routes),
    );
    lifecycle.install().await?;
    lifecycle.skip_waiting();
    lifecycle.activate().await?;
  }

  if let Some(outbox) = outbox {
    let coordinator = Arc::new(SyncCoordinator::new(
      outbox,
      Arc::clone(&network),
      Arc::clone(&bridge),
      config.sync.to_sync_config(),
    ));
    tokio::spawn(coordinator.run());
  }

  // Surface bridge events in the log until shutdown
  let mut events = bridge.subscribe();
  tokio::spawn(async move {
    while let Ok(event) = events.recv().await {
      info!("UI event: {:?}", event);
    }
  });

  info!("Worker running for {} (generation {})", config.origin, generation);
  tokio::signal::ctrl_c()
    .await
    .map_err(|e| eyre!("Failed to listen for shutdown signal: {}", e))?;
  info!("Shutting down");

  Ok(())
}

fn init_tracing() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("outpost")
    .join("logs");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::daily(log_dir, "outpost.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}
