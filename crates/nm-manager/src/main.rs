//! Node manager daemon
//!
//! Initializes the subsystems, watches the given launch files and tears
//! everything down in order on exit.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nm_core::config::{self, ManagerConfig};
use nm_core::process;
use nm_manager::subsystem::FileEvent;
use nm_manager::Registry;

/// Name shown in process listings and the terminal title
const PROG_NAME: &str = "node_manager";

/// Owner tag for launch files given on the command line
const CLI_OWNER: &str = "command line";

/// Lower bound for the launch file poll period
const MIN_WATCH_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "node-manager")]
#[command(about = "Launch and supervise nodes on local and remote hosts")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Launch file to load on start (repeatable)
    #[arg(short, long)]
    file: Vec<PathBuf>,

    /// Master URI (overrides ROS_MASTER_URI)
    #[arg(long, env = "ROS_MASTER_URI")]
    master_uri: Option<String>,

    /// Run in foreground with verbose output
    #[arg(long)]
    foreground: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.foreground { "debug" } else { &args.log_level };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Node manager starting...");

    // Nothing can be persisted without the config directory
    let cfg_dir = config::init_cfg_path().context("Failed to initialize config directory")?;
    let config = load_config(args.config.as_deref())?;
    let master_uri = args
        .master_uri
        .clone()
        .filter(|uri| !uri.trim().is_empty())
        .unwrap_or_else(config::masteruri_from_env);

    process::set_terminal_name(PROG_NAME);
    if let Err(e) = process::set_process_name(PROG_NAME) {
        tracing::debug!("Cannot set process name: {}", e);
    }

    let registry = Arc::new(Registry::new(config, cfg_dir));

    // Setup signal handlers
    let signal_registry = Arc::clone(&registry);
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::warn!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                tracing::info!("Received Ctrl+C, initiating shutdown...");
            }
            _ = terminate => {
                tracing::info!("Received SIGTERM, initiating shutdown...");
            }
        }

        signal_registry.shutdown().await;
    });

    let result = run(&registry, &master_uri, &args.file).await;
    if let Err(e) = &result {
        tracing::error!("Node manager failed: {:#}", e);
    }

    // No-op if a signal already shut us down
    registry.shutdown().await;
    result
}

/// Load the configuration file, falling back to defaults
fn load_config(path: Option<&Path>) -> Result<ManagerConfig> {
    if let Some(path) = path {
        return config::load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let default_path = config::default_config_path()?;
    if default_path.exists() {
        Ok(config::load_config(&default_path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config from {:?}: {}", default_path, e);
            ManagerConfig::default()
        }))
    } else {
        tracing::info!("Using default configuration");
        Ok(ManagerConfig::default())
    }
}

/// Initialize the subsystems and run the event loop until shutdown
async fn run(registry: &Registry, master_uri: &str, launch_files: &[PathBuf]) -> Result<()> {
    let local_master = registry
        .init_globals(master_uri)
        .await
        .context("Failed to initialize subsystems")?;
    if local_master {
        tracing::info!("Master {} runs on this host", master_uri);
    } else {
        tracing::info!("Master {} is remote or still resolving", master_uri);
    }

    let subsystems = registry.subsystems()?;
    for file in launch_files {
        match subsystems.file_watcher.add(file, CLI_OWNER) {
            Ok(()) => tracing::info!("Watching launch file {:?}", file),
            Err(e) => tracing::warn!("{}", e),
        }
    }

    let token = registry.event_loop_token();
    let period = registry.config().watch_interval.max(MIN_WATCH_INTERVAL);
    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let events = subsystems
                    .file_watcher
                    .check()
                    .into_iter()
                    .chain(subsystems.file_watcher_param.check());
                for event in events {
                    report(&event);
                }
            }
            _ = token.cancelled() => {
                tracing::info!("Event loop stopped");
                break;
            }
        }
    }
    Ok(())
}

fn report(event: &FileEvent) {
    match event {
        FileEvent::Modified { path, owners } => {
            tracing::info!("{:?} changed (used by {})", path, owners.join(", "));
        }
        FileEvent::Removed { path, owners } => {
            tracing::warn!("{:?} was removed (used by {})", path, owners.join(", "));
        }
    }
}
