//! editable-config server.
//!
//! Serves an application whose declared options can be overridden at
//! runtime through the admin API.
//!
//! # Architecture Overview
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────────┐
//!                 │                   EDITABLE CONFIG                     │
//!                 │                                                       │
//!   App request   │  ┌──────────┐   ┌────────────┐   ┌───────────────┐   │
//!   ──────────────┼─▶│   http   │──▶│ reconcile  │──▶│  live config  │   │
//!                 │  │  server  │   │ (throttled)│   │  (dashmap)    │   │
//!                 │  └──────────┘   └─────┬──────┘   └───────▲───────┘   │
//!                 │                       │ updated_since    │ restore   │
//!                 │                       ▼                  │           │
//!   Admin request │  ┌──────────┐   ┌────────────┐   ┌───────┴───────┐   │
//!   ──────────────┼─▶│  admin   │──▶│   store    │   │ static source │   │
//!                 │  │ actions  │   │  (sqlite)  │   │ ([options])   │   │
//!                 │  └──────────┘   └────────────┘   └───────────────┘   │
//!                 │                                                       │
//!                 │   registry (declarations + policy), observability,    │
//!                 │   lifecycle (startup, signals, shutdown)              │
//!                 └──────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use editable_config::config::{load_config, watcher::ConfigWatcher};
use editable_config::http::HttpServer;
use editable_config::lifecycle::{initialize, signals, Shutdown};
use editable_config::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "editable-config", version, about = "Runtime-editable configuration server")]
struct Args {
    /// Settings file
    #[arg(short, long, default_value = "settings.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let settings = load_config(&args.config)?;

    logging::init(&settings.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "editable-config starting");
    tracing::info!(
        config = ?args.config,
        bind_address = %settings.server.bind_address,
        declarations = ?settings.registry.path,
        "Configuration loaded"
    );

    if settings.observability.metrics_enabled {
        match settings.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %settings.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let services = initialize(&settings)?;

    let (watcher, option_updates) = ConfigWatcher::new(&args.config);
    let _watcher = match watcher.run() {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(error = %e, "Settings watcher unavailable, static options will not reload");
            None
        }
    };

    let listener = TcpListener::bind(&settings.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server = HttpServer::new(&settings, services);
    let server_shutdown = shutdown.subscribe();
    let server_task = tokio::spawn(server.run(listener, option_updates, server_shutdown));

    signals::wait_for_signal(&shutdown).await;
    server_task.await??;

    tracing::info!("Shutdown complete");
    Ok(())
}
