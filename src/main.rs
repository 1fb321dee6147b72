#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! # cc-executor
//!
//! Reliability layer for long-running AI CLI subprocesses.
//!
//! cc-executor exposes a JSON-RPC 2.0 WebSocket API that lets remote clients
//! run commands in supervised process groups, stream their output with
//! back-pressure, and control them live (pause/resume/cancel) — with hard
//! guarantees that no subprocess outlives its connection.
//!
//! ## Subcommands
//!
//! - `cc-executor serve` (default) — run the WebSocket server
//! - `cc-executor supervise` — run as supervisor: starts server and restarts
//!   on crash

mod supervisor;

use std::time::Duration;

use axum::{routing::get, Router};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use cc_executor::{config::Config, routes, state::AppState, ws};

/// Reliability layer for long-running AI CLI subprocesses.
#[derive(Parser)]
#[command(name = "cc-executor", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the WebSocket server (default when no subcommand given).
    Serve {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
    /// Run as supervisor: starts server and restarts on crash.
    Supervise {
        /// Path to TOML config file.
        #[arg(long)]
        config: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Supervise { config }) => {
            run_supervisor_mode(config.as_deref()).await;
        }
        Some(Commands::Serve { config }) => {
            run_server(config.as_deref()).await;
        }
        None => {
            // Backward compat: no subcommand but --config may be passed
            let args: Vec<String> = std::env::args().collect();
            let config_path = args
                .windows(2)
                .find(|w| w[0] == "--config")
                .map(|w| w[1].clone());
            run_server(config_path.as_deref()).await;
        }
    }
}

async fn run_supervisor_mode(config_path: Option<&str>) -> ! {
    let config = Config::load(config_path);

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    info!("cc-executor supervisor starting");
    supervisor::run_supervisor(config_path, &config.supervisor).await
}

async fn run_server(config_path: Option<&str>) {
    let config = Config::load(config_path);

    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.level.clone());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    // Validate config before proceeding
    let validation_errors = config.validate();
    if !validation_errors.is_empty() {
        for err in &validation_errors {
            tracing::error!("Config error: {err}");
        }
        std::process::exit(1);
    }

    info!("cc-executor v{} starting", env!("CARGO_PKG_VERSION"));
    info!("Listening on {}", config.server.listen);
    info!(
        "Limits: {} sessions, {} byte / {} line buffers, {}s grace",
        config.server.max_sessions,
        config.limits.max_buffer_bytes,
        config.limits.max_buffer_lines,
        config.limits.grace_period_secs
    );

    let grace_secs = config.limits.grace_period_secs;
    let state = AppState::new(config);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/health", get(routes::health::health))
        .route("/api/ws", get(ws::ws_upgrade))
        .with_state(state.clone())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(tower::limit::ConcurrencyLimitLayer::new(
            state.config.server.max_connections,
        ));

    let listener = TcpListener::bind(&state.config.server.listen)
        .await
        .expect("Failed to bind");

    info!("Server ready");

    // Graceful shutdown
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to register SIGTERM");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            info!("Received SIGINT");
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .expect("Server error");

    // Cleanup: every live session terminates its execution and reaps its
    // process group before the registry drains.
    info!("Shutting down...");
    state
        .registry
        .shutdown_all(Duration::from_secs(grace_secs + 20))
        .await;
    info!("Goodbye");
}
