//! todolist server - Main entry point.
//!
//! This binary starts the task API together with the reminder loop:
//! - Structured JSON logging for production
//! - Reminder bootstrap from the task repository
//! - Graceful shutdown handling (SIGTERM/SIGINT) that also stops the
//!   reminder loop
//!
//! # Configuration
//!
//! See [`todolist_server::config`] for environment variable configuration.
//!
//! # Example
//!
//! ```bash
//! TODOLIST_GITHUB_OWNER=octo \
//! TODOLIST_GITHUB_REPO=tasks \
//! TODOLIST_GITHUB_TOKEN=ghp_xxx \
//! TODOLIST_API_TOKEN=secret \
//! cargo run --release --bin todolist-server
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use todolist_reminders::{
    bootstrap, ready, DesktopNotifier, EngineConfig, LogNotifier, NotifierInit, ReminderEngine,
    ReminderService, ShutdownOutcome,
};
use todolist_server::config::{Config, NotifierKind};
use todolist_server::github::GitHubClient;
use todolist_server::routes::{create_router, AppState};
use todolist_server::store::TaskStore;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize structured logging
    init_logging();

    match run().await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Server failed");
            eprintln!("Error: {err:#}");
            ExitCode::from(1)
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Error: {err}");
            eprintln!();
            eprintln!("Required environment variables:");
            eprintln!("  TODOLIST_GITHUB_OWNER    - Owner of the task repository");
            eprintln!("  TODOLIST_GITHUB_REPO     - Name of the task repository");
            eprintln!("  TODOLIST_GITHUB_TOKEN    - GitHub token (or GITHUB_TOKEN)");
            eprintln!();
            eprintln!("Optional environment variables:");
            eprintln!("  PORT                     - HTTP server port (default: 8080)");
            eprintln!("  TODOLIST_API_TOKEN       - Bearer token for the HTTP API");
            eprintln!("  TODOLIST_NOTIFIER        - desktop or log (default: desktop)");
            eprintln!("  RUST_LOG                 - Log level filter (default: info)");
            return Err(err.into());
        }
    };

    info!(
        port = config.port,
        repository = %format!("{}/{}", config.github.owner, config.github.repo),
        branch = %config.github.branch,
        auth_mode = if config.api_token.is_some() { "bearer" } else { "disabled" },
        notifier = ?config.notifier,
        "todolist server starting"
    );

    let client = GitHubClient::new(&config.github)?;
    let store = TaskStore::new(client);
    let engine = Arc::new(ReminderEngine::new(EngineConfig {
        poll_interval: config.reminder_poll_interval,
    }));

    let mut service = ReminderService::start(Arc::clone(&engine), notifier_init(&config));

    // Bootstrap in the background so a slow repository does not delay binding.
    let bootstrap_handle = {
        let engine = Arc::clone(&engine);
        let store = store.clone();
        tokio::spawn(async move {
            if let Err(err) = bootstrap(&engine, &store).await {
                warn!(error = %err, "Reminder bootstrap failed; continuing with an empty queue");
            }
        })
    };

    let shutdown_timeout = config.shutdown_timeout;
    let bind_addr = format!("0.0.0.0:{}", config.port);
    let app = create_router(AppState::new(config, store, engine));

    let listener = TcpListener::bind(&bind_addr).await.map_err(|err| {
        error!(error = %err, address = %bind_addr, "Failed to bind to address");
        err
    })?;
    info!(address = %bind_addr, "Server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    info!("Server shutting down gracefully");
    bootstrap_handle.abort();

    match service.shutdown(shutdown_timeout).await {
        ShutdownOutcome::Stopped => info!("Reminder loop stopped"),
        outcome => warn!(?outcome, "Reminder loop did not stop cleanly"),
    }

    served?;
    Ok(())
}

fn notifier_init(config: &Config) -> NotifierInit {
    match config.notifier {
        NotifierKind::Desktop => DesktopNotifier::lazy(Some(config.sound_path.clone())),
        NotifierKind::Log => ready(Arc::new(LogNotifier)),
    }
}

/// Initialize structured logging with tracing.
///
/// JSON output filtered by `RUST_LOG`, defaulting to `info` with request
/// traces from `tower_http`.
fn init_logging() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tower_http=debug,axum::rejection=trace"));

    let json_layer = fmt::layer()
        .json()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .init();
}

/// Resolves when SIGTERM or SIGINT is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
