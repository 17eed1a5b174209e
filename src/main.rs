//! Taskchain server: durable job execution with chained follow-up jobs.
//!
//! Loads configuration, starts the engine with the demo workers and runs
//! until Ctrl+C or SIGTERM, then drains in-flight jobs and exits.

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt};

use taskchain_core::config::AppConfig;
use taskchain_core::error::AppError;
use taskchain_worker::Engine;
use taskchain_worker::jobs::{register_demo_workers, seed_demo_batch};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "taskchain-server", version, about = "Run the taskchain job engine")]
struct Args {
    /// Configuration file, layered over config/default.toml
    #[arg(short, long)]
    config: Option<String>,

    /// Enqueue the demo job batch after startup
    #[arg(long)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match AppConfig::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config, args.seed_demo).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Start the engine, wait for a shutdown signal, then stop it.
async fn run(config: AppConfig, seed_demo: bool) -> Result<(), AppError> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        queue = %config.queue.url,
        max_concurrent_workers = config.worker.max_concurrent_workers,
        per_job_timeout_secs = config.worker.per_job_timeout_seconds,
        max_attempts = config.worker.max_attempts,
        "Starting taskchain"
    );

    let mut engine = Engine::new(config, tracing::info_span!("engine"));
    register_demo_workers(&mut engine)?;

    let running = engine.start().await?;

    for kind in running.pool().registry().kinds() {
        tracing::info!(kind, args = r#"{"number": N}"#, "Accepting jobs");
    }

    if seed_demo {
        let jobs = seed_demo_batch(running.queue()).await?;
        tracing::info!(count = jobs.len(), "Demo batch enqueued");
    }

    tracing::info!("Taskchain running, press Ctrl+C to stop");
    shutdown_signal().await;
    tracing::info!("Shutdown signal received, stopping...");

    let report = running.shutdown().await?;
    tracing::info!(
        finished = report.finished,
        abandoned = report.abandoned,
        "Taskchain shut down"
    );
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
