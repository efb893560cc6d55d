use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use netwatch_monitor::{ReqwestTransport, TokioClock};

mod config;
mod engine;

use config::{LogFormat, WorkerConfig};
use engine::{Engine, Repositories};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid configuration")?;

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(
        monitor_interval_secs = config.monitor_interval.as_secs(),
        app_env = %config.probe.app_env,
        push_transport = ?config.notifications.transport,
        "Loaded worker configuration",
    );

    // --- Storage ---
    let repos = match &config.database_url {
        Some(url) => {
            let pool = netwatch_db::create_pool(url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connection pool created");

            netwatch_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            tracing::info!("Database health check passed");
            Repositories::postgres(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            Repositories::memory()
        }
    };

    // --- Transports ---
    let probe_transport = ReqwestTransport::new(config.probe.timeout)
        .context("Failed to build probe HTTP client")?;
    let push_transport = config
        .notifications
        .build_transport()
        .context("Failed to build push transport")?;

    // --- Engine ---
    let engine = Engine::build(
        repos,
        Arc::new(probe_transport),
        push_transport,
        Arc::new(TokioClock),
        &config,
    );
    engine.start().await.context("Failed to resume monitoring")?;
    tracing::info!("Worker started");

    shutdown_signal().await;

    // --- Post-shutdown cleanup ---
    if tokio::time::timeout(SHUTDOWN_TIMEOUT, engine.shutdown())
        .await
        .is_err()
    {
        tracing::warn!("Timed out waiting for monitors to stop");
    }
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "netwatch_worker=info,netwatch_monitor=info,netwatch_alerting=info,\
         netwatch_notifications=info,netwatch_events=info"
            .into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
///
/// A signal handler that cannot be installed is logged and treated as a
/// signal that never arrives.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
