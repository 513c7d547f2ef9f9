//! Iris Server - species prediction service with live retraining

use anyhow::{Context, Result};
use iris_server::{build_state, create_router, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest shutdown waits for queued audit records
const AUDIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting iris-server");

    let config = ServerConfig::load()?;
    info!(
        service_name = %config.service_name,
        model_dir = %config.model_dir,
        database_url = %config.database_url,
        "Server configured"
    );

    let state = build_state(&config).await?;
    let artifact = state.store.current();
    state
        .logger
        .log_startup(SERVER_VERSION, artifact.version, &artifact.model_type);

    let service = Arc::clone(&state.service);
    let logger = state.logger.clone();
    let app = create_router(Arc::new(state));

    let addr = config.listen_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!(addr = %addr, "Starting API server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server failed")?;

    logger.log_shutdown("signal received");
    match tokio::time::timeout(AUDIT_FLUSH_TIMEOUT, service.audit().flush()).await {
        Ok(Ok(())) => info!(delivery = ?service.audit().delivery(), "Audit queue flushed"),
        Ok(Err(e)) => warn!(error = %e, "Audit flush failed"),
        Err(_) => warn!("Audit flush timed out"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for SIGINT");
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
                warn!(error = %e, "Failed to listen for SIGTERM");
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
