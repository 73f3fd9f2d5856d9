use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    services::{
        providers::{GitHubClient, GoogleIdTokenVerifier},
        PgStore,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on missing or invalid configuration
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;

    let github = GitHubClient::new(&config.github)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("GitHub client: {}", e)))?;
    let google = GoogleIdTokenVerifier::new(&config.google)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Google verifier: {}", e)))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    let cleanup_interval = Duration::from_secs(config.sessions.cleanup_interval_seconds);

    let state = AppState::new(
        config,
        Arc::new(PgStore::new(pool)),
        Arc::new(github),
        Arc::new(google),
    )?;

    let cleanup = state.sessions.spawn_periodic_cleanup(cleanup_interval);
    tracing::info!(interval_seconds = cleanup_interval.as_secs(), "Session cleanup scheduled");

    let app = build_router(state);

    tracing::info!(address = %addr, "Listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    service_core::axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
