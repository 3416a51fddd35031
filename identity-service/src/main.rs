use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    services::{
        metrics::init_metrics, DispatcherSettings, EmailSender, JwtService, OutboxDispatcher,
        SmtpEmailSender, TokenHasher,
    },
    AppState,
};
use service_core::error::AppError;
use service_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Fail fast on missing or invalid configuration
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics().map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::Error::new(e)))?;
    tracing::info!("Database ready");

    let hasher = Arc::new(TokenHasher::new(&config.tokens.hash_secret)?);
    let jwt = Arc::new(JwtService::new(&config.jwt).map_err(AppError::ConfigError)?);

    let email: Arc<dyn EmailSender> = Arc::new(
        SmtpEmailSender::new(config.smtp.clone())
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?,
    );

    let dispatcher = if config.outbox.enabled {
        let dispatcher = Arc::new(OutboxDispatcher::new(
            pool.clone(),
            email,
            DispatcherSettings::from(&config.outbox),
            config.app.public_url.clone(),
        ));
        let handle = tokio::spawn(dispatcher.clone().run());
        Some((dispatcher, handle))
    } else {
        tracing::warn!("Outbox dispatcher disabled; queued emails will not be sent by this replica");
        None
    };

    let state = AppState::new(config.clone(), pool.clone(), hasher, jwt);
    let app = build_router(state);

    let addr: SocketAddr = config
        .common
        .bind_address()
        .parse()
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!("Invalid bind address: {}", e)))?;
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some((dispatcher, handle)) = dispatcher {
        dispatcher.shutdown();
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Outbox dispatcher task panicked");
        }
    }
    pool.close().await;

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
        _ = ctrl_c => tracing::info!("Received SIGINT, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
