//! Mediate server entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use mediate_api::{AppState, Collaborators, app};
use mediate_common::{Config, LocalBlobStore, SystemClock};
use mediate_core::{JwtVerifier, TokioSleeper, build_transport};
use mediate_db::{MemoryStore, Stores};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mediate=debug,tower_http=debug".into()),
        )
        .init();

    info!("Starting mediate server...");

    // Load configuration
    let config = Config::load()?;

    let stores = if config.database.in_memory {
        warn!("Using in-memory storage; all data is lost on shutdown");
        Stores::in_memory(MemoryStore::default())
    } else {
        let db = mediate_db::init(&config).await?;
        info!("Connected to database");

        info!("Running database migrations...");
        mediate_db::migrate(&db).await?;
        info!("Migrations completed");

        Stores::postgres(Arc::new(db))
    };

    let transport = build_transport(&config.email)?;
    info!(provider = transport.name(), "Email transport ready");

    tokio::fs::create_dir_all(&config.storage.base_path).await?;
    let blobs = LocalBlobStore::new(
        config.storage.base_path.clone(),
        config.storage.base_url.clone(),
        &config.storage.signing_secret,
    );

    let state = AppState::new(
        &config,
        Collaborators {
            stores,
            transport,
            sleeper: Arc::new(TokioSleeper),
            blobs: Arc::new(blobs),
            clock: Arc::new(SystemClock),
            verifier: Arc::new(JwtVerifier::from_config(&config.auth)?),
        },
    );

    let router = app(state);

    // Start server with graceful shutdown
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}
