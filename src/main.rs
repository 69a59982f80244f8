//! LabTrack storage server.
//!
//! Wires configuration, logging, the database, and the storage backends
//! together, registers the configured drives, and keeps the storage layer
//! up until a shutdown signal arrives.

use std::sync::Arc;

use tracing_subscriber::{EnvFilter, fmt};

use labtrack_core::AppError;
use labtrack_core::config::AppConfig;
use labtrack_database::{
    DatabasePool, PgEntityFolderLinkRepository, PgStorageDriveFolderRepository,
    PgStorageDriveRepository,
};
use labtrack_service::{DriveService, FolderBindingService, StorageInitializer};
use labtrack_storage::StorageDispatcher;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "Server error");
        std::process::exit(1);
    }
}

/// Load configuration from file, environment overlay, and environment
fn load_configuration() -> Result<AppConfig, AppError> {
    let config_path =
        std::env::var("LABTRACK_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());
    let env = std::env::var("LABTRACK_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&config_path, &env)
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

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting LabTrack storage v{}", env!("CARGO_PKG_VERSION"));

    let pool = DatabasePool::connect(&config.database).await?;
    if !pool.health_check().await? {
        return Err(AppError::database("Database did not answer the health check"));
    }

    let dispatcher = Arc::new(StorageDispatcher::from_config(&config.storage)?);
    tracing::info!(
        backends = ?dispatcher.registered_kinds(),
        "Storage backends registered"
    );

    let drive_repo = Arc::new(PgStorageDriveRepository::new(pool.pool().clone()));
    let folder_repo = Arc::new(PgStorageDriveFolderRepository::new(pool.pool().clone()));
    let link_repo = Arc::new(PgEntityFolderLinkRepository::new(pool.pool().clone()));

    let drives = DriveService::new(drive_repo.clone(), dispatcher.clone());
    let bindings = FolderBindingService::new(drive_repo, folder_repo, link_repo, dispatcher);
    let initializer = StorageInitializer::new(drives.clone(), bindings.clone());

    initializer.initialize(&config.storage).await?;

    for health in drives.health_all().await? {
        if health.healthy {
            tracing::info!(drive = %health.display_name, kind = %health.drive_type, "Drive reachable");
        } else {
            tracing::warn!(drive = %health.display_name, kind = %health.drive_type, "Drive unreachable");
        }
    }

    tracing::info!("LabTrack storage ready");
    shutdown_signal().await;
    tracing::info!("Shutdown signal received");

    pool.close().await;
    tracing::info!("LabTrack storage shut down");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl+C");
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
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
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
