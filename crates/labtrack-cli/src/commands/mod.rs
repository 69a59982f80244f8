//! CLI command definitions and dispatch.

pub mod drive;
pub mod file;
pub mod folder;
pub mod init;
pub mod migrate;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::output::OutputFormat;
use labtrack_core::config::AppConfig;
use labtrack_core::{AppError, AppResult};
use labtrack_database::{
    DatabasePool, PgEntityFolderLinkRepository, PgStorageDriveFolderRepository,
    PgStorageDriveRepository,
};
use labtrack_service::{DriveService, FolderBindingService, StorageInitializer};
use labtrack_storage::StorageDispatcher;

/// LabTrack storage administration
#[derive(Debug, Parser)]
#[command(name = "labtrack", version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Environment overlay (`config/{env}.toml`)
    #[arg(short, long, default_value = "development")]
    pub env: String,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Database migration management
    Migrate(migrate::MigrateArgs),
    /// Register configured drives and their root folders
    Init,
    /// Storage drive management
    Drive(drive::DriveArgs),
    /// Folder binding management
    Folder(folder::FolderArgs),
    /// File upload and download
    File(file::FileArgs),
}

impl Cli {
    /// Execute the CLI command
    pub async fn execute(&self) -> AppResult<()> {
        let config = AppConfig::load(&self.config, &self.env)?;
        match &self.command {
            Commands::Migrate(args) => migrate::execute(args, &config).await,
            Commands::Init => init::execute(&config, self.format).await,
            Commands::Drive(args) => drive::execute(args, &config, self.format).await,
            Commands::Folder(args) => folder::execute(args, &config, self.format).await,
            Commands::File(args) => file::execute(args, &config, self.format).await,
        }
    }
}

/// Services wired to the configured database and backends.
pub struct Services {
    pub pool: DatabasePool,
    pub drives: DriveService,
    pub bindings: FolderBindingService,
    pub initializer: StorageInitializer,
}

impl Services {
    /// Connect to the database and build the dispatcher from `[storage]`.
    pub async fn connect(config: &AppConfig) -> AppResult<Self> {
        let pool = DatabasePool::connect(&config.database).await?;
        let dispatcher = Arc::new(StorageDispatcher::from_config(&config.storage)?);

        let drive_repo = Arc::new(PgStorageDriveRepository::new(pool.pool().clone()));
        let folder_repo = Arc::new(PgStorageDriveFolderRepository::new(pool.pool().clone()));
        let link_repo = Arc::new(PgEntityFolderLinkRepository::new(pool.pool().clone()));

        let drives = DriveService::new(drive_repo.clone(), dispatcher.clone());
        let bindings = FolderBindingService::new(drive_repo, folder_repo, link_repo, dispatcher);
        let initializer = StorageInitializer::new(drives.clone(), bindings.clone());

        Ok(Self {
            pool,
            drives,
            bindings,
            initializer,
        })
    }
}

/// Parse a UUID argument
pub fn parse_id(raw: &str, what: &str) -> AppResult<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AppError::validation(format!("Invalid {what} ID '{raw}': {e}")))
}

/// Ask before an irreversible-looking change unless `force` is set
pub fn confirm(prompt: &str, force: bool) -> AppResult<bool> {
    if force {
        return Ok(true);
    }
    dialoguer::Confirm::new()
        .with_prompt(prompt)
        .default(false)
        .interact()
        .map_err(|e| AppError::internal(format!("Input error: {e}")))
}
