//! Database migration commands.

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use labtrack_core::AppResult;
use labtrack_core::config::AppConfig;
use labtrack_database::DatabasePool;
use labtrack_database::migration::{applied_migrations, run_migrations};

/// Arguments for the migrate command
#[derive(Debug, Args)]
pub struct MigrateArgs {
    /// Migration subcommand
    #[command(subcommand)]
    pub command: MigrateCommand,
}

/// Migration subcommands
#[derive(Debug, Subcommand)]
pub enum MigrateCommand {
    /// Run all pending migrations
    Run,
    /// Show applied migrations
    Status,
}

#[derive(Debug, Serialize, Tabled)]
struct MigrationRow {
    version: i64,
    description: String,
    installed_on: String,
    success: String,
}

/// Execute migration commands
pub async fn execute(args: &MigrateArgs, config: &AppConfig) -> AppResult<()> {
    let mut database = config.database.clone();
    database.run_migrations = false;
    let pool = DatabasePool::connect(&database).await?;

    match &args.command {
        MigrateCommand::Run => {
            println!("Running database migrations...");
            run_migrations(pool.pool()).await?;
            output::print_success("All migrations applied.");
        }
        MigrateCommand::Status => {
            let rows: Vec<MigrationRow> = applied_migrations(pool.pool())
                .await?
                .into_iter()
                .map(|m| MigrationRow {
                    version: m.version,
                    description: m.description,
                    installed_on: m.installed_on.format("%Y-%m-%d %H:%M").to_string(),
                    success: output::flag(m.success),
                })
                .collect();
            output::print_list(&rows, OutputFormat::Table);
        }
    }

    pool.close().await;
    Ok(())
}
