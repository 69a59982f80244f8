//! File upload and download commands.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use labtrack_core::config::AppConfig;
use labtrack_core::{AppError, AppResult, StorageFile};

use super::{Services, parse_id};

/// Arguments for file commands
#[derive(Debug, Args)]
pub struct FileArgs {
    /// File subcommand
    #[command(subcommand)]
    pub command: FileCommand,
}

/// File subcommands
#[derive(Debug, Subcommand)]
pub enum FileCommand {
    /// Upload a local file into a bound folder
    Upload {
        /// Folder binding ID
        #[arg(short, long)]
        folder: String,
        /// Subfolder relative to the binding
        #[arg(short, long, default_value = "")]
        path: String,
        /// Local file to upload
        file: PathBuf,
    },
    /// Download a file from a bound folder
    Download {
        /// Folder binding ID
        #[arg(short, long)]
        folder: String,
        /// File path relative to the binding
        path: String,
        /// Where to write it; the file name in the current directory by default
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct FileRow {
    name: String,
    path: String,
    size: String,
    mime_type: String,
}

impl From<&StorageFile> for FileRow {
    fn from(f: &StorageFile) -> Self {
        Self {
            name: f.name.clone(),
            path: f.path.clone(),
            size: output::format_bytes(f.size),
            mime_type: f.mime_type.clone().unwrap_or_default(),
        }
    }
}

/// Execute file commands
pub async fn execute(args: &FileArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = Services::connect(config).await?;

    match &args.command {
        FileCommand::Upload { folder, path, file } => {
            let saved = services
                .bindings
                .save_file(parse_id(folder, "folder")?, path, file)
                .await?;
            output::print_item(&FileRow::from(&saved), format);
        }
        FileCommand::Download {
            folder,
            path,
            output: target,
        } => {
            let data = services
                .bindings
                .fetch_file(parse_id(folder, "folder")?, path)
                .await?;
            let target = match target {
                Some(target) => target.clone(),
                None => {
                    let name = labtrack_core::path::name_of(path);
                    if name.is_empty() {
                        return Err(AppError::validation(format!("'{path}' does not name a file")));
                    }
                    PathBuf::from(name)
                }
            };
            tokio::fs::write(&target, &data).await?;
            output::print_success(&format!(
                "Downloaded {} to {}",
                output::format_bytes(data.len() as u64),
                target.display()
            ));
        }
    }

    services.pool.close().await;
    Ok(())
}
