//! Storage drive management commands.

use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use labtrack_core::AppResult;
use labtrack_core::config::{AppConfig, DriveSettings};
use labtrack_entity::StorageDrive;
use labtrack_service::UpdateDriveRequest;
use labtrack_service::initializer::drive_from_settings;

use super::{Services, confirm, parse_id};

/// Arguments for drive commands
#[derive(Debug, Args)]
pub struct DriveArgs {
    /// Drive subcommand
    #[command(subcommand)]
    pub command: DriveCommand,
}

/// Backend kinds accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Local filesystem directory
    Local,
    /// S3-compatible bucket
    ObjectStorage,
    /// Document-management REST API
    DocumentApi,
}

impl KindArg {
    fn as_setting(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::ObjectStorage => "object_storage",
            Self::DocumentApi => "document_api",
        }
    }
}

/// Drive subcommands
#[derive(Debug, Subcommand)]
pub enum DriveCommand {
    /// List all drives
    List,
    /// Show one drive
    Show {
        /// Drive ID
        id: String,
    },
    /// Register a drive
    Register {
        /// Display name
        #[arg(short, long)]
        name: String,
        /// Backend kind
        #[arg(short, long, value_enum)]
        kind: KindArg,
        /// Root directory, bucket prefix, or tenant root path
        #[arg(short, long, default_value = "")]
        root: String,
        /// Local: fail, use_existing, or overwrite_existing
        #[arg(long)]
        existing_folder_policy: Option<String>,
        /// Object storage: bucket name
        #[arg(long)]
        bucket: Option<String>,
        /// Object storage: region
        #[arg(long)]
        region: Option<String>,
        /// Object storage: custom endpoint
        #[arg(long)]
        endpoint: Option<String>,
        /// Object storage: path-style addressing
        #[arg(long)]
        force_path_style: bool,
        /// Document API: base URL
        #[arg(long)]
        base_url: Option<String>,
        /// Document API: tenant
        #[arg(long)]
        tenant: Option<String>,
        /// Document API: bearer token
        #[arg(long)]
        api_token: Option<String>,
    },
    /// Rename a drive or move its root
    Update {
        /// Drive ID
        id: String,
        /// New display name
        #[arg(short, long)]
        name: Option<String>,
        /// New root path
        #[arg(short, long)]
        root: Option<String>,
    },
    /// Stop serving a drive
    Deactivate {
        /// Drive ID
        id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
    /// Serve a deactivated drive again
    Reactivate {
        /// Drive ID
        id: String,
    },
    /// Check backend reachability
    Health {
        /// Drive ID; every active drive when omitted
        id: Option<String>,
    },
}

/// Drive display row
#[derive(Debug, Serialize, Tabled)]
struct DriveRow {
    id: String,
    name: String,
    kind: String,
    root: String,
    active: String,
    updated: String,
}

impl From<&StorageDrive> for DriveRow {
    fn from(d: &StorageDrive) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.display_name.clone(),
            kind: d.drive_type.to_string(),
            root: d.root_path.clone(),
            active: output::flag(d.active),
            updated: d.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
struct HealthRow {
    id: String,
    name: String,
    kind: String,
    healthy: String,
}

/// Execute drive commands
pub async fn execute(args: &DriveArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = Services::connect(config).await?;
    let drives = &services.drives;

    match &args.command {
        DriveCommand::List => {
            let rows: Vec<DriveRow> = drives.list().await?.iter().map(DriveRow::from).collect();
            output::print_list(&rows, format);
        }
        DriveCommand::Show { id } => {
            let drive = drives.get(parse_id(id, "drive")?).await?;
            output::print_item(&DriveRow::from(&drive), format);
        }
        DriveCommand::Register {
            name,
            kind,
            root,
            existing_folder_policy,
            bucket,
            region,
            endpoint,
            force_path_style,
            base_url,
            tenant,
            api_token,
        } => {
            let settings = DriveSettings {
                name: name.clone(),
                kind: kind.as_setting().to_string(),
                root_path: root.clone(),
                existing_folder_policy: existing_folder_policy.clone(),
                bucket: bucket.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                access_key_id: None,
                secret_access_key: None,
                force_path_style: *force_path_style,
                base_url: base_url.clone(),
                tenant: tenant.clone(),
                api_token: api_token.clone(),
                root_folders: Vec::new(),
            };
            let drive = drives
                .register(drive_from_settings(&settings, &config.storage)?)
                .await?;
            output::print_success(&format!(
                "Drive '{}' registered (id: {}, kind: {})",
                drive.display_name, drive.id, drive.drive_type
            ));
        }
        DriveCommand::Update { id, name, root } => {
            let drive = drives
                .update(
                    parse_id(id, "drive")?,
                    UpdateDriveRequest {
                        display_name: name.clone(),
                        root_path: root.clone(),
                        details: None,
                    },
                )
                .await?;
            output::print_success(&format!("Drive '{}' updated", drive.display_name));
        }
        DriveCommand::Deactivate { id, force } => {
            let drive = drives.get(parse_id(id, "drive")?).await?;
            let prompt = format!(
                "Deactivate '{}'? Folders bound on it become orphaned.",
                drive.display_name
            );
            if !confirm(&prompt, *force)? {
                println!("Cancelled.");
            } else {
                drives.deactivate(drive.id).await?;
                output::print_success(&format!("Drive '{}' deactivated", drive.display_name));
            }
        }
        DriveCommand::Reactivate { id } => {
            let drive = drives.reactivate(parse_id(id, "drive")?).await?;
            output::print_success(&format!("Drive '{}' reactivated", drive.display_name));
        }
        DriveCommand::Health { id } => {
            let report = match id {
                Some(id) => vec![drives.health(parse_id(id, "drive")?).await?],
                None => drives.health_all().await?,
            };
            let rows: Vec<HealthRow> = report
                .into_iter()
                .map(|h| HealthRow {
                    id: h.drive_id.to_string(),
                    name: h.display_name,
                    kind: h.drive_type.to_string(),
                    healthy: output::flag(h.healthy),
                })
                .collect();
            output::print_list(&rows, format);
        }
    }

    services.pool.close().await;
    Ok(())
}
