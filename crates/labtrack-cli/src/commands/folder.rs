//! Folder binding commands.

use clap::{Args, Subcommand, ValueEnum};
use serde::Serialize;
use tabled::Tabled;

use crate::output::{self, OutputFormat};
use labtrack_core::config::AppConfig;
use labtrack_core::{AppResult, ListingDepth, StorageFolder};
use labtrack_entity::{BindingState, EntityKind, EntityRef, FolderOptions, StorageDriveFolder};
use labtrack_service::CreateEntityFolderRequest;

use super::{Services, confirm, parse_id};

/// Arguments for folder commands
#[derive(Debug, Args)]
pub struct FolderArgs {
    /// Folder subcommand
    #[command(subcommand)]
    pub command: FolderCommand,
}

/// Entity kinds accepted on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EntityKindArg {
    Program,
    Study,
    Assay,
}

impl EntityKindArg {
    fn entity(self, id: uuid::Uuid) -> EntityRef {
        let kind = match self {
            Self::Program => EntityKind::Program,
            Self::Study => EntityKind::Study,
            Self::Assay => EntityKind::Assay,
        };
        EntityRef { kind, id }
    }
}

/// Folder subcommands
#[derive(Debug, Subcommand)]
pub enum FolderCommand {
    /// List browser roots on active drives
    Roots,
    /// Show one binding
    Show {
        /// Folder binding ID
        id: String,
    },
    /// List the live contents of a bound folder
    Browse {
        /// Folder binding ID
        id: String,
        /// Include every descendant
        #[arg(short, long)]
        recursive: bool,
    },
    /// Show the folders bound to an entity
    Entity {
        /// Entity kind
        #[arg(value_enum)]
        kind: EntityKindArg,
        /// Entity ID
        id: String,
    },
    /// Create a folder for an entity under a writable binding
    Create {
        /// Parent folder binding ID
        #[arg(short, long)]
        parent: String,
        /// Folder name; may contain `/` for nested folders
        #[arg(short, long)]
        name: String,
        /// Entity kind
        #[arg(long, value_enum)]
        entity_kind: EntityKindArg,
        /// Entity ID
        #[arg(long)]
        entity_id: String,
        /// Make it the entity's primary folder
        #[arg(long)]
        primary: bool,
        /// Bind the folder read-only
        #[arg(long)]
        read_only: bool,
    },
    /// Bind an existing or new folder as a root
    RegisterRoot {
        /// Drive ID
        #[arg(short, long)]
        drive: String,
        /// Backend path; the drive root when omitted
        #[arg(short, long, default_value = "")]
        path: String,
        /// Display name
        #[arg(short, long, default_value = "")]
        name: String,
        /// Allow new study folders under it
        #[arg(long)]
        study_root: bool,
    },
    /// Rename a bound folder
    Rename {
        /// Folder binding ID
        id: String,
        /// New name
        name: String,
    },
    /// Move a bound folder under another binding on the same drive
    Move {
        /// Folder binding ID
        id: String,
        /// New parent binding ID
        parent: String,
    },
    /// Change a binding's flags
    Flags {
        /// Folder binding ID
        id: String,
        #[arg(long)]
        write: Option<bool>,
        #[arg(long)]
        delete: Option<bool>,
        #[arg(long)]
        browser_root: Option<bool>,
        #[arg(long)]
        study_root: Option<bool>,
    },
    /// Make a binding read-only and drop its root roles
    Deactivate {
        /// Folder binding ID
        id: String,
        /// Skip confirmation prompt
        #[arg(long)]
        force: bool,
    },
}

/// Binding display row
#[derive(Debug, Serialize, Tabled)]
struct BindingRow {
    id: String,
    name: String,
    path: String,
    drive: String,
    write: String,
    browser_root: String,
    study_root: String,
}

impl From<&StorageDriveFolder> for BindingRow {
    fn from(f: &StorageDriveFolder) -> Self {
        Self {
            id: f.id.to_string(),
            name: f.name.clone(),
            path: f.path.clone(),
            drive: f.drive_id.to_string(),
            write: output::flag(f.write_enabled),
            browser_root: output::flag(f.browser_root),
            study_root: output::flag(f.study_root),
        }
    }
}

/// Folder content row
#[derive(Debug, Serialize, Tabled)]
struct EntryRow {
    kind: String,
    path: String,
    size: String,
    modified: String,
}

fn entry_rows(folder: &StorageFolder, rows: &mut Vec<EntryRow>) {
    for sub in &folder.subfolders {
        rows.push(EntryRow {
            kind: "folder".into(),
            path: sub.path.clone(),
            size: output::format_bytes(sub.total_size()),
            modified: modified(sub.last_modified),
        });
        entry_rows(sub, rows);
    }
    for file in &folder.files {
        rows.push(EntryRow {
            kind: "file".into(),
            path: file.path.clone(),
            size: output::format_bytes(file.size),
            modified: modified(file.last_modified),
        });
    }
}

fn modified(at: Option<chrono::DateTime<chrono::Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default()
}

/// Execute folder commands
pub async fn execute(args: &FolderArgs, config: &AppConfig, format: OutputFormat) -> AppResult<()> {
    let services = Services::connect(config).await?;
    let bindings = &services.bindings;

    match &args.command {
        FolderCommand::Roots => {
            let rows: Vec<BindingRow> = bindings
                .browser_roots()
                .await?
                .iter()
                .map(BindingRow::from)
                .collect();
            output::print_list(&rows, format);
        }
        FolderCommand::Show { id } => {
            let folder = bindings.get_folder(parse_id(id, "folder")?).await?;
            output::print_item(&BindingRow::from(&folder), format);
        }
        FolderCommand::Browse { id, recursive } => {
            let depth = if *recursive {
                ListingDepth::Recursive
            } else {
                ListingDepth::Shallow
            };
            let snapshot = bindings.browse(parse_id(id, "folder")?, depth).await?;
            let mut rows = Vec::new();
            entry_rows(&snapshot, &mut rows);
            output::print_list(&rows, format);
        }
        FolderCommand::Entity { kind, id } => {
            let entity = kind.entity(parse_id(id, "entity")?);
            match bindings.binding_state(entity).await? {
                BindingState::Unbound => output::print_warning(&format!("{entity} has no folder")),
                BindingState::Orphaned(f) => output::print_warning(&format!(
                    "{entity} is bound to '{}' on a deactivated drive",
                    f.path
                )),
                BindingState::Bound(_) => {}
            }
            let rows: Vec<BindingRow> = bindings
                .find_entity_folders(entity)
                .await?
                .iter()
                .map(BindingRow::from)
                .collect();
            output::print_list(&rows, format);
        }
        FolderCommand::Create {
            parent,
            name,
            entity_kind,
            entity_id,
            primary,
            read_only,
        } => {
            let options = FolderOptions {
                write_enabled: !read_only,
                ..FolderOptions::entity_folder()
            };
            let folder = bindings
                .create_entity_folder(CreateEntityFolderRequest {
                    entity: entity_kind.entity(parse_id(entity_id, "entity")?),
                    parent_folder_id: parse_id(parent, "parent folder")?,
                    name: name.clone(),
                    options,
                    primary: *primary,
                })
                .await?;
            output::print_success(&format!(
                "Folder '{}' created (id: {}, path: {})",
                folder.name, folder.id, folder.path
            ));
        }
        FolderCommand::RegisterRoot {
            drive,
            path,
            name,
            study_root,
        } => {
            let options = if *study_root {
                FolderOptions::study_root()
            } else {
                FolderOptions::browser_root()
            };
            let folder = bindings
                .register_root_folder(parse_id(drive, "drive")?, path, name, options)
                .await?;
            output::print_success(&format!(
                "Root folder '{}' bound (id: {}, path: {})",
                folder.name, folder.id, folder.path
            ));
        }
        FolderCommand::Rename { id, name } => {
            let folder = bindings.rename_folder(parse_id(id, "folder")?, name).await?;
            output::print_success(&format!("Folder renamed to '{}'", folder.path));
        }
        FolderCommand::Move { id, parent } => {
            let folder = bindings
                .move_folder(parse_id(id, "folder")?, parse_id(parent, "parent folder")?)
                .await?;
            output::print_success(&format!("Folder moved to '{}'", folder.path));
        }
        FolderCommand::Flags {
            id,
            write,
            delete,
            browser_root,
            study_root,
        } => {
            let folder = bindings.get_folder(parse_id(id, "folder")?).await?;
            let current = folder.options();
            let options = FolderOptions {
                write_enabled: write.unwrap_or(current.write_enabled),
                delete_enabled: delete.unwrap_or(current.delete_enabled),
                browser_root: browser_root.unwrap_or(current.browser_root),
                study_root: study_root.unwrap_or(current.study_root),
            };
            let updated = bindings.update_flags(folder.id, options).await?;
            output::print_item(&BindingRow::from(&updated), format);
        }
        FolderCommand::Deactivate { id, force } => {
            let folder = bindings.get_folder(parse_id(id, "folder")?).await?;
            let prompt = format!("Make '{}' read-only and drop its root roles?", folder.path);
            if !confirm(&prompt, *force)? {
                println!("Cancelled.");
            } else {
                bindings.deactivate_folder(folder.id).await?;
                output::print_success(&format!("Folder '{}' deactivated", folder.path));
            }
        }
    }

    services.pool.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_core::StorageFile;

    #[test]
    fn test_entry_rows_walk_subfolders() {
        let mut root = StorageFolder::new("runs/");
        let mut day = StorageFolder::new("runs/day1/");
        day.files.push(StorageFile::new("runs/day1/a.fasta", 2048));
        root.subfolders.push(day);
        root.files.push(StorageFile::new("runs/notes.txt", 10));

        let mut rows = Vec::new();
        entry_rows(&root, &mut rows);
        let paths: Vec<&str> = rows.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["runs/day1/", "runs/day1/a.fasta", "runs/notes.txt"]);
        assert_eq!(rows[0].size, "2.00 KB");
    }
}
