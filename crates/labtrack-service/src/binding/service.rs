//! Folder binding operations.
//!
//! Every change to a backend folder that the application tracks goes through
//! here, so the binding records stay in step with the backends.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use labtrack_core::{
    AppError, AppResult, ListingDepth, RelocationState, StorageFile, StorageFolder, path,
};
use labtrack_database::{
    EntityFolderLinkRepository, StorageDriveFolderRepository, StorageDriveRepository,
};
use labtrack_entity::{
    BindingState, CreateStorageDriveFolder, DriveFolderDetails, EntityRef, FolderOptions,
    StorageDrive, StorageDriveFolder,
};
use labtrack_storage::StorageDispatcher;

/// Request to create a folder for a business entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEntityFolderRequest {
    /// The entity the folder belongs to.
    pub entity: EntityRef,
    /// Binding of the folder to create it under.
    pub parent_folder_id: Uuid,
    /// Folder name; may contain delimiters for nested folders.
    pub name: String,
    /// Flags for the new binding.
    #[serde(default)]
    pub options: FolderOptions,
    /// Whether the folder becomes the entity's primary folder.
    #[serde(default)]
    pub primary: bool,
}

/// Creates, browses, and relocates bound folders.
#[derive(Debug, Clone)]
pub struct FolderBindingService {
    /// Drive repository.
    drives: Arc<dyn StorageDriveRepository>,
    /// Folder binding repository.
    folders: Arc<dyn StorageDriveFolderRepository>,
    /// Entity link repository.
    links: Arc<dyn EntityFolderLinkRepository>,
    /// Backend dispatcher.
    dispatcher: Arc<StorageDispatcher>,
}

impl FolderBindingService {
    /// Creates a new folder binding service.
    pub fn new(
        drives: Arc<dyn StorageDriveRepository>,
        folders: Arc<dyn StorageDriveFolderRepository>,
        links: Arc<dyn EntityFolderLinkRepository>,
        dispatcher: Arc<StorageDispatcher>,
    ) -> Self {
        Self {
            drives,
            folders,
            links,
            dispatcher,
        }
    }

    /// Create a backend folder under a writable parent binding, bind it, and
    /// link it to the entity. Any failure fails the whole call.
    pub async fn create_entity_folder(
        &self,
        req: CreateEntityFolderRequest,
    ) -> AppResult<StorageDriveFolder> {
        req.options.validate()?;
        let parent = self.get_folder(req.parent_folder_id).await?;
        parent.ensure_writable()?;
        let drive = self.load_drive(parent.drive_id).await?;
        let backend = self.dispatcher.for_drive(&drive)?;

        let snapshot = backend
            .create_folder(&drive, &parent.path, &req.name)
            .await?;
        let binding = self
            .folders
            .create(&CreateStorageDriveFolder {
                drive_id: drive.id,
                path: snapshot.path.clone(),
                name: snapshot.name.clone(),
                options: req.options,
                details: DriveFolderDetails::from_folder(drive.drive_type, &snapshot),
            })
            .await?;
        if let Err(e) = self.links.link(req.entity, binding.id, req.primary).await {
            self.discard_binding(&binding).await;
            return Err(e);
        }

        info!(
            entity = %req.entity,
            folder_id = %binding.id,
            drive = %drive.display_name,
            path = %binding.path,
            primary = req.primary,
            "Created entity folder"
        );
        Ok(binding)
    }

    /// Roll back a binding whose entity link could not be written, so a
    /// retry can bind the same path again.
    async fn discard_binding(&self, binding: &StorageDriveFolder) {
        let linked = match self.links.find_by_folder(binding.id).await {
            Ok(links) => !links.is_empty(),
            Err(e) => {
                warn!(folder_id = %binding.id, error = %e, "Could not check links of new binding");
                return;
            }
        };
        if linked {
            return;
        }
        match self.folders.discard_unlinked(binding.id).await {
            Ok(_) => debug!(folder_id = %binding.id, path = %binding.path, "Discarded unlinked binding"),
            Err(e) => warn!(
                folder_id = %binding.id,
                path = %binding.path,
                error = %e,
                "Failed to discard unlinked binding"
            ),
        }
    }

    /// Make sure a folder exists in the backend and is bound. Idempotent on
    /// the folder's path.
    pub async fn register_root_folder(
        &self,
        drive_id: Uuid,
        folder_path: &str,
        name: &str,
        options: FolderOptions,
    ) -> AppResult<StorageDriveFolder> {
        options.validate()?;
        let drive = self.load_drive(drive_id).await?;
        let backend = self.dispatcher.for_drive(&drive)?;

        let snapshot = if backend.folder_exists(&drive, folder_path).await? {
            backend.find_folder_by_path(&drive, folder_path).await?
        } else {
            let cleaned = path::clean(Some(folder_path));
            if path::name_of(&cleaned).is_empty() {
                return Err(AppError::not_found(format!(
                    "Root of drive '{}' does not exist",
                    drive.display_name
                )));
            }
            backend
                .create_folder(&drive, &path::parent_of(&cleaned), &path::name_of(&cleaned))
                .await?
        };

        if let Some(existing) = self.folders.find_by_path(drive.id, &snapshot.path).await? {
            debug!(folder_id = %existing.id, path = %existing.path, "Root folder already bound");
            return Ok(existing);
        }

        let name = [name, snapshot.name.as_str(), drive.display_name.as_str()]
            .into_iter()
            .map(str::trim)
            .find(|n| !n.is_empty())
            .unwrap_or_default()
            .to_string();
        let binding = self
            .folders
            .create(&CreateStorageDriveFolder {
                drive_id: drive.id,
                path: snapshot.path.clone(),
                name,
                options,
                details: DriveFolderDetails::from_folder(drive.drive_type, &snapshot),
            })
            .await?;

        info!(
            folder_id = %binding.id,
            drive = %drive.display_name,
            path = %binding.path,
            browser_root = binding.browser_root,
            study_root = binding.study_root,
            "Registered root folder"
        );
        Ok(binding)
    }

    /// Every folder linked to an entity, primary first.
    pub async fn find_entity_folders(&self, entity: EntityRef) -> AppResult<Vec<StorageDriveFolder>> {
        let links = self.links.find_by_entity(entity).await?;
        let mut folders = Vec::with_capacity(links.len());
        for link in links {
            folders.push(self.get_folder(link.folder_id).await?);
        }
        Ok(folders)
    }

    /// The entity's primary folder, if it has one.
    pub async fn primary_folder(&self, entity: EntityRef) -> AppResult<Option<StorageDriveFolder>> {
        match self.links.find_primary(entity).await? {
            Some(link) => self.get_folder(link.folder_id).await.map(Some),
            None => Ok(None),
        }
    }

    /// Whether the entity's folder is usable. Falls back to the oldest link
    /// when no primary is set.
    pub async fn binding_state(&self, entity: EntityRef) -> AppResult<BindingState> {
        let link = match self.links.find_primary(entity).await? {
            Some(link) => Some(link),
            None => self.links.find_by_entity(entity).await?.into_iter().next(),
        };
        let Some(link) = link else {
            return Ok(BindingState::Unbound);
        };

        let folder = self.get_folder(link.folder_id).await?;
        let drive = self.load_drive(folder.drive_id).await?;
        if drive.is_active() {
            Ok(BindingState::Bound(folder))
        } else {
            Ok(BindingState::Orphaned(folder))
        }
    }

    /// A binding by ID.
    pub async fn get_folder(&self, folder_id: Uuid) -> AppResult<StorageDriveFolder> {
        self.folders
            .find_by_id(folder_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Folder binding {folder_id} not found")))
    }

    /// Browser roots on active drives, oldest first.
    pub async fn browser_roots(&self) -> AppResult<Vec<StorageDriveFolder>> {
        let roots = self.folders.find_browser_roots().await?;
        self.on_active_drives(roots).await
    }

    /// The oldest study root on an active drive.
    pub async fn default_study_root(&self) -> AppResult<Option<StorageDriveFolder>> {
        let roots = self.folders.find_study_roots().await?;
        Ok(self.on_active_drives(roots).await?.into_iter().next())
    }

    /// Live snapshot of a bound folder.
    pub async fn browse(&self, folder_id: Uuid, depth: ListingDepth) -> AppResult<StorageFolder> {
        let folder = self.get_folder(folder_id).await?;
        let drive = self.load_drive(folder.drive_id).await?;
        let backend = self.dispatcher.for_drive(&drive)?;
        backend.list_folder(&drive, &folder.path, depth).await
    }

    /// Upload a local file into the bound folder or one of its subfolders.
    /// `folder_path` may be empty (the bound folder itself) or relative to it.
    pub async fn save_file(
        &self,
        folder_id: Uuid,
        folder_path: &str,
        local_file: &Path,
    ) -> AppResult<StorageFile> {
        let folder = self.get_folder(folder_id).await?;
        folder.ensure_writable()?;
        let drive = self.load_drive(folder.drive_id).await?;
        let backend = self.dispatcher.for_drive(&drive)?;

        let target = Self::within(&folder, folder_path);
        let file = backend.save_file(&drive, &folder, &target, local_file).await?;
        info!(folder_id = %folder.id, path = %file.path, size = file.size, "Saved file");
        Ok(file)
    }

    /// Download a file from the bound folder; `file_path` may be relative to it.
    pub async fn fetch_file(&self, folder_id: Uuid, file_path: &str) -> AppResult<Bytes> {
        let folder = self.get_folder(folder_id).await?;
        let drive = self.load_drive(folder.drive_id).await?;
        let backend = self.dispatcher.for_drive(&drive)?;
        let target = Self::within(&folder, file_path);
        backend.fetch_file(&drive, &folder, &target).await
    }

    /// Rename a bound folder in place.
    pub async fn rename_folder(
        &self,
        folder_id: Uuid,
        new_name: &str,
    ) -> AppResult<StorageDriveFolder> {
        let folder = self.get_folder(folder_id).await?;
        folder.ensure_writable()?;
        let name = path::clean(Some(new_name));
        if name.is_empty() || name.contains(path::DELIMITER) {
            return Err(AppError::validation(format!(
                "'{new_name}' is not a valid folder name"
            )));
        }
        let drive = self.load_drive(folder.drive_id).await?;
        let destination = path::folder_path(&path::join(&path::parent_of(&folder.path), &name));
        self.relocate(&folder, &drive, &destination).await
    }

    /// Move a bound folder under another binding on the same drive.
    pub async fn move_folder(
        &self,
        folder_id: Uuid,
        new_parent_id: Uuid,
    ) -> AppResult<StorageDriveFolder> {
        let folder = self.get_folder(folder_id).await?;
        let parent = self.get_folder(new_parent_id).await?;
        if folder.drive_id != parent.drive_id {
            return Err(AppError::validation(
                "Folders can only be moved within their drive",
            ));
        }
        folder.ensure_writable()?;
        parent.ensure_writable()?;

        let drive = self.load_drive(folder.drive_id).await?;
        let destination =
            path::folder_path(&path::join(&parent.path, &path::name_of(&folder.path)));
        self.relocate(&folder, &drive, &destination).await
    }

    /// Replace a binding's flags.
    pub async fn update_flags(
        &self,
        folder_id: Uuid,
        options: FolderOptions,
    ) -> AppResult<StorageDriveFolder> {
        options.validate()?;
        let updated = self.folders.update_options(folder_id, &options).await?;
        info!(
            folder_id = %updated.id,
            write_enabled = updated.write_enabled,
            browser_root = updated.browser_root,
            study_root = updated.study_root,
            "Updated folder flags"
        );
        Ok(updated)
    }

    /// Make a binding read-only and drop its root roles. The backend folder
    /// and the binding record are kept.
    pub async fn deactivate_folder(&self, folder_id: Uuid) -> AppResult<StorageDriveFolder> {
        self.update_flags(folder_id, FolderOptions::deactivated())
            .await
    }

    async fn load_drive(&self, drive_id: Uuid) -> AppResult<StorageDrive> {
        self.drives
            .find_by_id(drive_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Storage drive {drive_id} not found")))
    }

    async fn on_active_drives(
        &self,
        folders: Vec<StorageDriveFolder>,
    ) -> AppResult<Vec<StorageDriveFolder>> {
        let mut active: HashMap<Uuid, bool> = HashMap::new();
        let mut kept = Vec::with_capacity(folders.len());
        for folder in folders {
            let is_active = match active.get(&folder.drive_id) {
                Some(known) => *known,
                None => {
                    let known = self
                        .drives
                        .find_by_id(folder.drive_id)
                        .await?
                        .is_some_and(|d| d.is_active());
                    active.insert(folder.drive_id, known);
                    known
                }
            };
            if is_active {
                kept.push(folder);
            }
        }
        Ok(kept)
    }

    /// Resolve a path given relative to a binding.
    fn within(folder: &StorageDriveFolder, raw: &str) -> String {
        let cleaned = path::clean(Some(raw));
        if cleaned.is_empty() {
            return folder.path.clone();
        }
        if folder.contains(&cleaned) || cleaned.starts_with(path::DELIMITER) {
            return cleaned;
        }
        path::join(&folder.path, &cleaned)
    }

    async fn relocate(
        &self,
        folder: &StorageDriveFolder,
        drive: &StorageDrive,
        destination: &str,
    ) -> AppResult<StorageDriveFolder> {
        let backend = self.dispatcher.for_drive(drive)?;
        let snapshot = match backend.relocate_folder(drive, &folder.path, destination).await {
            Ok(snapshot) => snapshot,
            Err(e) if e.relocation == Some(RelocationState::DestinationOnly) => {
                warn!(
                    folder_id = %folder.id,
                    to = %destination,
                    error = %e,
                    "Relocation reported an error but the folder reached its destination"
                );
                backend.find_folder_by_path(drive, destination).await?
            }
            Err(e) => return Err(e),
        };

        let updated = self
            .folders
            .update_location(
                folder.id,
                &snapshot.path,
                &snapshot.name,
                &DriveFolderDetails::from_folder(drive.drive_type, &snapshot),
            )
            .await?;

        // Bindings nested under the old location move with it.
        for nested in self.folders.find_by_drive(drive.id).await? {
            if nested.id == folder.id {
                continue;
            }
            let Some(rest) = path::relative_to(&folder.path, &nested.path) else {
                continue;
            };
            let new_path = path::folder_path(&path::join(&snapshot.path, &rest));
            let details = match &nested.details {
                DriveFolderDetails::ObjectStorage { .. } => DriveFolderDetails::ObjectStorage {
                    key: new_path.clone(),
                    etag: None,
                },
                other => other.clone(),
            };
            self.folders
                .update_location(nested.id, &new_path, &nested.name, &details)
                .await?;
            debug!(folder_id = %nested.id, path = %new_path, "Moved nested binding");
        }

        info!(
            folder_id = %folder.id,
            from = %folder.path,
            to = %updated.path,
            "Relocated folder"
        );
        Ok(updated)
    }
}
