//! In-memory folder binding repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use labtrack_core::{AppError, AppResult};
use labtrack_entity::{
    CreateStorageDriveFolder, DriveFolderDetails, FolderOptions, StorageDriveFolder,
};

use super::touch;
use crate::repositories::StorageDriveFolderRepository;

/// Folder binding repository backed by a map behind a Tokio mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageDriveFolderRepository {
    folders: Arc<Mutex<HashMap<Uuid, StorageDriveFolder>>>,
}

impl MemoryStorageDriveFolderRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    async fn collect_sorted<F>(&self, keep: F) -> Vec<StorageDriveFolder>
    where
        F: Fn(&StorageDriveFolder) -> bool,
    {
        let mut out: Vec<StorageDriveFolder> = self
            .folders
            .lock()
            .await
            .values()
            .filter(|f| keep(f))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }
}

fn path_taken(
    folders: &HashMap<Uuid, StorageDriveFolder>,
    except: Option<Uuid>,
    drive_id: Uuid,
    path: &str,
) -> bool {
    folders
        .values()
        .any(|f| Some(f.id) != except && f.drive_id == drive_id && f.path == path)
}

#[async_trait]
impl StorageDriveFolderRepository for MemoryStorageDriveFolderRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<StorageDriveFolder>> {
        Ok(self.folders.lock().await.get(&id).cloned())
    }

    async fn find_by_path(
        &self,
        drive_id: Uuid,
        path: &str,
    ) -> AppResult<Option<StorageDriveFolder>> {
        Ok(self
            .folders
            .lock()
            .await
            .values()
            .find(|f| f.drive_id == drive_id && f.path == path)
            .cloned())
    }

    async fn find_by_drive(&self, drive_id: Uuid) -> AppResult<Vec<StorageDriveFolder>> {
        let mut out = self.collect_sorted(|f| f.drive_id == drive_id).await;
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn find_browser_roots(&self) -> AppResult<Vec<StorageDriveFolder>> {
        Ok(self.collect_sorted(|f| f.browser_root).await)
    }

    async fn find_study_roots(&self) -> AppResult<Vec<StorageDriveFolder>> {
        Ok(self.collect_sorted(|f| f.study_root).await)
    }

    async fn create(&self, data: &CreateStorageDriveFolder) -> AppResult<StorageDriveFolder> {
        data.options.validate()?;
        let mut folders = self.folders.lock().await;
        if path_taken(&folders, None, data.drive_id, &data.path) {
            return Err(AppError::duplicate(format!(
                "Folder path '{}' is already bound on this drive",
                data.path
            )));
        }
        let folder = data.clone().into_folder(Uuid::new_v4(), Utc::now());
        folders.insert(folder.id, folder.clone());
        Ok(folder)
    }

    async fn update_location(
        &self,
        id: Uuid,
        path: &str,
        name: &str,
        details: &DriveFolderDetails,
    ) -> AppResult<StorageDriveFolder> {
        let mut folders = self.folders.lock().await;
        let drive_id = folders
            .get(&id)
            .map(|f| f.drive_id)
            .ok_or_else(|| AppError::not_found(format!("Folder binding {id} not found")))?;
        if path_taken(&folders, Some(id), drive_id, path) {
            return Err(AppError::duplicate(format!(
                "Folder path '{path}' is already bound on this drive"
            )));
        }
        let folder = folders
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Folder binding {id} not found")))?;
        folder.path = path.to_string();
        folder.name = name.to_string();
        folder.details = details.clone();
        folder.updated_at = touch(folder.updated_at);
        Ok(folder.clone())
    }

    async fn update_options(
        &self,
        id: Uuid,
        options: &FolderOptions,
    ) -> AppResult<StorageDriveFolder> {
        options.validate()?;
        let mut folders = self.folders.lock().await;
        let folder = folders
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Folder binding {id} not found")))?;
        folder.write_enabled = options.write_enabled;
        folder.delete_enabled = options.delete_enabled;
        folder.browser_root = options.browser_root;
        folder.study_root = options.study_root;
        folder.updated_at = touch(folder.updated_at);
        Ok(folder.clone())
    }

    // Links live in a separate repository here; callers check them first.
    async fn discard_unlinked(&self, id: Uuid) -> AppResult<bool> {
        Ok(self.folders.lock().await.remove(&id).is_some())
    }
}
