//! In-memory drive repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use labtrack_core::{AppError, AppResult};
use labtrack_entity::{CreateStorageDrive, DriveDetails, StorageDrive};

use super::touch;
use crate::repositories::StorageDriveRepository;

/// Drive repository backed by a map behind a Tokio mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryStorageDriveRepository {
    drives: Arc<Mutex<HashMap<Uuid, StorageDrive>>>,
}

impl MemoryStorageDriveRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageDriveRepository for MemoryStorageDriveRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<StorageDrive>> {
        Ok(self.drives.lock().await.get(&id).cloned())
    }

    async fn find_by_name(&self, display_name: &str) -> AppResult<Option<StorageDrive>> {
        Ok(self
            .drives
            .lock()
            .await
            .values()
            .find(|d| d.display_name == display_name)
            .cloned())
    }

    async fn find_all(&self) -> AppResult<Vec<StorageDrive>> {
        let mut drives: Vec<StorageDrive> = self.drives.lock().await.values().cloned().collect();
        drives.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        Ok(drives)
    }

    async fn create(&self, data: &CreateStorageDrive) -> AppResult<StorageDrive> {
        let mut drives = self.drives.lock().await;
        if drives.values().any(|d| d.display_name == data.display_name) {
            return Err(AppError::duplicate(format!(
                "Drive '{}' already exists",
                data.display_name
            )));
        }
        let drive = data.clone().into_drive(Uuid::new_v4(), Utc::now());
        drives.insert(drive.id, drive.clone());
        Ok(drive)
    }

    async fn update(
        &self,
        id: Uuid,
        display_name: &str,
        root_path: &str,
        details: &DriveDetails,
    ) -> AppResult<StorageDrive> {
        let mut drives = self.drives.lock().await;
        if drives
            .values()
            .any(|d| d.id != id && d.display_name == display_name)
        {
            return Err(AppError::duplicate(format!(
                "Drive '{display_name}' already exists"
            )));
        }
        let drive = drives
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Drive {id} not found")))?;
        if details.drive_type() != drive.drive_type {
            return Err(AppError::validation("The kind of a drive cannot change"));
        }
        drive.display_name = display_name.to_string();
        drive.root_path = root_path.to_string();
        drive.details = details.clone();
        drive.updated_at = touch(drive.updated_at);
        Ok(drive.clone())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> AppResult<StorageDrive> {
        let mut drives = self.drives.lock().await;
        let drive = drives
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Drive {id} not found")))?;
        drive.active = active;
        drive.updated_at = touch(drive.updated_at);
        Ok(drive.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_core::ErrorKind;
    use labtrack_entity::{ExistingFolderPolicy, LocalDriveDetails};

    fn local(name: &str) -> CreateStorageDrive {
        CreateStorageDrive::new(
            name,
            "/data",
            DriveDetails::Local(LocalDriveDetails {
                root_path: "/data".into(),
                existing_folder_policy: ExistingFolderPolicy::Fail,
            }),
        )
    }

    #[tokio::test]
    async fn test_display_name_is_unique() {
        let repo = MemoryStorageDriveRepository::new();
        repo.create(&local("Lab data")).await.unwrap();
        let err = repo.create(&local("Lab data")).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Duplicate);
    }

    #[tokio::test]
    async fn test_updates_bump_updated_at() {
        let repo = MemoryStorageDriveRepository::new();
        let drive = repo.create(&local("Lab data")).await.unwrap();
        let updated = repo
            .update(drive.id, "Lab data (renamed)", "/data", &drive.details)
            .await
            .unwrap();
        assert!(updated.updated_at > drive.updated_at);

        let inactive = repo.set_active(drive.id, false).await.unwrap();
        assert!(!inactive.active);
        assert!(inactive.updated_at > updated.updated_at);
    }
}
