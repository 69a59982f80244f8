//! Storage drive administration.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use labtrack_core::{AppError, AppResult, path};
use labtrack_database::StorageDriveRepository;
use labtrack_entity::{CreateStorageDrive, DriveDetails, DriveType, StorageDrive};
use labtrack_storage::StorageDispatcher;

/// Health of one drive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveHealth {
    /// Drive ID.
    pub drive_id: Uuid,
    /// Display name.
    pub display_name: String,
    /// Backend kind.
    pub drive_type: DriveType,
    /// Whether the backend answered.
    pub healthy: bool,
}

/// Request to change a drive's mutable attributes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateDriveRequest {
    /// New display name.
    pub display_name: Option<String>,
    /// New root path.
    pub root_path: Option<String>,
    /// New connection details; must keep the drive's kind.
    pub details: Option<DriveDetails>,
}

/// Registers, updates, and checks storage drives.
#[derive(Debug, Clone)]
pub struct DriveService {
    /// Drive repository.
    drives: Arc<dyn StorageDriveRepository>,
    /// Backend dispatcher.
    dispatcher: Arc<StorageDispatcher>,
}

impl DriveService {
    /// Creates a new drive service.
    pub fn new(
        drives: Arc<dyn StorageDriveRepository>,
        dispatcher: Arc<StorageDispatcher>,
    ) -> Self {
        Self { drives, dispatcher }
    }

    /// Every drive, active or not.
    pub async fn list(&self) -> AppResult<Vec<StorageDrive>> {
        self.drives.find_all().await
    }

    /// A drive by ID.
    pub async fn get(&self, drive_id: Uuid) -> AppResult<StorageDrive> {
        self.drives
            .find_by_id(drive_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Storage drive {drive_id} not found")))
    }

    /// A drive by display name.
    pub async fn find_by_name(&self, display_name: &str) -> AppResult<Option<StorageDrive>> {
        self.drives.find_by_name(display_name).await
    }

    /// Register a drive. Its kind must have a backend in this process.
    pub async fn register(&self, data: CreateStorageDrive) -> AppResult<StorageDrive> {
        data.validate()?;
        self.dispatcher.resolve(data.drive_type())?;
        let drive = self.drives.create(&data).await?;
        info!(
            drive_id = %drive.id,
            name = %drive.display_name,
            kind = %drive.drive_type,
            root = %drive.root_path,
            "Registered storage drive"
        );
        Ok(drive)
    }

    /// Change a drive's name, root, or details. The kind cannot change.
    pub async fn update(&self, drive_id: Uuid, req: UpdateDriveRequest) -> AppResult<StorageDrive> {
        let drive = self.get(drive_id).await?;
        let details_given = req.details.is_some();
        let mut details = req.details.unwrap_or_else(|| drive.details.clone());
        if details.drive_type() != drive.drive_type {
            return Err(AppError::validation(format!(
                "Drive '{}' is a {} drive; its kind cannot change to {}",
                drive.display_name,
                drive.drive_type,
                details.drive_type()
            )));
        }

        // A local drive has one root, held in both the row and its details.
        let root_path = match (&mut details, req.root_path) {
            (DriveDetails::Local(local), Some(root)) => {
                if details_given && !path::compare(&local.root_path, &root) {
                    return Err(AppError::validation(format!(
                        "Root '{root}' contradicts the local root '{}'",
                        local.root_path
                    )));
                }
                local.root_path = root.clone();
                root
            }
            (DriveDetails::Local(local), None) => local.root_path.clone(),
            (_, Some(root)) => root,
            (_, None) => drive.root_path.clone(),
        };
        details.validate()?;

        let display_name = req.display_name.unwrap_or(drive.display_name);
        if display_name.trim().is_empty() {
            return Err(AppError::validation("Drive name cannot be empty"));
        }

        let updated = self
            .drives
            .update(drive_id, &display_name, &root_path, &details)
            .await?;
        self.dispatcher.forget_drive(&updated);
        info!(
            drive_id = %updated.id,
            name = %updated.display_name,
            root = %updated.root_path,
            "Updated storage drive"
        );
        Ok(updated)
    }

    /// Stop serving a drive. Its bindings are kept and report orphaned.
    pub async fn deactivate(&self, drive_id: Uuid) -> AppResult<StorageDrive> {
        let drive = self.drives.set_active(drive_id, false).await?;
        self.dispatcher.forget_drive(&drive);
        info!(drive_id = %drive.id, name = %drive.display_name, "Deactivated storage drive");
        Ok(drive)
    }

    /// Serve a deactivated drive again.
    pub async fn reactivate(&self, drive_id: Uuid) -> AppResult<StorageDrive> {
        let drive = self.drives.set_active(drive_id, true).await?;
        info!(drive_id = %drive.id, name = %drive.display_name, "Reactivated storage drive");
        Ok(drive)
    }

    /// Whether a drive's backend is reachable.
    pub async fn health(&self, drive_id: Uuid) -> AppResult<DriveHealth> {
        let drive = self.get(drive_id).await?;
        let backend = self.dispatcher.for_drive(&drive)?;
        let healthy = backend.health_check(&drive).await?;
        Ok(DriveHealth {
            drive_id: drive.id,
            display_name: drive.display_name,
            drive_type: drive.drive_type,
            healthy,
        })
    }

    /// Health of every active drive. Errors count as unhealthy.
    pub async fn health_all(&self) -> AppResult<Vec<DriveHealth>> {
        let mut report = Vec::new();
        for drive in self.drives.find_all().await? {
            if !drive.is_active() {
                continue;
            }
            let healthy = match self.health(drive.id).await {
                Ok(h) => h.healthy,
                Err(e) => {
                    warn!(drive_id = %drive.id, error = %e, "Drive health check failed");
                    false
                }
            };
            report.push(DriveHealth {
                drive_id: drive.id,
                display_name: drive.display_name,
                drive_type: drive.drive_type,
                healthy,
            });
        }
        Ok(report)
    }
}
