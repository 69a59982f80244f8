//! Storage drive entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use labtrack_core::{AppError, AppResult, path};

use super::details::{
    DocumentApiDriveDetails, DriveDetails, LocalDriveDetails, ObjectStorageDriveDetails,
};
use super::kind::DriveType;

/// A registered backend instance: one root directory, one bucket, or one
/// document-API tenant.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorageDrive {
    /// Unique drive identifier.
    pub id: Uuid,
    /// The backend kind. Immutable after creation.
    pub drive_type: DriveType,
    /// Human-readable name.
    pub display_name: String,
    /// Root directory, bucket prefix, or tenant root path.
    pub root_path: String,
    /// Retired drives are deactivated, never deleted.
    pub active: bool,
    /// Connection details matching `drive_type`.
    #[sqlx(json)]
    pub details: DriveDetails,
    /// When the drive was registered.
    pub created_at: DateTime<Utc>,
    /// When the drive was last updated.
    pub updated_at: DateTime<Utc>,
}

impl StorageDrive {
    /// Check if the drive is active.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Verify that the details sub-record matches the drive kind and, for
    /// local drives, the drive root.
    pub fn ensure_consistent(&self) -> AppResult<()> {
        if self.details.drive_type() != self.drive_type {
            return Err(AppError::configuration(format!(
                "Drive {} is of kind {} but carries {} details",
                self.id,
                self.drive_type,
                self.details.drive_type()
            )));
        }
        if !local_root_matches(&self.root_path, &self.details) {
            return Err(AppError::configuration(format!(
                "Drive {} has root '{}' but its local details point elsewhere",
                self.id, self.root_path
            )));
        }
        Ok(())
    }

    /// Local filesystem details, or a configuration error for other kinds.
    pub fn local_details(&self) -> AppResult<&LocalDriveDetails> {
        match &self.details {
            DriveDetails::Local(d) => Ok(d),
            other => Err(mismatch(self.id, DriveType::Local, other.drive_type())),
        }
    }

    /// Object-storage details, or a configuration error for other kinds.
    pub fn object_storage_details(&self) -> AppResult<&ObjectStorageDriveDetails> {
        match &self.details {
            DriveDetails::ObjectStorage(d) => Ok(d),
            other => Err(mismatch(self.id, DriveType::ObjectStorage, other.drive_type())),
        }
    }

    /// Document-API details, or a configuration error for other kinds.
    pub fn document_api_details(&self) -> AppResult<&DocumentApiDriveDetails> {
        match &self.details {
            DriveDetails::DocumentApi(d) => Ok(d),
            other => Err(mismatch(self.id, DriveType::DocumentApi, other.drive_type())),
        }
    }
}

/// The local backend resolves folders from the details root, so it must
/// name the same directory as the drive root.
pub(crate) fn local_root_matches(root_path: &str, details: &DriveDetails) -> bool {
    match details {
        DriveDetails::Local(local) => {
            path::normalize(&path::clean(Some(root_path)))
                == path::normalize(&path::clean(Some(&local.root_path)))
        }
        _ => true,
    }
}

fn mismatch(id: Uuid, expected: DriveType, actual: DriveType) -> AppError {
    AppError::configuration(format!(
        "Drive {id} was handed to the {expected} backend but has {actual} details"
    ))
}

/// Data required to register a new drive.
///
/// The kind is derived from the details, so a drive can never be created
/// with a mismatched sub-record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStorageDrive {
    /// Human-readable name.
    pub display_name: String,
    /// Root directory, bucket prefix, or tenant root path.
    pub root_path: String,
    /// Connection details.
    pub details: DriveDetails,
}

impl CreateStorageDrive {
    /// Create registration data.
    pub fn new(
        display_name: impl Into<String>,
        root_path: impl Into<String>,
        details: DriveDetails,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            root_path: root_path.into(),
            details,
        }
    }

    /// The kind of the drive being registered.
    pub fn drive_type(&self) -> DriveType {
        self.details.drive_type()
    }

    /// Validate the registration data.
    pub fn validate(&self) -> AppResult<()> {
        if self.display_name.trim().is_empty() {
            return Err(AppError::validation("Drive display name cannot be empty"));
        }
        if !local_root_matches(&self.root_path, &self.details) {
            return Err(AppError::validation(format!(
                "Drive root '{}' differs from the local details root",
                self.root_path
            )));
        }
        self.details.validate()
    }

    /// Build the drive row this registration would produce.
    pub fn into_drive(self, id: Uuid, now: DateTime<Utc>) -> StorageDrive {
        StorageDrive {
            id,
            drive_type: self.details.drive_type(),
            display_name: self.display_name,
            root_path: self.root_path,
            active: true,
            details: self.details,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::ExistingFolderPolicy;

    fn local(root: &str) -> DriveDetails {
        DriveDetails::Local(LocalDriveDetails {
            root_path: root.into(),
            existing_folder_policy: ExistingFolderPolicy::Fail,
        })
    }

    #[test]
    fn test_kind_follows_details() {
        let drive = CreateStorageDrive::new("Local", "/data", local("/data"))
            .into_drive(Uuid::new_v4(), Utc::now());
        assert_eq!(drive.drive_type, DriveType::Local);
        assert!(drive.is_active());
        assert!(drive.ensure_consistent().is_ok());
        assert!(drive.local_details().is_ok());
        assert!(drive.object_storage_details().is_err());
    }

    #[test]
    fn test_mismatched_details_detected() {
        let mut drive = CreateStorageDrive::new("Local", "/data", local("/data"))
            .into_drive(Uuid::new_v4(), Utc::now());
        drive.drive_type = DriveType::ObjectStorage;
        assert!(drive.ensure_consistent().is_err());
    }

    #[test]
    fn test_local_root_must_match_details() {
        let mut drive = CreateStorageDrive::new("Local", "/data", local("/data/"))
            .into_drive(Uuid::new_v4(), Utc::now());
        assert!(drive.ensure_consistent().is_ok());

        drive.root_path = "/elsewhere".into();
        let err = drive.ensure_consistent().unwrap_err();
        assert_eq!(err.kind, labtrack_core::ErrorKind::Configuration);

        let err = CreateStorageDrive::new("Local", "/data", local("/other"))
            .validate()
            .unwrap_err();
        assert_eq!(err.kind, labtrack_core::ErrorKind::Validation);
    }

    #[test]
    fn test_blank_name_rejected() {
        assert!(CreateStorageDrive::new("  ", "/data", local("/data"))
            .validate()
            .is_err());
    }
}
