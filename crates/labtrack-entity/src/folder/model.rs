//! Folder binding entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use labtrack_core::{AppError, AppResult, path};

use super::details::DriveFolderDetails;

/// A persisted binding between a location inside a drive and its
/// application use.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StorageDriveFolder {
    /// Unique binding identifier.
    pub id: Uuid,
    /// The drive this folder lives on.
    pub drive_id: Uuid,
    /// Backend-native folder path, unique within the drive.
    pub path: String,
    /// Display name.
    pub name: String,
    /// Whether files may be written into the folder.
    pub write_enabled: bool,
    /// Whether contents may be deleted.
    pub delete_enabled: bool,
    /// Whether the folder is a top-level entry point for browsing.
    pub browser_root: bool,
    /// Whether new study folders may be created under it.
    pub study_root: bool,
    /// Backend-specific details.
    #[sqlx(json)]
    pub details: DriveFolderDetails,
    /// When the binding was created.
    pub created_at: DateTime<Utc>,
    /// When the binding was last updated.
    pub updated_at: DateTime<Utc>,
}

impl StorageDriveFolder {
    /// The binding's permission and role flags.
    pub fn options(&self) -> FolderOptions {
        FolderOptions {
            write_enabled: self.write_enabled,
            delete_enabled: self.delete_enabled,
            browser_root: self.browser_root,
            study_root: self.study_root,
        }
    }

    /// Whether a backend path lies inside this binding.
    pub fn contains(&self, other: &str) -> bool {
        path::is_within(&self.path, other)
    }

    /// Fail with `InsufficientPrivileges` unless files may be written here.
    pub fn ensure_writable(&self) -> AppResult<()> {
        if !self.write_enabled {
            return Err(AppError::insufficient_privileges(format!(
                "Folder '{}' does not allow writes",
                self.path
            )));
        }
        Ok(())
    }
}

/// Permission and role flags of a folder binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderOptions {
    /// Whether files may be written.
    pub write_enabled: bool,
    /// Whether contents may be deleted.
    pub delete_enabled: bool,
    /// Whether the folder is a browsing entry point.
    pub browser_root: bool,
    /// Whether new study folders may be created under it.
    pub study_root: bool,
}

impl FolderOptions {
    /// Flags for a folder bound to a program, study, or assay.
    pub fn entity_folder() -> Self {
        Self {
            write_enabled: true,
            delete_enabled: false,
            browser_root: false,
            study_root: false,
        }
    }

    /// Flags for a browsing root.
    pub fn browser_root() -> Self {
        Self {
            write_enabled: true,
            delete_enabled: false,
            browser_root: true,
            study_root: false,
        }
    }

    /// Flags for a root that can host new study folders.
    pub fn study_root() -> Self {
        Self {
            study_root: true,
            ..Self::browser_root()
        }
    }

    /// Flags of a deactivated binding: read-only, no root roles.
    pub fn deactivated() -> Self {
        Self {
            write_enabled: false,
            delete_enabled: false,
            browser_root: false,
            study_root: false,
        }
    }

    /// A study root must also be a browser root.
    pub fn validate(&self) -> AppResult<()> {
        if self.study_root && !self.browser_root {
            return Err(AppError::validation(
                "A study root folder must also be a browser root",
            ));
        }
        Ok(())
    }
}

impl Default for FolderOptions {
    fn default() -> Self {
        Self::entity_folder()
    }
}

/// Data required to create a folder binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStorageDriveFolder {
    /// The drive.
    pub drive_id: Uuid,
    /// Backend-native folder path.
    pub path: String,
    /// Display name.
    pub name: String,
    /// Flags.
    pub options: FolderOptions,
    /// Backend-specific details.
    pub details: DriveFolderDetails,
}

impl CreateStorageDriveFolder {
    /// Validate the binding data.
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() {
            return Err(AppError::validation("Folder name cannot be empty"));
        }
        self.options.validate()
    }

    /// Build the binding row this data would produce.
    pub fn into_folder(self, id: Uuid, now: DateTime<Utc>) -> StorageDriveFolder {
        StorageDriveFolder {
            id,
            drive_id: self.drive_id,
            path: self.path,
            name: self.name,
            write_enabled: self.options.write_enabled,
            delete_enabled: self.options.delete_enabled,
            browser_root: self.options.browser_root,
            study_root: self.options.study_root,
            details: self.details,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_core::ErrorKind;

    fn binding(write_enabled: bool) -> StorageDriveFolder {
        CreateStorageDriveFolder {
            drive_id: Uuid::new_v4(),
            path: "/data/Acme/".into(),
            name: "Acme".into(),
            options: FolderOptions {
                write_enabled,
                ..FolderOptions::entity_folder()
            },
            details: DriveFolderDetails::Local,
        }
        .into_folder(Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_study_root_requires_browser_root() {
        let opts = FolderOptions {
            study_root: true,
            browser_root: false,
            ..FolderOptions::entity_folder()
        };
        assert_eq!(opts.validate().unwrap_err().kind, ErrorKind::Validation);
        assert!(FolderOptions::study_root().validate().is_ok());
    }

    #[test]
    fn test_ensure_writable() {
        assert!(binding(true).ensure_writable().is_ok());
        assert_eq!(
            binding(false).ensure_writable().unwrap_err().kind,
            ErrorKind::InsufficientPrivileges
        );
    }

    #[test]
    fn test_contains() {
        let folder = binding(true);
        assert!(folder.contains("/data/Acme/ProjectX/"));
        assert!(!folder.contains("/data/Other/"));
    }
}
