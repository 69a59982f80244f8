//! Backend-specific details cached on a folder binding.

use serde::{Deserialize, Serialize};

use labtrack_core::StorageFolder;

use crate::drive::DriveType;

/// Backend-specific details of a bound folder, one variant per [`DriveType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriveFolderDetails {
    /// Local directories need nothing beyond the path.
    Local,
    /// Object-storage marker key and its last known ETag.
    ObjectStorage {
        /// Marker object key.
        key: String,
        /// ETag of the marker when the binding was last written.
        #[serde(default)]
        etag: Option<String>,
    },
    /// Document-API declared folder ID.
    DocumentApi {
        /// Folder ID declared by the API.
        folder_id: String,
        /// Web URL of the folder.
        #[serde(default)]
        url: Option<String>,
    },
}

impl DriveFolderDetails {
    /// The drive kind these details belong to.
    pub fn drive_type(&self) -> DriveType {
        match self {
            Self::Local => DriveType::Local,
            Self::ObjectStorage { .. } => DriveType::ObjectStorage,
            Self::DocumentApi { .. } => DriveType::DocumentApi,
        }
    }

    /// Derive binding details from a live snapshot returned by a backend.
    pub fn from_folder(drive_type: DriveType, folder: &StorageFolder) -> Self {
        match drive_type {
            DriveType::Local => Self::Local,
            DriveType::ObjectStorage => Self::ObjectStorage {
                key: folder.id.clone().unwrap_or_else(|| folder.path.clone()),
                etag: folder.version.clone(),
            },
            DriveType::DocumentApi => Self::DocumentApi {
                folder_id: folder.id.clone().unwrap_or_default(),
                url: folder.url.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_folder_uses_backend_identity() {
        let folder = StorageFolder::new("/Shared/Studies/ST-001/")
            .with_id("f-123")
            .with_url(Some("https://acme.example.com/nav/f-123".into()));
        let details = DriveFolderDetails::from_folder(DriveType::DocumentApi, &folder);
        assert_eq!(
            details,
            DriveFolderDetails::DocumentApi {
                folder_id: "f-123".into(),
                url: Some("https://acme.example.com/nav/f-123".into()),
            }
        );

        let marker = StorageFolder::new("teamA/").with_version(Some("\"v1\"".into()));
        let details = DriveFolderDetails::from_folder(DriveType::ObjectStorage, &marker);
        assert_eq!(details.drive_type(), DriveType::ObjectStorage);
        assert_eq!(
            details,
            DriveFolderDetails::ObjectStorage {
                key: "teamA/".into(),
                etag: Some("\"v1\"".into()),
            }
        );
    }
}
