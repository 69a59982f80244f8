//! Storage backend kind enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The kind of backend a drive lives on.
///
/// This is a closed set: adding a kind forces every `match` over it (the
/// dispatcher, the details sub-records) to be updated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "storage_drive_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DriveType {
    /// Real directories on a local or mounted filesystem.
    Local,
    /// S3-compatible object storage with marker-object folders.
    ObjectStorage,
    /// A remote document-management REST API.
    DocumentApi,
}

impl DriveType {
    /// Every supported kind.
    pub const ALL: [DriveType; 3] = [Self::Local, Self::ObjectStorage, Self::DocumentApi];

    /// Return the kind as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::ObjectStorage => "object_storage",
            Self::DocumentApi => "document_api",
        }
    }
}

impl fmt::Display for DriveType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DriveType {
    type Err = labtrack_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "object_storage" | "s3" => Ok(Self::ObjectStorage),
            "document_api" => Ok(Self::DocumentApi),
            _ => Err(labtrack_core::AppError::configuration(format!(
                "Unknown storage drive type: '{s}'. Expected one of: local, object_storage, document_api"
            ))),
        }
    }
}
