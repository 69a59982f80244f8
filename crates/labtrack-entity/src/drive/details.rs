//! Backend-specific connection details for a drive.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use labtrack_core::{AppError, AppResult};

use super::kind::DriveType;

/// What the local backend does when asked to create a folder that exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistingFolderPolicy {
    /// Fail with `Duplicate`.
    #[default]
    Fail,
    /// Succeed without touching the existing folder.
    UseExisting,
    /// Delete the existing folder recursively, then recreate it.
    OverwriteExisting,
}

impl FromStr for ExistingFolderPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fail" | "" => Ok(Self::Fail),
            "use_existing" => Ok(Self::UseExisting),
            "overwrite_existing" => Ok(Self::OverwriteExisting),
            _ => Err(AppError::configuration(format!(
                "Unknown existing-folder policy '{s}'. Expected one of: fail, use_existing, overwrite_existing"
            ))),
        }
    }
}

/// Local filesystem drive details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalDriveDetails {
    /// Absolute root directory of the drive.
    pub root_path: String,
    /// Creation policy for folders that already exist.
    #[serde(default)]
    pub existing_folder_policy: ExistingFolderPolicy,
}

/// Object-storage drive details.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectStorageDriveDetails {
    /// Bucket name.
    pub bucket: String,
    /// Region.
    pub region: String,
    /// Custom endpoint URL for non-AWS services.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Static access key ID; `None` uses the ambient credential chain.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Static secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Use path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
}

impl fmt::Debug for ObjectStorageDriveDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStorageDriveDetails")
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "****"))
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

/// Document-API drive details.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentApiDriveDetails {
    /// Base URL of the API (e.g. `https://acme.example.com`).
    pub base_url: String,
    /// Tenant/domain name.
    pub tenant: String,
    /// Bearer token.
    pub api_token: String,
    /// Declared ID of the drive's root folder, once resolved.
    #[serde(default)]
    pub root_folder_id: Option<String>,
}

impl fmt::Debug for DocumentApiDriveDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentApiDriveDetails")
            .field("base_url", &self.base_url)
            .field("tenant", &self.tenant)
            .field("api_token", &"****")
            .field("root_folder_id", &self.root_folder_id)
            .finish()
    }
}

/// Connection details of a drive, one variant per [`DriveType`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriveDetails {
    /// Local filesystem.
    Local(LocalDriveDetails),
    /// Object storage.
    ObjectStorage(ObjectStorageDriveDetails),
    /// Document API.
    DocumentApi(DocumentApiDriveDetails),
}

impl DriveDetails {
    /// The drive kind these details belong to.
    pub fn drive_type(&self) -> DriveType {
        match self {
            Self::Local(_) => DriveType::Local,
            Self::ObjectStorage(_) => DriveType::ObjectStorage,
            Self::DocumentApi(_) => DriveType::DocumentApi,
        }
    }

    /// Check that every field the backend needs is present.
    pub fn validate(&self) -> AppResult<()> {
        match self {
            Self::Local(d) => {
                if d.root_path.trim().is_empty() {
                    return Err(AppError::configuration("Local drive requires a root path"));
                }
            }
            Self::ObjectStorage(d) => {
                if d.bucket.trim().is_empty() {
                    return Err(AppError::configuration(
                        "Object-storage drive requires a bucket",
                    ));
                }
                if d.region.trim().is_empty() {
                    return Err(AppError::configuration(
                        "Object-storage drive requires a region",
                    ));
                }
                if d.access_key_id.is_some() != d.secret_access_key.is_some() {
                    return Err(AppError::configuration(
                        "Object-storage credentials need both an access key ID and a secret",
                    ));
                }
            }
            Self::DocumentApi(d) => {
                if d.base_url.trim().is_empty() || d.api_token.trim().is_empty() {
                    return Err(AppError::configuration(
                        "Document-API drive requires a base URL and an API token",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_core::ErrorKind;

    #[test]
    fn test_details_are_tagged_by_kind() {
        let details = DriveDetails::ObjectStorage(ObjectStorageDriveDetails {
            bucket: "bucket1".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
        });
        let json = serde_json::to_value(&details).unwrap();
        assert_eq!(json["kind"], "object_storage");
        assert_eq!(details.drive_type(), DriveType::ObjectStorage);
    }

    #[test]
    fn test_incomplete_details_are_configuration_errors() {
        let details = DriveDetails::ObjectStorage(ObjectStorageDriveDetails {
            bucket: "bucket1".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key_id: Some("AKIA".into()),
            secret_access_key: None,
            force_path_style: false,
        });
        assert_eq!(details.validate().unwrap_err().kind, ErrorKind::Configuration);

        let local = DriveDetails::Local(LocalDriveDetails {
            root_path: " ".into(),
            existing_folder_policy: ExistingFolderPolicy::Fail,
        });
        assert!(local.validate().is_err());
    }

    #[test]
    fn test_debug_masks_secrets() {
        let details = DocumentApiDriveDetails {
            base_url: "https://acme.example.com".into(),
            tenant: "acme".into(),
            api_token: "very-secret".into(),
            root_folder_id: None,
        };
        assert!(!format!("{details:?}").contains("very-secret"));
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!(
            "use_existing".parse::<ExistingFolderPolicy>().unwrap(),
            ExistingFolderPolicy::UseExisting
        );
        assert!("merge".parse::<ExistingFolderPolicy>().is_err());
    }
}
