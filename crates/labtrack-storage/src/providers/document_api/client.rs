//! Document-management API client seam.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use labtrack_core::{AppResult, StorageFile, StorageFolder};
use labtrack_entity::{DocumentApiDriveDetails, StorageDrive};

/// Whether an API item is a folder or a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiItemKind {
    /// A folder.
    Folder,
    /// A file.
    File,
}

/// A folder or file as declared by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiItem {
    /// API-declared identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Absolute API path; folders end with `/`.
    pub path: String,
    /// Folder or file.
    #[serde(rename = "type")]
    pub kind: ApiItemKind,
    /// File size in bytes (zero for folders).
    #[serde(default)]
    pub size: u64,
    /// Last modification time.
    #[serde(default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// Web URL for humans.
    #[serde(default)]
    pub url: Option<String>,
}

impl ApiItem {
    /// Whether the item is a folder.
    pub fn is_folder(&self) -> bool {
        self.kind == ApiItemKind::Folder
    }

    /// Childless folder snapshot of this item.
    pub fn to_folder(&self) -> StorageFolder {
        StorageFolder::new(&self.path)
            .with_id(self.id.clone())
            .with_last_modified(self.last_modified)
            .with_url(self.url.clone())
    }

    /// File snapshot of this item.
    pub fn to_file(&self) -> StorageFile {
        StorageFile::new(&self.path, self.size)
            .with_id(self.id.clone())
            .with_last_modified(self.last_modified)
            .with_url(self.url.clone())
    }
}

/// The operations the backend needs from a document-management API.
///
/// Missing items are `Ok(None)` for `lookup`; every other call reports them
/// as `NotFound`. Creating a folder whose name is taken is `Duplicate`.
#[async_trait]
pub trait DocumentApiClient: Send + Sync + Debug + 'static {
    /// Resolve an absolute API path to an item.
    async fn lookup(&self, path: &str) -> AppResult<Option<ApiItem>>;

    /// Immediate children of a folder.
    async fn list_children(&self, folder_id: &str) -> AppResult<Vec<ApiItem>>;

    /// Create a folder named `name` under `parent_id`.
    async fn create_folder(&self, parent_id: &str, name: &str) -> AppResult<ApiItem>;

    /// Upload a file into a folder, replacing a file of the same name.
    async fn upload_file(&self, folder_id: &str, name: &str, data: Bytes) -> AppResult<ApiItem>;

    /// Download a file's content.
    async fn download_file(&self, file_id: &str) -> AppResult<Bytes>;

    /// Move an item under `new_parent_id` as `new_name`.
    async fn move_item(&self, item_id: &str, new_parent_id: &str, new_name: &str)
    -> AppResult<ApiItem>;

    /// Whether the API answers with the configured credentials.
    async fn ping(&self) -> AppResult<bool>;
}

/// Builds a client for a drive from its details.
#[async_trait]
pub trait DocumentApiConnector: Send + Sync + Debug + 'static {
    /// Connect to the drive's tenant.
    async fn connect(
        &self,
        drive: &StorageDrive,
        details: &DocumentApiDriveDetails,
    ) -> AppResult<Arc<dyn DocumentApiClient>>;
}
