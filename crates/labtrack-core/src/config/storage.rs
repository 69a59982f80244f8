//! Storage backend and drive configuration.

use serde::{Deserialize, Serialize};

/// How `file_exists`/`folder_exists` treat backend errors.
///
/// `Lenient` answers `false` when the backend cannot be reached or refuses
/// the request, logging the failure at WARN. `Strict` propagates the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistenceCheckPolicy {
    /// Backend errors are logged and reported as "does not exist".
    #[default]
    Lenient,
    /// Backend errors are returned to the caller.
    Strict,
}

/// Top-level storage configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Existence-check error policy shared by every backend.
    #[serde(default)]
    pub existence_check: ExistenceCheckPolicy,
    /// Local filesystem backend settings.
    #[serde(default)]
    pub local: LocalBackendConfig,
    /// Object-storage backend settings.
    #[serde(default)]
    pub object_storage: ObjectStorageBackendConfig,
    /// Document-API backend settings.
    #[serde(default)]
    pub document_api: DocumentApiBackendConfig,
    /// Drives registered by the storage initializer at startup.
    #[serde(default)]
    pub drives: Vec<DriveSettings>,
}

/// Local filesystem backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalBackendConfig {
    /// Whether the local backend is registered with the dispatcher.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Object-storage backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectStorageBackendConfig {
    /// Whether the object-storage backend is registered with the dispatcher.
    #[serde(default)]
    pub enabled: bool,
    /// Region used when a drive does not name one.
    #[serde(default = "default_region")]
    pub default_region: String,
    /// Page size for prefix listings.
    #[serde(default = "default_list_page_size")]
    pub list_page_size: i32,
}

impl Default for ObjectStorageBackendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            default_region: default_region(),
            list_page_size: default_list_page_size(),
        }
    }
}

/// Document-API backend settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentApiBackendConfig {
    /// Whether the document-API backend is registered with the dispatcher.
    #[serde(default)]
    pub enabled: bool,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for DocumentApiBackendConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

/// A drive declared in configuration.
///
/// Fields that do not apply to `kind` are ignored. Missing fields that do
/// apply surface as configuration errors when the drive is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveSettings {
    /// Display name; also the identity used to make registration idempotent.
    pub name: String,
    /// Backend kind: `local`, `object_storage`, or `document_api`.
    pub kind: String,
    /// Root directory (local), bucket prefix (object storage), or tenant root path.
    #[serde(default)]
    pub root_path: String,
    /// Local: `fail`, `use_existing`, or `overwrite_existing`.
    #[serde(default)]
    pub existing_folder_policy: Option<String>,
    /// Object storage: bucket name.
    #[serde(default)]
    pub bucket: Option<String>,
    /// Object storage: region.
    #[serde(default)]
    pub region: Option<String>,
    /// Object storage: custom endpoint (MinIO and friends).
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Object storage: access key ID.
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Object storage: secret access key.
    #[serde(default)]
    pub secret_access_key: Option<String>,
    /// Object storage: use path-style addressing.
    #[serde(default)]
    pub force_path_style: bool,
    /// Document API: base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Document API: tenant/domain name.
    #[serde(default)]
    pub tenant: Option<String>,
    /// Document API: bearer token.
    #[serde(default)]
    pub api_token: Option<String>,
    /// Root folders to bind for this drive.
    #[serde(default)]
    pub root_folders: Vec<RootFolderSettings>,
}

/// A root folder binding declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootFolderSettings {
    /// Backend-native path of the folder.
    pub path: String,
    /// Display name.
    pub name: String,
    /// Whether files may be written.
    #[serde(default = "default_true")]
    pub write_enabled: bool,
    /// Whether contents may be deleted.
    #[serde(default)]
    pub delete_enabled: bool,
    /// Whether the folder is a browsing entry point.
    #[serde(default = "default_true")]
    pub browser_root: bool,
    /// Whether new study folders may be created under it.
    #[serde(default)]
    pub study_root: bool,
}

fn default_true() -> bool {
    true
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_list_page_size() -> i32 {
    1000
}

fn default_request_timeout() -> u64 {
    30
}
