//! Object-store client seam.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use labtrack_core::AppResult;
use labtrack_entity::{ObjectStorageDriveDetails, StorageDrive};

/// One object as reported by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub last_modified: Option<DateTime<Utc>>,
    /// Entity tag.
    pub etag: Option<String>,
}

/// One page of a prefix listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    /// Objects directly matched by the listing.
    pub objects: Vec<ObjectEntry>,
    /// Grouped prefixes when a delimiter was given.
    pub common_prefixes: Vec<String>,
    /// Token for the next page, if the listing was truncated.
    pub next_token: Option<String>,
}

/// The primitive operations of an S3-compatible bucket.
///
/// Implementations map their transport errors into `AppError`; a missing
/// key is `Ok(None)` for `head_object` and `NotFound` for `get_object`.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync + Debug + 'static {
    /// Write an object, returning its ETag.
    async fn put_object(&self, key: &str, body: Bytes) -> AppResult<Option<String>>;

    /// Object metadata, or `None` if the key does not exist.
    async fn head_object(&self, key: &str) -> AppResult<Option<ObjectEntry>>;

    /// Object content.
    async fn get_object(&self, key: &str) -> AppResult<Bytes>;

    /// One page of keys under `prefix`, grouped by `delimiter` when given.
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
        page_size: i32,
    ) -> AppResult<ListPage>;

    /// Server-side copy within the bucket.
    async fn copy_object(&self, source_key: &str, destination_key: &str) -> AppResult<()>;

    /// Delete an object. Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> AppResult<()>;

    /// Whether the bucket is reachable with the configured credentials.
    async fn bucket_reachable(&self) -> AppResult<bool>;
}

/// Builds a client for a drive from its details.
#[async_trait]
pub trait ObjectStoreConnector: Send + Sync + Debug + 'static {
    /// Connect to the drive's bucket.
    async fn connect(
        &self,
        drive: &StorageDrive,
        details: &ObjectStorageDriveDetails,
    ) -> AppResult<Arc<dyn ObjectStoreClient>>;
}
