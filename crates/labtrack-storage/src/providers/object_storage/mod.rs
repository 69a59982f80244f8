//! Object-storage backend.
//!
//! Folders do not exist natively: a folder is a zero-byte marker object
//! whose key ends with `/`, and a folder "exists" when its marker exists or
//! any key lives under its prefix. Backend paths are object keys relative
//! to the bucket; the drive's `root_path` is a key prefix (empty for the
//! whole bucket).

pub mod client;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use tracing::{debug, info, warn};

use labtrack_core::config::{ExistenceCheckPolicy, ObjectStorageBackendConfig};
use labtrack_core::{
    AppError, AppResult, ListingDepth, RelocationState, StorageFile, StorageFolder, path,
};
use labtrack_entity::{DriveType, StorageDrive, StorageDriveFolder};

use crate::backend::{
    StorageBackend, authorize_access, authorize_write, check_relocation_target, read_upload,
    upload_name,
};
use crate::cache::DriveClientCache;

pub use client::{ListPage, ObjectEntry, ObjectStoreClient, ObjectStoreConnector};
pub use memory::{MemoryObjectStore, MemoryObjectStoreConnector};
#[cfg(feature = "s3")]
pub use s3::{S3Connector, S3ObjectStoreClient};

/// Object-storage backend with one cached client per drive.
#[derive(Debug)]
pub struct ObjectStorageBackend {
    connector: Arc<dyn ObjectStoreConnector>,
    clients: DriveClientCache<dyn ObjectStoreClient>,
    existence_policy: ExistenceCheckPolicy,
    page_size: i32,
}

impl ObjectStorageBackend {
    /// Create a backend that connects drives through `connector`.
    pub fn new(
        connector: Arc<dyn ObjectStoreConnector>,
        config: &ObjectStorageBackendConfig,
        existence_policy: ExistenceCheckPolicy,
    ) -> Self {
        Self {
            connector,
            clients: DriveClientCache::new(),
            existence_policy,
            page_size: config.list_page_size,
        }
    }

    /// Number of drive clients currently cached.
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }

    async fn client(&self, drive: &StorageDrive) -> AppResult<Arc<dyn ObjectStoreClient>> {
        let details = drive.object_storage_details()?;
        self.clients
            .get_or_connect(drive, || self.connector.connect(drive, details))
            .await
    }

    fn root_prefix(drive: &StorageDrive) -> String {
        let cleaned = path::clean(Some(&drive.root_path));
        path::folder_path(path::strip_leading(&cleaned))
    }

    /// Resolve a backend path to a key under the drive's root prefix.
    fn key_for(drive: &StorageDrive, raw: &str) -> String {
        let cleaned = path::clean(Some(raw));
        let key = path::strip_leading(&cleaned);
        let root = Self::root_prefix(drive);
        if root.is_empty() || path::is_within(&root, key) {
            key.to_string()
        } else {
            path::join(&root, key)
        }
    }

    fn folder_key(drive: &StorageDrive, raw: &str) -> String {
        path::folder_path(&Self::key_for(drive, raw))
    }

    fn file_key(drive: &StorageDrive, raw: &str) -> String {
        path::file_path(&Self::key_for(drive, raw))
    }

    fn file_snapshot(entry: &ObjectEntry) -> StorageFile {
        StorageFile::new(&entry.key, entry.size)
            .with_id(entry.key.clone())
            .with_last_modified(entry.last_modified)
    }

    /// Every page of a listing, concatenated.
    async fn list_all(
        &self,
        client: &dyn ObjectStoreClient,
        prefix: &str,
        delimiter: Option<&str>,
    ) -> AppResult<ListPage> {
        let mut all = ListPage::default();
        let mut token = None;
        loop {
            let page = client
                .list_page(prefix, delimiter, token, self.page_size)
                .await?;
            all.objects.extend(page.objects);
            all.common_prefixes.extend(page.common_prefixes);
            match page.next_token {
                Some(next) => token = Some(next),
                None => break,
            }
        }
        Ok(all)
    }

    async fn prefix_in_use(&self, client: &dyn ObjectStoreClient, prefix: &str) -> AppResult<bool> {
        if prefix.is_empty() {
            return Ok(true);
        }
        if client.head_object(prefix).await?.is_some() {
            return Ok(true);
        }
        let page = client.list_page(prefix, None, None, 1).await?;
        Ok(!page.objects.is_empty() || !page.common_prefixes.is_empty())
    }

    fn shallow_tree(prefix: &str, listing: ListPage) -> Option<StorageFolder> {
        let mut folder = StorageFolder::new(prefix).with_id(prefix.to_string());
        let mut found = prefix.is_empty();
        for entry in listing.objects {
            if entry.key == prefix {
                folder = folder
                    .with_last_modified(entry.last_modified)
                    .with_version(entry.etag);
                found = true;
            } else {
                folder.files.push(Self::file_snapshot(&entry));
            }
        }
        for common in listing.common_prefixes {
            folder
                .subfolders
                .push(StorageFolder::new(&common).with_id(common.clone()));
        }
        found |= !folder.is_empty();
        found.then_some(folder)
    }

    fn deep_tree(prefix: &str, listing: ListPage) -> Option<StorageFolder> {
        let mut root = StorageFolder::new(prefix).with_id(prefix.to_string());
        let mut found = prefix.is_empty();
        for entry in listing.objects {
            let Some(rest) = entry.key.strip_prefix(prefix) else {
                continue;
            };
            found = true;
            if rest.is_empty() {
                root = root
                    .with_last_modified(entry.last_modified)
                    .with_version(entry.etag);
                continue;
            }
            let is_marker = rest.ends_with(path::DELIMITER);
            let segments: Vec<&str> = rest.split(path::DELIMITER).filter(|s| !s.is_empty()).collect();
            let folder_depth = if is_marker {
                segments.len()
            } else {
                segments.len() - 1
            };

            let mut current = &mut root;
            for segment in &segments[..folder_depth] {
                let child_path = path::folder_path(&path::join(&current.path, segment));
                let idx = match current.subfolders.iter().position(|f| f.path == child_path) {
                    Some(idx) => idx,
                    None => {
                        current
                            .subfolders
                            .push(StorageFolder::new(&child_path).with_id(child_path.clone()));
                        current.subfolders.len() - 1
                    }
                };
                current = &mut current.subfolders[idx];
            }
            if is_marker {
                current.last_modified = entry.last_modified;
                current.version = entry.etag;
            } else {
                current.files.push(Self::file_snapshot(&entry));
            }
        }
        found.then_some(root)
    }
}

#[async_trait]
impl StorageBackend for ObjectStorageBackend {
    fn kind(&self) -> DriveType {
        DriveType::ObjectStorage
    }

    fn existence_policy(&self) -> ExistenceCheckPolicy {
        self.existence_policy
    }

    async fn create_folder(
        &self,
        drive: &StorageDrive,
        parent_path: &str,
        name: &str,
    ) -> AppResult<StorageFolder> {
        let parent = Self::folder_key(drive, parent_path);
        let name = path::clean(Some(name));
        let name = path::strip_leading(&name).trim_end_matches(path::DELIMITER);
        if name.is_empty() {
            return Err(AppError::validation("Folder name cannot be empty"));
        }
        let key = path::folder_path(&path::join(&parent, name));
        let client = self.client(drive).await?;

        if let Some(marker) = client.head_object(&key).await? {
            debug!(bucket_key = %key, "Folder marker already present");
            return Ok(StorageFolder::new(&key)
                .with_id(key.clone())
                .with_last_modified(marker.last_modified)
                .with_version(marker.etag));
        }

        let etag = client.put_object(&key, Bytes::new()).await?;
        info!(drive_id = %drive.id, key = %key, "Created folder marker");
        Ok(StorageFolder::new(&key)
            .with_id(key.clone())
            .with_last_modified(Some(Utc::now()))
            .with_version(etag))
    }

    async fn list_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        depth: ListingDepth,
    ) -> AppResult<StorageFolder> {
        let prefix = Self::folder_key(drive, path);
        let client = self.client(drive).await?;

        let folder = match depth {
            ListingDepth::Shallow => {
                let listing = self.list_all(client.as_ref(), &prefix, Some("/")).await?;
                Self::shallow_tree(&prefix, listing)
            }
            ListingDepth::Recursive => {
                let listing = self.list_all(client.as_ref(), &prefix, None).await?;
                Self::deep_tree(&prefix, listing)
            }
        };
        let mut folder =
            folder.ok_or_else(|| AppError::not_found(format!("Folder '{prefix}' does not exist")))?;
        folder.sort_children();

        if prefix != Self::root_prefix(drive) {
            let parent = path::parent_of(&prefix);
            folder = folder.with_parent(StorageFolder::new(&parent).with_id(parent.clone()));
        }
        Ok(folder)
    }

    async fn find_file_by_path(&self, drive: &StorageDrive, path: &str) -> AppResult<StorageFile> {
        let key = Self::file_key(drive, path);
        if key.is_empty() {
            return Err(AppError::not_found("The bucket root is not a file"));
        }
        let client = self.client(drive).await?;
        client
            .head_object(&key)
            .await?
            .map(|entry| Self::file_snapshot(&entry))
            .ok_or_else(|| AppError::not_found(format!("File '{key}' does not exist")))
    }

    async fn save_file(
        &self,
        drive: &StorageDrive,
        binding: &StorageDriveFolder,
        folder_path: &str,
        local_file: &Path,
    ) -> AppResult<StorageFile> {
        binding.ensure_writable()?;
        let folder = Self::folder_key(drive, folder_path);
        authorize_write(binding, &folder)?;
        let name = upload_name(local_file)?;
        let data = read_upload(local_file).await?;

        let key = path::join(&folder, &name);
        let size = data.len() as u64;
        let client = self.client(drive).await?;
        client.put_object(&key, data).await?;

        info!(drive_id = %drive.id, key = %key, bytes = size, "Saved object");
        Ok(StorageFile::new(&key, size)
            .with_id(key.clone())
            .with_last_modified(Some(Utc::now())))
    }

    async fn fetch_file(
        &self,
        drive: &StorageDrive,
        binding: &StorageDriveFolder,
        path: &str,
    ) -> AppResult<Bytes> {
        let key = Self::file_key(drive, path);
        authorize_access(binding, &key)?;
        let client = self.client(drive).await?;
        client.get_object(&key).await
    }

    async fn relocate_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        destination_path: &str,
    ) -> AppResult<StorageFolder> {
        let source = Self::folder_key(drive, path);
        let destination = Self::folder_key(drive, destination_path);
        if source.is_empty() || source == Self::root_prefix(drive) {
            return Err(AppError::validation("The drive root cannot be relocated"));
        }
        check_relocation_target(&source, &destination)?;
        if source == destination {
            return self.find_folder_by_path(drive, &source).await;
        }

        let client = self.client(drive).await?;
        let keys: Vec<String> = self
            .list_all(client.as_ref(), &source, None)
            .await?
            .objects
            .into_iter()
            .map(|o| o.key)
            .collect();
        if keys.is_empty() {
            return Err(AppError::not_found(format!("Folder '{source}' does not exist")));
        }
        if self.prefix_in_use(client.as_ref(), &destination).await? {
            return Err(AppError::duplicate(format!("'{destination}' already exists")));
        }

        for (copied, key) in keys.iter().enumerate() {
            let target = format!("{destination}{}", &key[source.len()..]);
            if let Err(e) = client.copy_object(key, &target).await {
                let state = if copied == 0 {
                    RelocationState::SourceOnly
                } else {
                    RelocationState::Both
                };
                warn!(from = %source, to = %destination, copied, state = %state, "Folder copy failed");
                return Err(e.with_relocation(state));
            }
        }

        for key in &keys {
            if let Err(e) = client.delete_object(key).await {
                warn!(from = %source, to = %destination, key = %key, "Source cleanup failed");
                return Err(e.with_relocation(RelocationState::Both));
            }
        }

        info!(
            drive_id = %drive.id,
            from = %source,
            to = %destination,
            objects = keys.len(),
            "Relocated folder"
        );
        self.find_folder_by_path(drive, &destination).await
    }

    async fn probe_file(&self, drive: &StorageDrive, path: &str) -> AppResult<bool> {
        let key = Self::file_key(drive, path);
        if key.is_empty() {
            return Ok(false);
        }
        let client = self.client(drive).await?;
        Ok(client.head_object(&key).await?.is_some())
    }

    async fn probe_folder(&self, drive: &StorageDrive, path: &str) -> AppResult<bool> {
        let prefix = Self::folder_key(drive, path);
        let client = self.client(drive).await?;
        self.prefix_in_use(client.as_ref(), &prefix).await
    }

    async fn health_check(&self, drive: &StorageDrive) -> AppResult<bool> {
        let client = self.client(drive).await?;
        client.bucket_reachable().await
    }

    fn forget_drive(&self, drive: &StorageDrive) {
        self.clients.invalidate(&drive.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_core::ErrorKind;
    use labtrack_entity::{
        CreateStorageDrive, CreateStorageDriveFolder, DriveDetails, DriveFolderDetails,
        FolderOptions, ObjectStorageDriveDetails,
    };
    use uuid::Uuid;

    fn drive(bucket: &str) -> StorageDrive {
        CreateStorageDrive::new(
            "Bucket",
            "",
            DriveDetails::ObjectStorage(ObjectStorageDriveDetails {
                bucket: bucket.into(),
                region: "us-east-1".into(),
                endpoint: None,
                access_key_id: None,
                secret_access_key: None,
                force_path_style: false,
            }),
        )
        .into_drive(Uuid::new_v4(), Utc::now())
    }

    fn backend(
        connector: &Arc<MemoryObjectStoreConnector>,
        policy: ExistenceCheckPolicy,
    ) -> ObjectStorageBackend {
        let config = ObjectStorageBackendConfig {
            list_page_size: 2,
            ..ObjectStorageBackendConfig::default()
        };
        ObjectStorageBackend::new(connector.clone(), &config, policy)
    }

    fn binding(drive: &StorageDrive, key: &str) -> StorageDriveFolder {
        CreateStorageDriveFolder {
            drive_id: drive.id,
            path: key.into(),
            name: path::name_of(key),
            options: FolderOptions::entity_folder(),
            details: DriveFolderDetails::ObjectStorage {
                key: key.into(),
                etag: None,
            },
        }
        .into_folder(Uuid::new_v4(), Utc::now())
    }

    #[tokio::test]
    async fn test_create_writes_marker_idempotently() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let backend = backend(&connector, ExistenceCheckPolicy::Lenient);
        let drive = drive("bucket1");

        let folder = backend.create_folder(&drive, "", "teamA").await.unwrap();
        assert_eq!(folder.path, "teamA/");
        assert_eq!(connector.bucket("bucket1").keys().await, vec!["teamA/"]);

        let again = backend.create_folder(&drive, "", "teamA").await.unwrap();
        assert_eq!(again.path, folder.path);
        assert!(folder.version.is_some());
        assert_eq!(again.version, folder.version);

        let found = backend.find_folder_by_path(&drive, "teamA/").await.unwrap();
        assert!(found.is_empty());
        assert_eq!(found.version, folder.version);
    }

    #[tokio::test]
    async fn test_rename_moves_every_key() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let backend = backend(&connector, ExistenceCheckPolicy::Lenient);
        let drive = drive("bucket1");
        let store = connector.bucket("bucket1");

        backend.create_folder(&drive, "", "teamA").await.unwrap();
        for key in ["teamA/a.txt", "teamA/nested/b.txt", "teamA/nested/c.txt"] {
            store.put_object(key, Bytes::from_static(b"data")).await.unwrap();
        }

        let renamed = backend.rename_folder(&drive, "teamA/", "teamB").await.unwrap();
        assert_eq!(renamed.path, "teamB/");
        assert_eq!(renamed.files.len(), 1);
        assert_eq!(renamed.subfolders[0].path, "teamB/nested/");

        assert_eq!(
            store.keys().await,
            vec!["teamB/", "teamB/a.txt", "teamB/nested/b.txt", "teamB/nested/c.txt"]
        );
        let err = backend.find_folder_by_path(&drive, "teamA/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_failed_copy_reports_partial_state() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let backend = backend(&connector, ExistenceCheckPolicy::Lenient);
        let drive = drive("bucket1");
        let store = connector.bucket("bucket1");
        backend.create_folder(&drive, "", "teamA").await.unwrap();
        store.put_object("teamA/a.txt", Bytes::new()).await.unwrap();

        store.fail_copies_after(1);
        let err = backend.rename_folder(&drive, "teamA/", "teamB").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::WriteFailure);
        assert_eq!(err.relocation, Some(RelocationState::Both));
        assert!(backend.folder_exists(&drive, "teamA/").await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_cleanup_reports_both() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let backend = backend(&connector, ExistenceCheckPolicy::Lenient);
        let drive = drive("bucket1");
        let store = connector.bucket("bucket1");
        backend.create_folder(&drive, "", "teamA").await.unwrap();

        store.fail_deletes(true);
        let err = backend.rename_folder(&drive, "teamA/", "teamB").await.unwrap_err();
        assert_eq!(err.relocation, Some(RelocationState::Both));
        assert!(backend.folder_exists(&drive, "teamB/").await.unwrap());
    }

    #[tokio::test]
    async fn test_recursive_listing_and_prefix_folders() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let backend = backend(&connector, ExistenceCheckPolicy::Lenient);
        let drive = drive("bucket1");
        let store = connector.bucket("bucket1");
        for key in ["lab/x/1.csv", "lab/x/y/2.csv", "lab/3.csv", "lab/z/"] {
            store.put_object(key, Bytes::from_static(b"12")).await.unwrap();
        }

        // "lab/" has no marker but keys live under it.
        assert!(backend.folder_exists(&drive, "lab").await.unwrap());

        let shallow = backend.find_folder_by_path(&drive, "lab/").await.unwrap();
        let names: Vec<&str> = shallow.subfolders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["x", "z"]);
        assert_eq!(shallow.files.len(), 1);

        let deep = backend
            .list_folder(&drive, "lab/", ListingDepth::Recursive)
            .await
            .unwrap();
        assert_eq!(deep.subfolders[0].subfolders[0].path, "lab/x/y/");
        assert_eq!(deep.total_size(), 6);
    }

    #[tokio::test]
    async fn test_existence_policy_on_outage() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let drive = drive("bucket1");
        connector.bucket("bucket1").set_unreachable(true);

        let lenient = backend(&connector, ExistenceCheckPolicy::Lenient);
        assert!(!lenient.file_exists(&drive, "teamA/x.txt").await.unwrap());

        let strict = backend(&connector, ExistenceCheckPolicy::Strict);
        assert!(strict.folder_exists(&drive, "teamA/").await.is_err());
    }

    #[tokio::test]
    async fn test_save_and_fetch() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let backend = backend(&connector, ExistenceCheckPolicy::Lenient);
        let drive = drive("bucket1");
        backend.create_folder(&drive, "", "teamA").await.unwrap();

        let upload_dir = tempfile::tempdir().unwrap();
        let upload = upload_dir.path().join("run.fasta");
        std::fs::write(&upload, b">seq\nACGT").unwrap();

        let binding = binding(&drive, "teamA/");
        let saved = backend
            .save_file(&drive, &binding, "teamA/", &upload)
            .await
            .unwrap();
        assert_eq!(saved.path, "teamA/run.fasta");
        assert_eq!(saved.mime_type.as_deref(), Some("text/x-fasta"));

        let data = backend.fetch_file(&drive, &binding, &saved.path).await.unwrap();
        assert_eq!(&data[..], b">seq\nACGT");

        let file = backend.find_file_by_path(&drive, "teamA/run.fasta").await.unwrap();
        assert_eq!(file.size, 9);
        let err = backend.find_file_by_path(&drive, "teamA/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_client_reresolved_when_drive_changes() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let backend = backend(&connector, ExistenceCheckPolicy::Lenient);
        let mut drive = drive("bucket1");

        backend.folder_exists(&drive, "a/").await.unwrap();
        backend.folder_exists(&drive, "b/").await.unwrap();
        assert_eq!(connector.connect_count(), 1);

        drive.updated_at += chrono::Duration::seconds(5);
        backend.folder_exists(&drive, "a/").await.unwrap();
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(backend.cached_clients(), 1);
    }

    #[tokio::test]
    async fn test_forgotten_drive_reconnects() {
        let connector = Arc::new(MemoryObjectStoreConnector::new());
        let backend = Arc::new(backend(&connector, ExistenceCheckPolicy::Lenient));
        let dispatcher = crate::StorageDispatcher::builder()
            .object_storage(backend.clone())
            .build();
        let drive = drive("bucket1");

        backend.folder_exists(&drive, "a/").await.unwrap();
        dispatcher.forget_drive(&drive);
        assert_eq!(backend.cached_clients(), 0);

        backend.folder_exists(&drive, "a/").await.unwrap();
        assert_eq!(connector.connect_count(), 2);
    }
}
