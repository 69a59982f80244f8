//! Document-management API backend.
//!
//! Folders and files carry API-declared IDs; paths are absolute API paths
//! under the drive's root path. A relocation is a single move call, so a
//! failure is classified by looking both locations up afterwards.

pub mod client;
#[cfg(feature = "document-api")]
pub mod http;
pub mod memory;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::{info, warn};

use labtrack_core::config::ExistenceCheckPolicy;
use labtrack_core::{
    AppError, AppResult, ErrorKind, ListingDepth, RelocationState, StorageFile, StorageFolder,
    path,
};
use labtrack_entity::{DriveType, StorageDrive, StorageDriveFolder};

use crate::backend::{
    StorageBackend, authorize_access, authorize_write, check_relocation_target, read_upload,
    upload_name,
};
use crate::cache::DriveClientCache;

pub use client::{ApiItem, ApiItemKind, DocumentApiClient, DocumentApiConnector};
#[cfg(feature = "document-api")]
pub use http::{HttpDocumentApiClient, HttpDocumentApiConnector};
pub use memory::{MemoryDocumentApi, MemoryDocumentApiConnector, MoveFault};

/// Document-API backend with one cached client per drive.
#[derive(Debug)]
pub struct DocumentApiBackend {
    connector: Arc<dyn DocumentApiConnector>,
    clients: DriveClientCache<dyn DocumentApiClient>,
    existence_policy: ExistenceCheckPolicy,
}

impl DocumentApiBackend {
    /// Create a backend that connects drives through `connector`.
    pub fn new(
        connector: Arc<dyn DocumentApiConnector>,
        existence_policy: ExistenceCheckPolicy,
    ) -> Self {
        Self {
            connector,
            clients: DriveClientCache::new(),
            existence_policy,
        }
    }

    async fn client(&self, drive: &StorageDrive) -> AppResult<Arc<dyn DocumentApiClient>> {
        let details = drive.document_api_details()?;
        self.clients
            .get_or_connect(drive, || self.connector.connect(drive, details))
            .await
    }

    fn root(drive: &StorageDrive) -> String {
        path::normalize(&drive.root_path)
    }

    /// Resolve a backend path to an absolute API path under the drive root.
    fn resolve(drive: &StorageDrive, raw: &str) -> AppResult<String> {
        let root = Self::root(drive);
        let cleaned = path::clean(Some(raw));
        if cleaned.is_empty() || cleaned == "/" {
            return Ok(root);
        }
        if !cleaned.starts_with(path::DELIMITER) {
            return Ok(format!("{root}{cleaned}"));
        }
        if path::is_within(&root, &cleaned) {
            return Ok(cleaned);
        }
        Err(AppError::validation(format!(
            "'{raw}' lies outside the drive root '{root}'"
        )))
    }

    fn folder(drive: &StorageDrive, raw: &str) -> AppResult<String> {
        Self::resolve(drive, raw).map(|p| path::folder_path(&p))
    }

    fn file(drive: &StorageDrive, raw: &str) -> AppResult<String> {
        Self::resolve(drive, raw).map(|p| path::file_path(&p))
    }

    /// Resolve a folder. The drive root must carry the pinned root folder ID
    /// when the drive declares one.
    async fn require_folder(
        drive: &StorageDrive,
        client: &dyn DocumentApiClient,
        folder: &str,
    ) -> AppResult<ApiItem> {
        let item = match client.lookup(folder).await? {
            Some(item) if item.is_folder() => item,
            Some(_) => return Err(AppError::not_found(format!("'{folder}' is a file"))),
            None => return Err(AppError::not_found(format!("Folder '{folder}' does not exist"))),
        };
        if path::compare(&item.path, &Self::root(drive)) {
            let details = drive.document_api_details()?;
            if let Some(pinned) = details.root_folder_id.as_deref() {
                if pinned != item.id {
                    return Err(AppError::configuration(format!(
                        "Drive root '{}' is folder '{}', expected '{pinned}'",
                        item.path, item.id
                    )));
                }
            }
        }
        Ok(item)
    }

    /// Whether anything exists at `target`, or `None` when the lookup failed.
    async fn observe(client: &dyn DocumentApiClient, target: &str) -> Option<bool> {
        match client.lookup(target).await {
            Ok(found) => Some(found.is_some()),
            Err(e) => {
                warn!(path = %target, error = %e, "Could not observe path after failed move");
                None
            }
        }
    }

    async fn require_file(client: &dyn DocumentApiClient, file: &str) -> AppResult<ApiItem> {
        match client.lookup(file).await? {
            Some(item) if !item.is_folder() => Ok(item),
            _ => Err(AppError::not_found(format!("File '{file}' does not exist"))),
        }
    }

    fn read_tree<'a>(
        client: &'a dyn DocumentApiClient,
        item: &'a ApiItem,
        depth: ListingDepth,
    ) -> BoxFuture<'a, AppResult<StorageFolder>> {
        Box::pin(async move {
            let mut folder = item.to_folder();
            for child in client.list_children(&item.id).await? {
                if !child.is_folder() {
                    folder.files.push(child.to_file());
                } else if depth == ListingDepth::Recursive {
                    let sub = Self::read_tree(client, &child, depth).await?;
                    folder.subfolders.push(sub);
                } else {
                    folder.subfolders.push(child.to_folder());
                }
            }
            Ok(folder)
        })
    }
}

#[async_trait]
impl StorageBackend for DocumentApiBackend {
    fn kind(&self) -> DriveType {
        DriveType::DocumentApi
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
        let parent = Self::folder(drive, parent_path)?;
        let name = path::clean(Some(name));
        let name = name.trim_matches(path::DELIMITER);
        if name.is_empty() {
            return Err(AppError::validation("Folder name cannot be empty"));
        }
        let client = self.client(drive).await?;

        let mut current = Self::require_folder(drive, client.as_ref(), &parent).await?;
        for segment in name.split(path::DELIMITER).filter(|s| !s.is_empty()) {
            let child_path = path::folder_path(&path::join(&current.path, segment));
            current = match client.lookup(&child_path).await? {
                Some(item) if item.is_folder() => item,
                Some(_) => {
                    return Err(AppError::duplicate(format!(
                        "A file named '{segment}' already exists in '{}'",
                        current.path
                    )));
                }
                None => match client.create_folder(&current.id, segment).await {
                    Ok(item) => {
                        info!(drive_id = %drive.id, path = %item.path, folder_id = %item.id, "Created folder");
                        item
                    }
                    // Created concurrently between lookup and create.
                    Err(e) if e.is(ErrorKind::Duplicate) => {
                        Self::require_folder(drive, client.as_ref(), &child_path).await?
                    }
                    Err(e) => return Err(e),
                },
            };
        }
        Ok(current.to_folder())
    }

    async fn list_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        depth: ListingDepth,
    ) -> AppResult<StorageFolder> {
        let target = Self::folder(drive, path)?;
        let client = self.client(drive).await?;
        let item = Self::require_folder(drive, client.as_ref(), &target).await?;

        let mut folder = Self::read_tree(client.as_ref(), &item, depth).await?;
        folder.sort_children();

        if !path::compare(&item.path, &Self::root(drive)) {
            if let Some(parent) = client.lookup(&path::parent_of(&item.path)).await? {
                folder = folder.with_parent(parent.to_folder());
            }
        }
        Ok(folder)
    }

    async fn find_file_by_path(&self, drive: &StorageDrive, path: &str) -> AppResult<StorageFile> {
        let target = Self::file(drive, path)?;
        let client = self.client(drive).await?;
        Self::require_file(client.as_ref(), &target)
            .await
            .map(|item| item.to_file())
    }

    async fn save_file(
        &self,
        drive: &StorageDrive,
        binding: &StorageDriveFolder,
        folder_path: &str,
        local_file: &Path,
    ) -> AppResult<StorageFile> {
        binding.ensure_writable()?;
        let target = Self::folder(drive, folder_path)?;
        authorize_write(binding, &target)?;
        let name = upload_name(local_file)?;
        let data = read_upload(local_file).await?;

        let client = self.client(drive).await?;
        let folder = Self::require_folder(drive, client.as_ref(), &target).await?;
        let size = data.len();
        let item = client.upload_file(&folder.id, &name, data).await?;

        info!(drive_id = %drive.id, path = %item.path, file_id = %item.id, bytes = size, "Uploaded file");
        Ok(item.to_file())
    }

    async fn fetch_file(
        &self,
        drive: &StorageDrive,
        binding: &StorageDriveFolder,
        path: &str,
    ) -> AppResult<Bytes> {
        let target = Self::file(drive, path)?;
        authorize_access(binding, &target)?;
        let client = self.client(drive).await?;
        let item = Self::require_file(client.as_ref(), &target).await?;
        client.download_file(&item.id).await
    }

    async fn relocate_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        destination_path: &str,
    ) -> AppResult<StorageFolder> {
        let source = Self::folder(drive, path)?;
        let destination = Self::folder(drive, destination_path)?;
        if path::compare(&source, &Self::root(drive)) {
            return Err(AppError::validation("The drive root cannot be relocated"));
        }
        check_relocation_target(&source, &destination)?;

        let client = self.client(drive).await?;
        let item = Self::require_folder(drive, client.as_ref(), &source).await?;
        if source == destination {
            return self.find_folder_by_path(drive, &source).await;
        }
        match client.lookup(&destination).await? {
            Some(existing) if existing.id != item.id => {
                return Err(AppError::duplicate(format!("'{destination}' already exists")));
            }
            _ => {}
        }
        let parent = Self::require_folder(drive, client.as_ref(), &path::parent_of(&destination)).await?;
        let new_name = path::name_of(&destination);

        match client.move_item(&item.id, &parent.id, &new_name).await {
            Ok(moved) => {
                info!(
                    drive_id = %drive.id,
                    folder_id = %moved.id,
                    from = %source,
                    to = %moved.path,
                    "Relocated folder"
                );
                self.find_folder_by_path(drive, &moved.path).await
            }
            Err(e) => {
                let source_exists = Self::observe(client.as_ref(), &source).await;
                let destination_exists = Self::observe(client.as_ref(), &destination).await;
                // Unobservable sides count as present.
                let state = RelocationState::observed(
                    source_exists.unwrap_or(true),
                    destination_exists.unwrap_or(true),
                );
                warn!(from = %source, to = %destination, state = %state, error = %e, "Folder move failed");
                Err(e.with_relocation(state))
            }
        }
    }

    async fn probe_file(&self, drive: &StorageDrive, path: &str) -> AppResult<bool> {
        let target = Self::file(drive, path)?;
        let client = self.client(drive).await?;
        Ok(client.lookup(&target).await?.is_some_and(|i| !i.is_folder()))
    }

    async fn probe_folder(&self, drive: &StorageDrive, path: &str) -> AppResult<bool> {
        let target = Self::folder(drive, path)?;
        let client = self.client(drive).await?;
        Ok(client.lookup(&target).await?.is_some_and(|i| i.is_folder()))
    }

    async fn health_check(&self, drive: &StorageDrive) -> AppResult<bool> {
        let client = self.client(drive).await?;
        client.ping().await
    }

    fn forget_drive(&self, drive: &StorageDrive) {
        self.clients.invalidate(&drive.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use labtrack_entity::{
        CreateStorageDrive, CreateStorageDriveFolder, DocumentApiDriveDetails, DriveDetails,
        DriveFolderDetails, FolderOptions,
    };
    use uuid::Uuid;

    fn drive(root: &str) -> StorageDrive {
        CreateStorageDrive::new(
            "Docs",
            root,
            DriveDetails::DocumentApi(DocumentApiDriveDetails {
                base_url: "https://docs.example.com".into(),
                tenant: "acme".into(),
                api_token: "token".into(),
                root_folder_id: None,
            }),
        )
        .into_drive(Uuid::new_v4(), Utc::now())
    }

    fn setup() -> (Arc<MemoryDocumentApiConnector>, DocumentApiBackend) {
        let connector = Arc::new(MemoryDocumentApiConnector::new());
        let backend = DocumentApiBackend::new(connector.clone(), ExistenceCheckPolicy::Lenient);
        (connector, backend)
    }

    fn binding(folder: &StorageFolder, options: FolderOptions) -> StorageDriveFolder {
        CreateStorageDriveFolder {
            drive_id: Uuid::new_v4(),
            path: folder.path.clone(),
            name: folder.name.clone(),
            options,
            details: DriveFolderDetails::from_folder(DriveType::DocumentApi, folder),
        }
        .into_folder(Uuid::new_v4(), Utc::now())
    }

    #[tokio::test]
    async fn test_create_nested_is_idempotent() {
        let (_, backend) = setup();
        let drive = drive("");

        let created = backend
            .create_folder(&drive, "/", "Studies/ST-001")
            .await
            .unwrap();
        assert_eq!(created.path, "/Studies/ST-001/");
        assert!(created.id.is_some());

        let again = backend
            .create_folder(&drive, "", "Studies/ST-001")
            .await
            .unwrap();
        assert_eq!(again.id, created.id);

        let listed = backend.find_folder_by_path(&drive, "/Studies/").await.unwrap();
        assert_eq!(listed.subfolders.len(), 1);
        assert_eq!(listed.parent.unwrap().path, "/");
    }

    #[tokio::test]
    async fn test_paths_are_scoped_to_root() {
        let (connector, backend) = setup();
        let api = connector.tenant("acme");
        let root = api.lookup("/").await.unwrap().unwrap();
        api.create_folder(&root.id, "Shared").await.unwrap();
        let drive = drive("/Shared");

        let created = backend.create_folder(&drive, "", "Programs").await.unwrap();
        assert_eq!(created.path, "/Shared/Programs/");
        assert!(backend.folder_exists(&drive, "Programs").await.unwrap());

        let err = backend.find_folder_by_path(&drive, "/Other/").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        let err = backend
            .relocate_folder(&drive, "/Shared/", "/Shared/X/")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_save_fetch_and_privileges() {
        let (_, backend) = setup();
        let drive = drive("");
        let folder = backend.create_folder(&drive, "", "ST-001").await.unwrap();

        let upload_dir = tempfile::tempdir().unwrap();
        let upload = upload_dir.path().join("plate.csv");
        std::fs::write(&upload, b"well,value\nA1,0.5\n").unwrap();

        let writable = binding(&folder, FolderOptions::entity_folder());
        let saved = backend
            .save_file(&drive, &writable, &folder.path, &upload)
            .await
            .unwrap();
        assert_eq!(saved.path, "/ST-001/plate.csv");
        let data = backend.fetch_file(&drive, &writable, &saved.path).await.unwrap();
        assert_eq!(data.len(), 18);

        let read_only = binding(
            &folder,
            FolderOptions {
                write_enabled: false,
                ..FolderOptions::entity_folder()
            },
        );
        let err = backend
            .save_file(&drive, &read_only, &folder.path, &upload)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientPrivileges);

        let err = backend
            .fetch_file(&drive, &writable, "/Elsewhere/plate.csv")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientPrivileges);
    }

    #[tokio::test]
    async fn test_rename_keeps_identity() {
        let (_, backend) = setup();
        let drive = drive("");
        let folder = backend.create_folder(&drive, "", "teamA").await.unwrap();
        backend.create_folder(&drive, "", "archive").await.unwrap();

        let renamed = backend.rename_folder(&drive, "/teamA/", "teamB").await.unwrap();
        assert_eq!(renamed.path, "/teamB/");
        assert_eq!(renamed.id, folder.id);

        let moved = backend.move_folder(&drive, "/teamB/", "/archive/").await.unwrap();
        assert_eq!(moved.path, "/archive/teamB/");
        assert!(!backend.folder_exists(&drive, "/teamB/").await.unwrap());

        let unchanged = backend.rename_folder(&drive, "/archive/", "archive").await.unwrap();
        assert_eq!(unchanged.subfolders.len(), 1);
    }

    #[tokio::test]
    async fn test_failed_moves_report_observed_state() {
        let (connector, backend) = setup();
        let drive = drive("");
        backend.create_folder(&drive, "", "teamA").await.unwrap();
        let api = connector.tenant("acme");

        api.set_move_fault(MoveFault::Reject).await;
        let err = backend.rename_folder(&drive, "/teamA/", "teamB").await.unwrap_err();
        assert_eq!(err.relocation, Some(RelocationState::SourceOnly));

        api.set_move_fault(MoveFault::LoseResponse).await;
        let err = backend.rename_folder(&drive, "/teamA/", "teamB").await.unwrap_err();
        assert_eq!(err.relocation, Some(RelocationState::DestinationOnly));
        assert!(backend.folder_exists(&drive, "/teamB/").await.unwrap());
    }

    #[tokio::test]
    async fn test_unobservable_move_is_not_reported_as_done() {
        let (connector, backend) = setup();
        let drive = drive("");
        backend.create_folder(&drive, "", "teamA").await.unwrap();
        let api = connector.tenant("acme");

        api.set_move_fault(MoveFault::Outage).await;
        let err = backend.rename_folder(&drive, "/teamA/", "teamB").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::WriteFailure);
        assert_eq!(err.relocation, Some(RelocationState::Both));
    }

    #[tokio::test]
    async fn test_pinned_root_folder_id() {
        let (connector, backend) = setup();
        let api = connector.tenant("acme");
        let root = api.lookup("/").await.unwrap().unwrap();
        let shared = api.create_folder(&root.id, "Shared").await.unwrap();

        let mut pinned = drive("/Shared");
        if let DriveDetails::DocumentApi(details) = &mut pinned.details {
            details.root_folder_id = Some(shared.id.clone());
        }
        let created = backend.create_folder(&pinned, "", "Programs").await.unwrap();
        assert_eq!(created.path, "/Shared/Programs/");

        let mut stale = drive("/Shared");
        if let DriveDetails::DocumentApi(details) = &mut stale.details {
            details.root_folder_id = Some("item-999".into());
        }
        let err = backend.find_folder_by_path(&stale, "").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
        let err = backend.create_folder(&stale, "", "Programs").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[tokio::test]
    async fn test_recursive_listing() {
        let (_, backend) = setup();
        let drive = drive("");
        backend.create_folder(&drive, "", "P1/S1/A1").await.unwrap();
        backend.create_folder(&drive, "", "P1/S2").await.unwrap();

        let tree = backend
            .list_folder(&drive, "/P1/", ListingDepth::Recursive)
            .await
            .unwrap();
        let names: Vec<&str> = tree.subfolders.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["S1", "S2"]);
        assert_eq!(tree.subfolders[0].subfolders[0].path, "/P1/S1/A1/");

        let shallow = backend.find_folder_by_path(&drive, "/P1/").await.unwrap();
        assert!(shallow.subfolders[0].is_empty());
    }

    #[tokio::test]
    async fn test_outage_is_absent_under_lenient_policy() {
        let (connector, backend) = setup();
        let drive = drive("");
        connector.tenant("acme").set_unreachable(true).await;

        assert!(!backend.folder_exists(&drive, "/teamA/").await.unwrap());
        assert!(!backend.health_check(&drive).await.unwrap());
    }
}
