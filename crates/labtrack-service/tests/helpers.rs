//! Test helpers for service integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tempfile::TempDir;
use uuid::Uuid;

use labtrack_core::config::{ExistenceCheckPolicy, ObjectStorageBackendConfig};
use labtrack_core::{AppError, AppResult, ListingDepth, StorageFile, StorageFolder, path};
use labtrack_database::{
    EntityFolderLinkRepository, MemoryEntityFolderLinkRepository,
    MemoryStorageDriveFolderRepository, MemoryStorageDriveRepository,
    StorageDriveFolderRepository, StorageDriveRepository,
};
use labtrack_entity::{
    CreateStorageDrive, DriveDetails, DriveType, EntityFolderLink, EntityRef,
    ExistingFolderPolicy, FolderOptions, LocalDriveDetails, ObjectStorageDriveDetails,
    StorageDrive, StorageDriveFolder,
};
use labtrack_service::{DriveService, FolderBindingService, StorageInitializer};
use labtrack_storage::providers::object_storage::MemoryObjectStoreConnector;
use labtrack_storage::{
    LocalStorageBackend, ObjectStorageBackend, StorageBackend, StorageDispatcher,
};

/// Services wired to in-memory repositories, a temporary local root, and an
/// in-memory object store.
pub struct TestApp {
    pub drives: DriveService,
    pub bindings: FolderBindingService,
    pub initializer: StorageInitializer,
    pub object_store: Arc<MemoryObjectStoreConnector>,
    pub folder_repo: Arc<dyn StorageDriveFolderRepository>,
    pub workspace: TempDir,
}

impl TestApp {
    /// Local and object-storage backends, lenient existence checks.
    pub fn new() -> Self {
        Self::with_local_backend(Arc::new(LocalStorageBackend::new(
            ExistenceCheckPolicy::Lenient,
        )))
    }

    /// Like [`TestApp::new`], with `backend` serving local drives.
    pub fn with_local_backend(backend: Arc<dyn StorageBackend>) -> Self {
        Self::build(backend, Arc::new(MemoryEntityFolderLinkRepository::new()))
    }

    /// Like [`TestApp::new`], with `link_repo` storing entity links.
    pub fn with_link_repository(link_repo: Arc<dyn EntityFolderLinkRepository>) -> Self {
        Self::build(
            Arc::new(LocalStorageBackend::new(ExistenceCheckPolicy::Lenient)),
            link_repo,
        )
    }

    fn build(
        backend: Arc<dyn StorageBackend>,
        link_repo: Arc<dyn EntityFolderLinkRepository>,
    ) -> Self {
        let drive_repo: Arc<dyn StorageDriveRepository> =
            Arc::new(MemoryStorageDriveRepository::new());
        let folder_repo: Arc<dyn StorageDriveFolderRepository> =
            Arc::new(MemoryStorageDriveFolderRepository::new());

        let object_store = Arc::new(MemoryObjectStoreConnector::new());
        let dispatcher = Arc::new(
            StorageDispatcher::builder()
                .local(backend)
                .object_storage(Arc::new(ObjectStorageBackend::new(
                    object_store.clone(),
                    &ObjectStorageBackendConfig::default(),
                    ExistenceCheckPolicy::Lenient,
                )))
                .build(),
        );

        let drives = DriveService::new(drive_repo.clone(), dispatcher.clone());
        let bindings = FolderBindingService::new(
            drive_repo,
            folder_repo.clone(),
            link_repo,
            dispatcher,
        );
        let initializer = StorageInitializer::new(drives.clone(), bindings.clone());

        Self {
            drives,
            bindings,
            initializer,
            object_store,
            folder_repo,
            workspace: tempfile::tempdir().expect("create workspace"),
        }
    }

    /// A directory under the workspace, created on demand.
    pub fn local_root(&self, name: &str) -> String {
        let dir = self.workspace.path().join(name);
        std::fs::create_dir_all(&dir).expect("create local root");
        dir.to_string_lossy().to_string()
    }

    /// Register a local drive rooted at a fresh workspace directory.
    pub async fn local_drive(&self, name: &str) -> StorageDrive {
        let root = self.local_root(name);
        self.drives
            .register(CreateStorageDrive::new(
                name,
                root.clone(),
                DriveDetails::Local(LocalDriveDetails {
                    root_path: root,
                    existing_folder_policy: ExistingFolderPolicy::Fail,
                }),
            ))
            .await
            .expect("register local drive")
    }

    /// Register an object-storage drive over an in-memory bucket.
    pub async fn object_drive(&self, name: &str, bucket: &str) -> StorageDrive {
        self.drives
            .register(CreateStorageDrive::new(
                name,
                "",
                DriveDetails::ObjectStorage(ObjectStorageDriveDetails {
                    bucket: bucket.into(),
                    region: "us-east-1".into(),
                    endpoint: None,
                    access_key_id: None,
                    secret_access_key: None,
                    force_path_style: false,
                }),
            ))
            .await
            .expect("register object drive")
    }

    /// Bind the root of a drive.
    pub async fn root_binding(
        &self,
        drive: &StorageDrive,
        options: FolderOptions,
    ) -> StorageDriveFolder {
        self.bindings
            .register_root_folder(drive.id, "", &drive.display_name, options)
            .await
            .expect("register root folder")
    }

    /// Write a local file to upload.
    pub fn upload(&self, name: &str, content: &[u8]) -> std::path::PathBuf {
        let dir = self.workspace.path().join("uploads");
        std::fs::create_dir_all(&dir).expect("create upload dir");
        let file = dir.join(name);
        std::fs::write(&file, content).expect("write upload");
        file
    }
}

/// Link repository whose next `failures` calls to `link` fail.
#[derive(Debug)]
pub struct FailingLinkRepository {
    inner: MemoryEntityFolderLinkRepository,
    failures: AtomicUsize,
}

impl FailingLinkRepository {
    pub fn new(failures: usize) -> Self {
        Self {
            inner: MemoryEntityFolderLinkRepository::new(),
            failures: AtomicUsize::new(failures),
        }
    }
}

#[async_trait]
impl EntityFolderLinkRepository for FailingLinkRepository {
    async fn link(
        &self,
        entity: EntityRef,
        folder_id: Uuid,
        primary: bool,
    ) -> AppResult<EntityFolderLink> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(AppError::database("connection reset"));
        }
        self.inner.link(entity, folder_id, primary).await
    }

    async fn find_by_entity(&self, entity: EntityRef) -> AppResult<Vec<EntityFolderLink>> {
        self.inner.find_by_entity(entity).await
    }

    async fn find_primary(&self, entity: EntityRef) -> AppResult<Option<EntityFolderLink>> {
        self.inner.find_primary(entity).await
    }

    async fn find_by_folder(&self, folder_id: Uuid) -> AppResult<Vec<EntityFolderLink>> {
        self.inner.find_by_folder(folder_id).await
    }
}

/// A local-kind backend that records how often it is called and does no I/O.
#[derive(Debug, Default)]
pub struct CountingBackend {
    calls: AtomicUsize,
}

impl CountingBackend {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn hit(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(drive: &StorageDrive, raw: &str) -> StorageFolder {
        if raw.is_empty() {
            StorageFolder::new(&path::folder_path(&drive.root_path))
        } else {
            StorageFolder::new(raw)
        }
    }
}

#[async_trait]
impl StorageBackend for CountingBackend {
    fn kind(&self) -> DriveType {
        DriveType::Local
    }

    fn existence_policy(&self) -> ExistenceCheckPolicy {
        ExistenceCheckPolicy::Strict
    }

    async fn create_folder(
        &self,
        drive: &StorageDrive,
        parent_path: &str,
        name: &str,
    ) -> AppResult<StorageFolder> {
        self.hit();
        let parent = Self::snapshot(drive, parent_path);
        Ok(StorageFolder::new(&path::folder_path(&path::join(
            &parent.path,
            name,
        ))))
    }

    async fn list_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        _depth: ListingDepth,
    ) -> AppResult<StorageFolder> {
        self.hit();
        Ok(Self::snapshot(drive, path))
    }

    async fn find_file_by_path(&self, _drive: &StorageDrive, path: &str) -> AppResult<StorageFile> {
        self.hit();
        Ok(StorageFile::new(path, 0))
    }

    async fn save_file(
        &self,
        _drive: &StorageDrive,
        _binding: &StorageDriveFolder,
        folder_path: &str,
        local_file: &Path,
    ) -> AppResult<StorageFile> {
        self.hit();
        let name = local_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(StorageFile::new(&path::join(folder_path, &name), 0))
    }

    async fn fetch_file(
        &self,
        _drive: &StorageDrive,
        _binding: &StorageDriveFolder,
        _path: &str,
    ) -> AppResult<Bytes> {
        self.hit();
        Ok(Bytes::new())
    }

    async fn relocate_folder(
        &self,
        _drive: &StorageDrive,
        _path: &str,
        destination_path: &str,
    ) -> AppResult<StorageFolder> {
        self.hit();
        Ok(StorageFolder::new(destination_path))
    }

    async fn probe_file(&self, _drive: &StorageDrive, _path: &str) -> AppResult<bool> {
        self.hit();
        Ok(true)
    }

    async fn probe_folder(&self, _drive: &StorageDrive, _path: &str) -> AppResult<bool> {
        self.hit();
        Ok(true)
    }

    async fn health_check(&self, _drive: &StorageDrive) -> AppResult<bool> {
        self.hit();
        Ok(true)
    }
}
