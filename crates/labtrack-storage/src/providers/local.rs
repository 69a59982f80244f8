//! Local filesystem backend.
//!
//! Folders are real directories under the drive's root path. Backend paths
//! are the absolute directory strings, with a trailing delimiter.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tokio::fs;
use tracing::{debug, info};

use labtrack_core::config::ExistenceCheckPolicy;
use labtrack_core::{
    AppError, AppResult, ErrorKind, ListingDepth, RelocationState, StorageFile, StorageFolder,
    path,
};
use labtrack_entity::{DriveType, ExistingFolderPolicy, StorageDrive, StorageDriveFolder};

use crate::backend::{
    StorageBackend, authorize_access, authorize_write, check_relocation_target, upload_name,
};

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorageBackend {
    existence_policy: ExistenceCheckPolicy,
}

impl LocalStorageBackend {
    /// Create a local backend.
    pub fn new(existence_policy: ExistenceCheckPolicy) -> Self {
        Self { existence_policy }
    }

    /// The drive's root as a folder path.
    fn root(drive: &StorageDrive) -> AppResult<String> {
        let details = drive.local_details()?;
        Ok(path::folder_path(&path::clean(Some(&details.root_path))))
    }

    /// Resolve a backend path to a folder path inside the drive root.
    ///
    /// Relative paths are taken relative to the root; absolute paths must
    /// lie inside it.
    fn resolve(drive: &StorageDrive, raw: &str) -> AppResult<String> {
        let root = Self::root(drive)?;
        let cleaned = path::clean(Some(raw));
        if cleaned.is_empty() {
            return Ok(root);
        }
        if path::is_within(&root, &cleaned) {
            return Ok(cleaned);
        }
        if !cleaned.starts_with(path::DELIMITER) {
            return Ok(path::join(&root, &cleaned));
        }
        Err(AppError::validation(format!(
            "'{raw}' lies outside the drive root '{root}'"
        )))
    }

    fn io_error(e: std::io::Error, action: &str, target: &str) -> AppError {
        let kind = match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::AlreadyExists => ErrorKind::Duplicate,
            _ => ErrorKind::WriteFailure,
        };
        AppError::with_source(kind, format!("Failed to {action} '{target}': {e}"), e)
    }

    async fn is_dir(target: &str) -> AppResult<bool> {
        match fs::metadata(target).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(e, "inspect", target)),
        }
    }

    fn file_snapshot(file_path: &str, meta: &std::fs::Metadata) -> StorageFile {
        StorageFile::new(file_path, meta.len())
            .with_last_modified(meta.modified().ok().map(chrono::DateTime::from))
    }

    fn read_tree(dir: String, depth: ListingDepth) -> BoxFuture<'static, AppResult<StorageFolder>> {
        Box::pin(async move {
            let meta = fs::metadata(&dir)
                .await
                .map_err(|e| Self::io_error(e, "open folder", &dir))?;
            if !meta.is_dir() {
                return Err(AppError::not_found(format!("'{dir}' is not a folder")));
            }

            let mut folder = StorageFolder::new(&dir)
                .with_last_modified(meta.modified().ok().map(chrono::DateTime::from));

            let mut entries = fs::read_dir(&dir)
                .await
                .map_err(|e| Self::io_error(e, "list folder", &dir))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| Self::io_error(e, "read folder entry", &dir))?
            {
                let entry_meta = entry
                    .metadata()
                    .await
                    .map_err(|e| Self::io_error(e, "inspect entry", &dir))?;
                let name = entry.file_name().to_string_lossy().to_string();
                let child = path::join(&dir, &name);

                if entry_meta.is_dir() {
                    let sub = match depth {
                        ListingDepth::Recursive => Self::read_tree(child, depth).await?,
                        ListingDepth::Shallow => StorageFolder::new(&child).with_last_modified(
                            entry_meta.modified().ok().map(chrono::DateTime::from),
                        ),
                    };
                    folder.subfolders.push(sub);
                } else {
                    folder.files.push(Self::file_snapshot(&child, &entry_meta));
                }
            }

            folder.sort_children();
            Ok(folder)
        })
    }
}

impl Default for LocalStorageBackend {
    fn default() -> Self {
        Self::new(ExistenceCheckPolicy::default())
    }
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    fn kind(&self) -> DriveType {
        DriveType::Local
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
        let parent = Self::resolve(drive, parent_path)?;
        let name = path::clean(Some(name));
        let name = path::strip_leading(&name).trim_end_matches(path::DELIMITER);
        if name.is_empty() {
            return Err(AppError::validation("Folder name cannot be empty"));
        }
        let target = path::folder_path(&path::join(&parent, name));
        let policy = drive.local_details()?.existing_folder_policy;

        if Self::is_dir(&target).await? {
            match policy {
                ExistingFolderPolicy::Fail => {
                    return Err(AppError::duplicate(format!("Folder '{target}' already exists")));
                }
                ExistingFolderPolicy::UseExisting => {
                    debug!(path = %target, "Reusing existing folder");
                    return self.find_folder_by_path(drive, &target).await;
                }
                ExistingFolderPolicy::OverwriteExisting => {
                    info!(path = %target, "Replacing existing folder");
                    fs::remove_dir_all(&target)
                        .await
                        .map_err(|e| Self::io_error(e, "remove folder", &target))?;
                }
            }
        }

        let parent_dir = path::parent_of(&target);
        fs::create_dir_all(&parent_dir)
            .await
            .map_err(|e| Self::io_error(e, "create parent folders", &parent_dir))?;

        match fs::create_dir(&target).await {
            Ok(()) => {}
            Err(e)
                if e.kind() == std::io::ErrorKind::AlreadyExists
                    && policy == ExistingFolderPolicy::UseExisting => {}
            Err(e) => return Err(Self::io_error(e, "create folder", &target)),
        }

        info!(drive_id = %drive.id, path = %target, "Created local folder");
        self.find_folder_by_path(drive, &target).await
    }

    async fn list_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        depth: ListingDepth,
    ) -> AppResult<StorageFolder> {
        let root = Self::root(drive)?;
        let target = path::folder_path(&Self::resolve(drive, path)?);
        let mut folder = Self::read_tree(target.clone(), depth).await?;
        if !path::compare(&target, &root) {
            folder = folder.with_parent(StorageFolder::new(&path::parent_of(&target)));
        }
        Ok(folder)
    }

    async fn find_file_by_path(&self, drive: &StorageDrive, path: &str) -> AppResult<StorageFile> {
        let target = path::file_path(&Self::resolve(drive, path)?);
        let meta = fs::metadata(&target)
            .await
            .map_err(|e| Self::io_error(e, "open file", &target))?;
        if !meta.is_file() {
            return Err(AppError::not_found(format!("'{target}' is not a file")));
        }
        Ok(Self::file_snapshot(&target, &meta))
    }

    async fn save_file(
        &self,
        drive: &StorageDrive,
        binding: &StorageDriveFolder,
        folder_path: &str,
        local_file: &Path,
    ) -> AppResult<StorageFile> {
        binding.ensure_writable()?;
        let folder = path::folder_path(&Self::resolve(drive, folder_path)?);
        authorize_write(binding, &folder)?;
        let name = upload_name(local_file)?;

        if !Self::is_dir(&folder).await? {
            return Err(AppError::not_found(format!("Folder '{folder}' does not exist")));
        }

        let target = path::join(&folder, &name);
        let written = fs::copy(local_file, PathBuf::from(&target))
            .await
            .map_err(|e| Self::io_error(e, "write file", &target))?;

        info!(drive_id = %drive.id, path = %target, bytes = written, "Saved file");
        self.find_file_by_path(drive, &target).await
    }

    async fn fetch_file(
        &self,
        drive: &StorageDrive,
        binding: &StorageDriveFolder,
        path: &str,
    ) -> AppResult<Bytes> {
        let target = path::file_path(&Self::resolve(drive, path)?);
        authorize_access(binding, &target)?;
        let data = fs::read(&target)
            .await
            .map_err(|e| Self::io_error(e, "read file", &target))?;
        debug!(path = %target, bytes = data.len(), "Fetched file");
        Ok(Bytes::from(data))
    }

    async fn relocate_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        destination_path: &str,
    ) -> AppResult<StorageFolder> {
        let source = path::folder_path(&Self::resolve(drive, path)?);
        let destination = path::folder_path(&Self::resolve(drive, destination_path)?);
        check_relocation_target(&source, &destination)?;

        if !Self::is_dir(&source).await? {
            return Err(AppError::not_found(format!("Folder '{source}' does not exist")));
        }
        if path::compare(&source, &destination) {
            return self.find_folder_by_path(drive, &source).await;
        }
        if fs::try_exists(path::file_path(&destination))
            .await
            .map_err(|e| Self::io_error(e, "inspect", &destination))?
        {
            return Err(AppError::duplicate(format!("'{destination}' already exists")));
        }

        fs::rename(path::file_path(&source), path::file_path(&destination))
            .await
            .map_err(|e| {
                Self::io_error(e, "move folder", &source).with_relocation(RelocationState::SourceOnly)
            })?;

        info!(drive_id = %drive.id, from = %source, to = %destination, "Relocated local folder");
        self.find_folder_by_path(drive, &destination).await
    }

    async fn probe_file(&self, drive: &StorageDrive, path: &str) -> AppResult<bool> {
        let target = path::file_path(&Self::resolve(drive, path)?);
        match fs::metadata(&target).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Self::io_error(e, "inspect", &target)),
        }
    }

    async fn probe_folder(&self, drive: &StorageDrive, path: &str) -> AppResult<bool> {
        let target = Self::resolve(drive, path)?;
        Self::is_dir(&target).await
    }

    async fn health_check(&self, drive: &StorageDrive) -> AppResult<bool> {
        Self::is_dir(&Self::root(drive)?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use labtrack_entity::{
        CreateStorageDrive, CreateStorageDriveFolder, DriveDetails, DriveFolderDetails,
        FolderOptions, LocalDriveDetails,
    };
    use uuid::Uuid;

    fn drive(root: &Path, policy: ExistingFolderPolicy) -> StorageDrive {
        let root = root.to_string_lossy().to_string();
        CreateStorageDrive::new(
            "Local",
            root.clone(),
            DriveDetails::Local(LocalDriveDetails {
                root_path: root,
                existing_folder_policy: policy,
            }),
        )
        .into_drive(Uuid::new_v4(), Utc::now())
    }

    fn binding(drive: &StorageDrive, path: &str, write_enabled: bool) -> StorageDriveFolder {
        CreateStorageDriveFolder {
            drive_id: drive.id,
            path: path.into(),
            name: path::name_of(path),
            options: FolderOptions {
                write_enabled,
                ..FolderOptions::entity_folder()
            },
            details: DriveFolderDetails::Local,
        }
        .into_folder(Uuid::new_v4(), Utc::now())
    }

    fn root_of(drive: &StorageDrive) -> String {
        path::folder_path(&drive.root_path)
    }

    #[tokio::test]
    async fn test_nested_create_then_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let drive = drive(dir.path(), ExistingFolderPolicy::Fail);
        let backend = LocalStorageBackend::default();

        let folder = backend
            .create_folder(&drive, &drive.root_path, "Acme/ProjectX")
            .await
            .unwrap();
        assert_eq!(folder.path, format!("{}Acme/ProjectX/", root_of(&drive)));
        assert_eq!(folder.name, "ProjectX");
        assert!(dir.path().join("Acme").join("ProjectX").is_dir());

        let err = backend
            .create_folder(&drive, &drive.root_path, "Acme/ProjectX")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Duplicate);
    }

    #[tokio::test]
    async fn test_use_existing_and_overwrite_policies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("Acme")).unwrap();
        std::fs::write(dir.path().join("Acme").join("old.txt"), b"old").unwrap();
        let backend = LocalStorageBackend::default();

        let reuse = drive(dir.path(), ExistingFolderPolicy::UseExisting);
        let folder = backend.create_folder(&reuse, "", "Acme").await.unwrap();
        assert_eq!(folder.files.len(), 1);

        let overwrite = drive(dir.path(), ExistingFolderPolicy::OverwriteExisting);
        let folder = backend.create_folder(&overwrite, "", "Acme").await.unwrap();
        assert!(folder.is_empty());
    }

    #[tokio::test]
    async fn test_traversal_stays_inside_root() {
        let dir = tempfile::tempdir().unwrap();
        let drive = drive(dir.path(), ExistingFolderPolicy::Fail);
        let backend = LocalStorageBackend::default();

        let folder = backend
            .create_folder(&drive, "", "../../escape")
            .await
            .unwrap();
        assert!(folder.path.starts_with(&root_of(&drive)));

        let err = backend
            .list_folder(&drive, "/etc", ListingDepth::Shallow)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_listing_depth() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a").join("b")).unwrap();
        std::fs::write(dir.path().join("a").join("b").join("deep.csv"), b"1,2").unwrap();
        std::fs::write(dir.path().join("a").join("top.txt"), b"top").unwrap();
        let drive = drive(dir.path(), ExistingFolderPolicy::Fail);
        let backend = LocalStorageBackend::default();

        let shallow = backend.find_folder_by_path(&drive, "a").await.unwrap();
        assert_eq!(shallow.files.len(), 1);
        assert_eq!(shallow.subfolders.len(), 1);
        assert!(shallow.subfolders[0].is_empty());
        assert_eq!(shallow.parent.as_ref().unwrap().path, root_of(&drive));

        let deep = backend
            .list_folder(&drive, "a", ListingDepth::Recursive)
            .await
            .unwrap();
        assert_eq!(deep.subfolders[0].files[0].name, "deep.csv");
        assert_eq!(deep.total_size(), 6);
    }

    #[tokio::test]
    async fn test_save_and_fetch_file() {
        let dir = tempfile::tempdir().unwrap();
        let upload_dir = tempfile::tempdir().unwrap();
        let upload = upload_dir.path().join("plate.csv");
        std::fs::write(&upload, b"well,value").unwrap();

        let drive = drive(dir.path(), ExistingFolderPolicy::Fail);
        let backend = LocalStorageBackend::default();
        let folder = backend.create_folder(&drive, "", "Study1").await.unwrap();
        let writable = binding(&drive, &folder.path, true);

        let saved = backend
            .save_file(&drive, &writable, &folder.path, &upload)
            .await
            .unwrap();
        assert_eq!(saved.name, "plate.csv");
        assert_eq!(saved.size, 10);
        assert!(backend.file_exists(&drive, &saved.path).await.unwrap());
        assert!(!backend.folder_exists(&drive, &saved.path).await.unwrap());

        let data = backend.fetch_file(&drive, &writable, &saved.path).await.unwrap();
        assert_eq!(&data[..], b"well,value");

        let read_only = binding(&drive, &folder.path, false);
        let err = backend
            .save_file(&drive, &read_only, &folder.path, &upload)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::InsufficientPrivileges);
    }

    #[tokio::test]
    async fn test_rename_and_move() {
        let dir = tempfile::tempdir().unwrap();
        let drive = drive(dir.path(), ExistingFolderPolicy::Fail);
        let backend = LocalStorageBackend::default();
        let a = backend.create_folder(&drive, "", "teamA").await.unwrap();
        let archive = backend.create_folder(&drive, "", "archive").await.unwrap();

        let renamed = backend.rename_folder(&drive, &a.path, "teamB").await.unwrap();
        assert_eq!(renamed.name, "teamB");
        assert!(!backend.folder_exists(&drive, &a.path).await.unwrap());

        let moved = backend
            .move_folder(&drive, &renamed.path, &archive.path)
            .await
            .unwrap();
        assert_eq!(moved.path, format!("{}teamB/", archive.path));

        let err = backend
            .rename_folder(&drive, &a.path, "teamC")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_health_check() {
        let dir = tempfile::tempdir().unwrap();
        let drive_ok = drive(dir.path(), ExistingFolderPolicy::Fail);
        let backend = LocalStorageBackend::default();
        assert!(backend.health_check(&drive_ok).await.unwrap());

        let missing = drive(&dir.path().join("missing"), ExistingFolderPolicy::Fail);
        assert!(!backend.health_check(&missing).await.unwrap());
    }
}
