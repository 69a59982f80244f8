//! The storage backend contract.
//!
//! Every operation takes the drive it runs against, so one backend
//! instance serves every drive of its kind. Paths are backend-native
//! strings: absolute directories for the local filesystem, object keys
//! for object storage, API paths for the document API.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;

use labtrack_core::config::ExistenceCheckPolicy;
use labtrack_core::{AppError, AppResult, ListingDepth, StorageFile, StorageFolder, path};
use labtrack_entity::{DriveType, StorageDrive, StorageDriveFolder};

/// Folder and file operations against one kind of storage backend.
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug + 'static {
    /// The drive kind this backend serves.
    fn kind(&self) -> DriveType;

    /// How existence checks treat backend errors.
    fn existence_policy(&self) -> ExistenceCheckPolicy;

    /// Create `name` under `parent_path`. `name` may contain delimiters,
    /// in which case intermediate folders are created too.
    async fn create_folder(
        &self,
        drive: &StorageDrive,
        parent_path: &str,
        name: &str,
    ) -> AppResult<StorageFolder>;

    /// Snapshot of a folder with its children down to `depth`.
    async fn list_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        depth: ListingDepth,
    ) -> AppResult<StorageFolder>;

    /// Snapshot of a folder with its immediate children.
    async fn find_folder_by_path(
        &self,
        drive: &StorageDrive,
        path: &str,
    ) -> AppResult<StorageFolder> {
        self.list_folder(drive, path, ListingDepth::Shallow).await
    }

    /// Snapshot of a file. A path naming a folder is `NotFound`.
    async fn find_file_by_path(&self, drive: &StorageDrive, path: &str) -> AppResult<StorageFile>;

    /// Upload `local_file` into `folder_path`, which must lie inside the
    /// writable `binding`.
    async fn save_file(
        &self,
        drive: &StorageDrive,
        binding: &StorageDriveFolder,
        folder_path: &str,
        local_file: &Path,
    ) -> AppResult<StorageFile>;

    /// Download a file that lies inside `binding`.
    async fn fetch_file(
        &self,
        drive: &StorageDrive,
        binding: &StorageDriveFolder,
        path: &str,
    ) -> AppResult<Bytes>;

    /// Move the folder at `path` so that it ends up at `destination_path`.
    ///
    /// Failures that may leave partial state carry a relocation state on
    /// the returned error.
    async fn relocate_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        destination_path: &str,
    ) -> AppResult<StorageFolder>;

    /// Rename the folder at `path` in place.
    async fn rename_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        new_name: &str,
    ) -> AppResult<StorageFolder> {
        let new_name = path::clean(Some(new_name));
        if new_name.is_empty() || new_name.contains(path::DELIMITER) {
            return Err(AppError::validation(format!(
                "'{new_name}' is not a valid folder name"
            )));
        }
        let destination = path::folder_path(&path::join(&path::parent_of(path), &new_name));
        self.relocate_folder(drive, path, &destination).await
    }

    /// Move the folder at `path` under `new_parent_path`, keeping its name.
    async fn move_folder(
        &self,
        drive: &StorageDrive,
        path: &str,
        new_parent_path: &str,
    ) -> AppResult<StorageFolder> {
        let destination = path::folder_path(&path::join(new_parent_path, &path::name_of(path)));
        self.relocate_folder(drive, path, &destination).await
    }

    /// Raw file presence check; errors are the backend's own.
    async fn probe_file(&self, drive: &StorageDrive, path: &str) -> AppResult<bool>;

    /// Raw folder presence check; errors are the backend's own.
    async fn probe_folder(&self, drive: &StorageDrive, path: &str) -> AppResult<bool>;

    /// Whether a file exists, under the configured existence-check policy.
    async fn file_exists(&self, drive: &StorageDrive, path: &str) -> AppResult<bool> {
        let probed = self.probe_file(drive, path).await;
        apply_existence_policy(self.existence_policy(), self.kind(), path, probed)
    }

    /// Whether a folder exists, under the configured existence-check policy.
    async fn folder_exists(&self, drive: &StorageDrive, path: &str) -> AppResult<bool> {
        let probed = self.probe_folder(drive, path).await;
        apply_existence_policy(self.existence_policy(), self.kind(), path, probed)
    }

    /// Whether the drive's backend is reachable.
    async fn health_check(&self, drive: &StorageDrive) -> AppResult<bool>;

    /// Drop anything held for `drive`, such as a connected client.
    fn forget_drive(&self, _drive: &StorageDrive) {}
}

/// Collapse or propagate a failed existence probe.
pub fn apply_existence_policy(
    policy: ExistenceCheckPolicy,
    kind: DriveType,
    path: &str,
    probed: AppResult<bool>,
) -> AppResult<bool> {
    match (probed, policy) {
        (Ok(found), _) => Ok(found),
        (Err(e), ExistenceCheckPolicy::Lenient) => {
            warn!(backend = %kind, path, error = %e, "Existence check failed; reporting absent");
            Ok(false)
        }
        (Err(e), ExistenceCheckPolicy::Strict) => Err(e),
    }
}

/// Refuse writes into a read-only binding or outside of it.
///
/// Runs before any I/O.
pub fn authorize_write(binding: &StorageDriveFolder, folder_path: &str) -> AppResult<()> {
    binding.ensure_writable()?;
    authorize_access(binding, folder_path)
}

/// Refuse access to paths outside a binding.
pub fn authorize_access(binding: &StorageDriveFolder, target: &str) -> AppResult<()> {
    if !binding.contains(target) {
        return Err(AppError::insufficient_privileges(format!(
            "'{target}' lies outside folder '{}'",
            binding.path
        )));
    }
    Ok(())
}

/// The name a local file is stored under.
pub fn upload_name(local_file: &Path) -> AppResult<String> {
    local_file
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            AppError::validation(format!(
                "'{}' does not name a file",
                local_file.display()
            ))
        })
}

/// Read an upload into memory.
pub async fn read_upload(local_file: &Path) -> AppResult<Bytes> {
    tokio::fs::read(local_file)
        .await
        .map(Bytes::from)
        .map_err(AppError::from)
}

/// Reject a relocation into the folder's own subtree.
pub fn check_relocation_target(source: &str, destination: &str) -> AppResult<()> {
    if path::compare(source, destination) {
        return Ok(());
    }
    if path::is_within(source, destination) {
        return Err(AppError::validation(format!(
            "Cannot move '{source}' into its own subfolder '{destination}'"
        )));
    }
    Ok(())
}
