//! Folder binding repository.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use labtrack_core::{AppError, AppResult, ErrorKind};
use labtrack_entity::{
    CreateStorageDriveFolder, DriveFolderDetails, FolderOptions, StorageDriveFolder,
};

/// Persistence for folder bindings. Bindings an entity links to are never
/// deleted.
#[async_trait]
pub trait StorageDriveFolderRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Find a binding by ID.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<StorageDriveFolder>>;

    /// Find the binding for a path on a drive.
    async fn find_by_path(
        &self,
        drive_id: Uuid,
        path: &str,
    ) -> AppResult<Option<StorageDriveFolder>>;

    /// List the bindings of a drive, ordered by path.
    async fn find_by_drive(&self, drive_id: Uuid) -> AppResult<Vec<StorageDriveFolder>>;

    /// List browser roots, oldest first.
    async fn find_browser_roots(&self) -> AppResult<Vec<StorageDriveFolder>>;

    /// List study roots, oldest first with ties broken by ID.
    async fn find_study_roots(&self) -> AppResult<Vec<StorageDriveFolder>>;

    /// Persist a binding. A path already bound on the drive is a `Duplicate`.
    async fn create(&self, data: &CreateStorageDriveFolder) -> AppResult<StorageDriveFolder>;

    /// Point a binding at a new location after a relocation.
    async fn update_location(
        &self,
        id: Uuid,
        path: &str,
        name: &str,
        details: &DriveFolderDetails,
    ) -> AppResult<StorageDriveFolder>;

    /// Replace the permission and role flags of a binding.
    async fn update_options(
        &self,
        id: Uuid,
        options: &FolderOptions,
    ) -> AppResult<StorageDriveFolder>;

    /// Remove a binding no entity links to. Returns whether a row was removed.
    async fn discard_unlinked(&self, id: Uuid) -> AppResult<bool>;
}

/// PostgreSQL folder binding repository.
#[derive(Debug, Clone)]
pub struct PgStorageDriveFolderRepository {
    pool: PgPool,
}

impl PgStorageDriveFolderRepository {
    /// Create a new folder binding repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_write_error(e: sqlx::Error, path: &str, action: &str) -> AppError {
    match e {
        sqlx::Error::Database(ref db_err)
            if db_err.constraint() == Some("storage_drive_folders_drive_id_path_key") =>
        {
            AppError::duplicate(format!("Folder path '{path}' is already bound on this drive"))
        }
        sqlx::Error::Database(ref db_err)
            if db_err.constraint() == Some("storage_drive_folders_study_root_check") =>
        {
            AppError::validation("A study root folder must also be a browser root")
        }
        _ => AppError::with_source(ErrorKind::Database, format!("Failed to {action}"), e),
    }
}

#[async_trait]
impl StorageDriveFolderRepository for PgStorageDriveFolderRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<StorageDriveFolder>> {
        sqlx::query_as::<_, StorageDriveFolder>("SELECT * FROM storage_drive_folders WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find folder binding", e)
            })
    }

    async fn find_by_path(
        &self,
        drive_id: Uuid,
        path: &str,
    ) -> AppResult<Option<StorageDriveFolder>> {
        sqlx::query_as::<_, StorageDriveFolder>(
            "SELECT * FROM storage_drive_folders WHERE drive_id = $1 AND path = $2",
        )
        .bind(drive_id)
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find folder binding by path", e)
        })
    }

    async fn find_by_drive(&self, drive_id: Uuid) -> AppResult<Vec<StorageDriveFolder>> {
        sqlx::query_as::<_, StorageDriveFolder>(
            "SELECT * FROM storage_drive_folders WHERE drive_id = $1 ORDER BY path ASC",
        )
        .bind(drive_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list drive folders", e)
        })
    }

    async fn find_browser_roots(&self) -> AppResult<Vec<StorageDriveFolder>> {
        sqlx::query_as::<_, StorageDriveFolder>(
            "SELECT * FROM storage_drive_folders WHERE browser_root = TRUE \
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list browser roots", e)
        })
    }

    async fn find_study_roots(&self) -> AppResult<Vec<StorageDriveFolder>> {
        sqlx::query_as::<_, StorageDriveFolder>(
            "SELECT * FROM storage_drive_folders WHERE study_root = TRUE \
             ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list study roots", e))
    }

    async fn create(&self, data: &CreateStorageDriveFolder) -> AppResult<StorageDriveFolder> {
        sqlx::query_as::<_, StorageDriveFolder>(
            "INSERT INTO storage_drive_folders \
             (drive_id, path, name, write_enabled, delete_enabled, browser_root, study_root, details) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING *",
        )
        .bind(data.drive_id)
        .bind(&data.path)
        .bind(&data.name)
        .bind(data.options.write_enabled)
        .bind(data.options.delete_enabled)
        .bind(data.options.browser_root)
        .bind(data.options.study_root)
        .bind(Json(&data.details))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, &data.path, "create folder binding"))
    }

    async fn update_location(
        &self,
        id: Uuid,
        path: &str,
        name: &str,
        details: &DriveFolderDetails,
    ) -> AppResult<StorageDriveFolder> {
        sqlx::query_as::<_, StorageDriveFolder>(
            "UPDATE storage_drive_folders SET path = $2, name = $3, details = $4, \
             updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(path)
        .bind(name)
        .bind(Json(details))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, path, "update folder binding location"))?
        .ok_or_else(|| AppError::not_found(format!("Folder binding {id} not found")))
    }

    async fn update_options(
        &self,
        id: Uuid,
        options: &FolderOptions,
    ) -> AppResult<StorageDriveFolder> {
        sqlx::query_as::<_, StorageDriveFolder>(
            "UPDATE storage_drive_folders SET write_enabled = $2, delete_enabled = $3, \
             browser_root = $4, study_root = $5, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(options.write_enabled)
        .bind(options.delete_enabled)
        .bind(options.browser_root)
        .bind(options.study_root)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "", "update folder binding flags"))?
        .ok_or_else(|| AppError::not_found(format!("Folder binding {id} not found")))
    }

    async fn discard_unlinked(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM storage_drive_folders WHERE id = $1 \
             AND NOT EXISTS (SELECT 1 FROM entity_folder_links WHERE folder_id = $1)",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to discard folder binding {id}"),
                e,
            )
        })?;
        Ok(result.rows_affected() > 0)
    }
}
