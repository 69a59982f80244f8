//! Storage drive repository.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use labtrack_core::{AppError, AppResult, ErrorKind};
use labtrack_entity::{CreateStorageDrive, DriveDetails, StorageDrive};

/// Persistence for registered drives. Drives are never deleted.
#[async_trait]
pub trait StorageDriveRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Find a drive by ID.
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<StorageDrive>>;

    /// Find a drive by its display name.
    async fn find_by_name(&self, display_name: &str) -> AppResult<Option<StorageDrive>>;

    /// List every drive, ordered by display name.
    async fn find_all(&self) -> AppResult<Vec<StorageDrive>>;

    /// Register a drive. A taken display name is a `Duplicate`.
    async fn create(&self, data: &CreateStorageDrive) -> AppResult<StorageDrive>;

    /// Replace the mutable attributes of a drive and bump `updated_at`.
    async fn update(
        &self,
        id: Uuid,
        display_name: &str,
        root_path: &str,
        details: &DriveDetails,
    ) -> AppResult<StorageDrive>;

    /// Activate or deactivate a drive.
    async fn set_active(&self, id: Uuid, active: bool) -> AppResult<StorageDrive>;
}

/// PostgreSQL drive repository.
#[derive(Debug, Clone)]
pub struct PgStorageDriveRepository {
    pool: PgPool,
}

impl PgStorageDriveRepository {
    /// Create a new drive repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StorageDriveRepository for PgStorageDriveRepository {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<StorageDrive>> {
        sqlx::query_as::<_, StorageDrive>("SELECT * FROM storage_drives WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find drive", e))
    }

    async fn find_by_name(&self, display_name: &str) -> AppResult<Option<StorageDrive>> {
        sqlx::query_as::<_, StorageDrive>("SELECT * FROM storage_drives WHERE display_name = $1")
            .bind(display_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find drive by name", e)
            })
    }

    async fn find_all(&self) -> AppResult<Vec<StorageDrive>> {
        sqlx::query_as::<_, StorageDrive>("SELECT * FROM storage_drives ORDER BY display_name ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list drives", e))
    }

    async fn create(&self, data: &CreateStorageDrive) -> AppResult<StorageDrive> {
        sqlx::query_as::<_, StorageDrive>(
            "INSERT INTO storage_drives (drive_type, display_name, root_path, details) \
             VALUES ($1, $2, $3, $4) RETURNING *",
        )
        .bind(data.drive_type())
        .bind(&data.display_name)
        .bind(&data.root_path)
        .bind(Json(&data.details))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::duplicate(format!("Drive '{}' already exists", data.display_name))
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to create drive", e),
        })
    }

    async fn update(
        &self,
        id: Uuid,
        display_name: &str,
        root_path: &str,
        details: &DriveDetails,
    ) -> AppResult<StorageDrive> {
        sqlx::query_as::<_, StorageDrive>(
            "UPDATE storage_drives SET display_name = $2, root_path = $3, details = $4, \
             updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(display_name)
        .bind(root_path)
        .bind(Json(details))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::duplicate(format!("Drive '{display_name}' already exists"))
            }
            _ => AppError::with_source(ErrorKind::Database, "Failed to update drive", e),
        })?
        .ok_or_else(|| AppError::not_found(format!("Drive {id} not found")))
    }

    async fn set_active(&self, id: Uuid, active: bool) -> AppResult<StorageDrive> {
        sqlx::query_as::<_, StorageDrive>(
            "UPDATE storage_drives SET active = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(active)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update drive status", e)
        })?
        .ok_or_else(|| AppError::not_found(format!("Drive {id} not found")))
    }
}
