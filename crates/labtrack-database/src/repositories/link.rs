//! Entity-to-folder link repository.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use labtrack_core::{AppError, AppResult, ErrorKind};
use labtrack_entity::{EntityFolderLink, EntityRef};

/// Persistence for entity folder links.
#[async_trait]
pub trait EntityFolderLinkRepository: Send + Sync + std::fmt::Debug + 'static {
    /// Link a folder to an entity. Linking as primary demotes the entity's
    /// previous primary. Relinking an already linked folder only updates
    /// its primary flag.
    async fn link(
        &self,
        entity: EntityRef,
        folder_id: Uuid,
        primary: bool,
    ) -> AppResult<EntityFolderLink>;

    /// List an entity's links, primary first, then oldest first.
    async fn find_by_entity(&self, entity: EntityRef) -> AppResult<Vec<EntityFolderLink>>;

    /// The entity's primary link, if any.
    async fn find_primary(&self, entity: EntityRef) -> AppResult<Option<EntityFolderLink>>;

    /// List the links pointing at a folder.
    async fn find_by_folder(&self, folder_id: Uuid) -> AppResult<Vec<EntityFolderLink>>;
}

/// PostgreSQL entity link repository.
#[derive(Debug, Clone)]
pub struct PgEntityFolderLinkRepository {
    pool: PgPool,
}

impl PgEntityFolderLinkRepository {
    /// Create a new link repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EntityFolderLinkRepository for PgEntityFolderLinkRepository {
    async fn link(
        &self,
        entity: EntityRef,
        folder_id: Uuid,
        primary: bool,
    ) -> AppResult<EntityFolderLink> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        if primary {
            sqlx::query(
                "UPDATE entity_folder_links SET is_primary = FALSE \
                 WHERE entity_kind = $1 AND entity_id = $2 AND folder_id <> $3 AND is_primary",
            )
            .bind(entity.kind)
            .bind(entity.id)
            .bind(folder_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to demote primary folder", e)
            })?;
        }

        let link = sqlx::query_as::<_, EntityFolderLink>(
            "INSERT INTO entity_folder_links (entity_kind, entity_id, folder_id, is_primary) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (entity_kind, entity_id, folder_id) \
             DO UPDATE SET is_primary = entity_folder_links.is_primary OR EXCLUDED.is_primary \
             RETURNING *",
        )
        .bind(entity.kind)
        .bind(entity.id)
        .bind(folder_id)
        .bind(primary)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to link folder", e))?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit folder link", e)
        })?;

        Ok(link)
    }

    async fn find_by_entity(&self, entity: EntityRef) -> AppResult<Vec<EntityFolderLink>> {
        sqlx::query_as::<_, EntityFolderLink>(
            "SELECT * FROM entity_folder_links WHERE entity_kind = $1 AND entity_id = $2 \
             ORDER BY is_primary DESC, created_at ASC",
        )
        .bind(entity.kind)
        .bind(entity.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to list entity folders", e)
        })
    }

    async fn find_primary(&self, entity: EntityRef) -> AppResult<Option<EntityFolderLink>> {
        sqlx::query_as::<_, EntityFolderLink>(
            "SELECT * FROM entity_folder_links \
             WHERE entity_kind = $1 AND entity_id = $2 AND is_primary",
        )
        .bind(entity.kind)
        .bind(entity.id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to find primary folder", e)
        })
    }

    async fn find_by_folder(&self, folder_id: Uuid) -> AppResult<Vec<EntityFolderLink>> {
        sqlx::query_as::<_, EntityFolderLink>(
            "SELECT * FROM entity_folder_links WHERE folder_id = $1 ORDER BY created_at ASC",
        )
        .bind(folder_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list folder links", e))
    }
}
