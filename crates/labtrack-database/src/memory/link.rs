//! In-memory entity link repository.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use labtrack_core::AppResult;
use labtrack_entity::{EntityFolderLink, EntityRef};

use crate::repositories::EntityFolderLinkRepository;

/// Link repository backed by a vector behind a Tokio mutex.
#[derive(Debug, Clone, Default)]
pub struct MemoryEntityFolderLinkRepository {
    links: Arc<Mutex<Vec<EntityFolderLink>>>,
}

impl MemoryEntityFolderLinkRepository {
    /// Create an empty repository.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntityFolderLinkRepository for MemoryEntityFolderLinkRepository {
    async fn link(
        &self,
        entity: EntityRef,
        folder_id: Uuid,
        primary: bool,
    ) -> AppResult<EntityFolderLink> {
        let mut links = self.links.lock().await;

        if primary {
            for link in links
                .iter_mut()
                .filter(|l| l.entity() == entity && l.folder_id != folder_id)
            {
                link.is_primary = false;
            }
        }

        if let Some(existing) = links
            .iter_mut()
            .find(|l| l.entity() == entity && l.folder_id == folder_id)
        {
            existing.is_primary |= primary;
            return Ok(existing.clone());
        }

        let link = EntityFolderLink {
            id: Uuid::new_v4(),
            entity_kind: entity.kind,
            entity_id: entity.id,
            folder_id,
            is_primary: primary,
            created_at: Utc::now(),
        };
        links.push(link.clone());
        Ok(link)
    }

    async fn find_by_entity(&self, entity: EntityRef) -> AppResult<Vec<EntityFolderLink>> {
        let mut out: Vec<EntityFolderLink> = self
            .links
            .lock()
            .await
            .iter()
            .filter(|l| l.entity() == entity)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.is_primary
                .cmp(&a.is_primary)
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(out)
    }

    async fn find_primary(&self, entity: EntityRef) -> AppResult<Option<EntityFolderLink>> {
        Ok(self
            .links
            .lock()
            .await
            .iter()
            .find(|l| l.entity() == entity && l.is_primary)
            .cloned())
    }

    async fn find_by_folder(&self, folder_id: Uuid) -> AppResult<Vec<EntityFolderLink>> {
        Ok(self
            .links
            .lock()
            .await
            .iter()
            .filter(|l| l.folder_id == folder_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_primary_demotes_previous() {
        let repo = MemoryEntityFolderLinkRepository::new();
        let study = EntityRef::study(Uuid::new_v4());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        repo.link(study, a, true).await.unwrap();
        repo.link(study, b, true).await.unwrap();

        let primary = repo.find_primary(study).await.unwrap().unwrap();
        assert_eq!(primary.folder_id, b);
        let links = repo.find_by_entity(study).await.unwrap();
        assert_eq!(links.len(), 2);
        assert_eq!(links.iter().filter(|l| l.is_primary).count(), 1);
        assert_eq!(links[0].folder_id, b);
    }

    #[tokio::test]
    async fn test_relink_is_idempotent() {
        let repo = MemoryEntityFolderLinkRepository::new();
        let assay = EntityRef::assay(Uuid::new_v4());
        let folder = Uuid::new_v4();
        let first = repo.link(assay, folder, true).await.unwrap();
        let again = repo.link(assay, folder, false).await.unwrap();
        assert_eq!(first.id, again.id);
        assert!(again.is_primary);
        assert_eq!(repo.find_by_folder(folder).await.unwrap().len(), 1);
    }
}
