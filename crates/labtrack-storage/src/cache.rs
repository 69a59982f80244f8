//! Per-drive client cache.
//!
//! Remote backends build one client per drive from the drive's details.
//! Entries are keyed by drive ID and remember the `updated_at` they were
//! built from; a drive whose record changed gets a fresh client.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use labtrack_core::AppResult;
use labtrack_entity::StorageDrive;

struct CachedClient<C: ?Sized> {
    version: DateTime<Utc>,
    client: Arc<C>,
}

/// Clients keyed by drive, invalidated when the drive record changes.
pub struct DriveClientCache<C: ?Sized> {
    entries: DashMap<Uuid, CachedClient<C>>,
}

impl<C: ?Sized + Send + Sync> DriveClientCache<C> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// The cached client for `drive`, or a new one from `connect`.
    pub async fn get_or_connect<F, Fut>(&self, drive: &StorageDrive, connect: F) -> AppResult<Arc<C>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Arc<C>>>,
    {
        if let Some(entry) = self.entries.get(&drive.id) {
            if entry.version == drive.updated_at {
                return Ok(Arc::clone(&entry.client));
            }
        }

        debug!(drive_id = %drive.id, "Resolving storage client");
        let client = connect().await?;
        self.entries.insert(
            drive.id,
            CachedClient {
                version: drive.updated_at,
                client: Arc::clone(&client),
            },
        );
        Ok(client)
    }

    /// Drop the client of a drive.
    pub fn invalidate(&self, drive_id: &Uuid) {
        self.entries.remove(drive_id);
    }

    /// Number of cached clients.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: ?Sized + Send + Sync> Default for DriveClientCache<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: ?Sized> fmt::Debug for DriveClientCache<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriveClientCache")
            .field("clients", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use labtrack_entity::{CreateStorageDrive, DriveDetails, ExistingFolderPolicy, LocalDriveDetails};

    fn drive() -> StorageDrive {
        CreateStorageDrive::new(
            "Lab data",
            "/data",
            DriveDetails::Local(LocalDriveDetails {
                root_path: "/data".into(),
                existing_folder_policy: ExistingFolderPolicy::Fail,
            }),
        )
        .into_drive(Uuid::new_v4(), Utc::now())
    }

    #[tokio::test]
    async fn test_reuses_until_drive_changes() {
        let cache: DriveClientCache<String> = DriveClientCache::new();
        let counter = AtomicUsize::new(0);
        let connects = &counter;
        let connect = move || async move {
            connects.fetch_add(1, Ordering::SeqCst);
            Ok::<_, labtrack_core::AppError>(Arc::new("client".to_string()))
        };

        let mut drive = drive();
        cache.get_or_connect(&drive, connect).await.unwrap();
        cache.get_or_connect(&drive, connect).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 1);

        drive.updated_at += chrono::Duration::seconds(1);
        cache.get_or_connect(&drive, connect).await.unwrap();
        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 1);

        cache.invalidate(&drive.id);
        assert!(cache.is_empty());
    }
}
