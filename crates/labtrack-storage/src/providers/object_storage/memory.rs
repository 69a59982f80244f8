//! In-memory object store.
//!
//! Behaves like a single S3 bucket: flat keys, prefix + delimiter listings
//! with opaque continuation tokens, idempotent deletes. Copy and delete
//! failures can be injected to exercise partial relocations.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;

use labtrack_core::{AppError, AppResult};
use labtrack_entity::{ObjectStorageDriveDetails, StorageDrive};

use super::client::{ListPage, ObjectEntry, ObjectStoreClient, ObjectStoreConnector};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
    etag: String,
}

/// A bucket held in memory.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
    versions: AtomicU64,
    copies_before_failure: AtomicUsize,
    copy_failures_armed: AtomicBool,
    fail_deletes: AtomicBool,
    unreachable: AtomicBool,
}

enum Listed {
    Object(ObjectEntry),
    Prefix(String),
}

impl MemoryObjectStore {
    /// Create an empty bucket.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every key currently stored, in order.
    pub async fn keys(&self) -> Vec<String> {
        self.objects.read().await.keys().cloned().collect()
    }

    /// Make copies fail once `successful` more copies have gone through.
    pub fn fail_copies_after(&self, successful: usize) {
        self.copies_before_failure.store(successful, Ordering::SeqCst);
        self.copy_failures_armed.store(true, Ordering::SeqCst);
    }

    /// Make every delete fail.
    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    /// Make every call fail as if the service were down.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> AppResult<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(AppError::write_failure("Object store is unreachable"));
        }
        Ok(())
    }

    fn entry(key: &str, object: &StoredObject) -> ObjectEntry {
        ObjectEntry {
            key: key.to_string(),
            size: object.data.len() as u64,
            last_modified: Some(object.last_modified),
            etag: Some(object.etag.clone()),
        }
    }

    fn next_etag(&self) -> String {
        format!("\"v{}\"", self.versions.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ObjectStoreClient for MemoryObjectStore {
    async fn put_object(&self, key: &str, body: Bytes) -> AppResult<Option<String>> {
        self.check_reachable()?;
        let etag = self.next_etag();
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: body,
                last_modified: Utc::now(),
                etag: etag.clone(),
            },
        );
        Ok(Some(etag))
    }

    async fn head_object(&self, key: &str) -> AppResult<Option<ObjectEntry>> {
        self.check_reachable()?;
        Ok(self
            .objects
            .read()
            .await
            .get(key)
            .map(|o| Self::entry(key, o)))
    }

    async fn get_object(&self, key: &str) -> AppResult<Bytes> {
        self.check_reachable()?;
        self.objects
            .read()
            .await
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| AppError::not_found(format!("No such key '{key}'")))
    }

    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation: Option<String>,
        page_size: i32,
    ) -> AppResult<ListPage> {
        self.check_reachable()?;
        let objects = self.objects.read().await;

        let mut listed: Vec<Listed> = Vec::new();
        for (key, object) in objects.range(prefix.to_string()..) {
            let Some(rest) = key.strip_prefix(prefix) else {
                break;
            };
            let grouped = delimiter
                .and_then(|d| rest.find(d).map(|idx| format!("{prefix}{}", &rest[..idx + d.len()])));
            match grouped {
                Some(common) => {
                    if !matches!(listed.last(), Some(Listed::Prefix(p)) if *p == common) {
                        listed.push(Listed::Prefix(common));
                    }
                }
                None => listed.push(Listed::Object(Self::entry(key, object))),
            }
        }

        let start: usize = match continuation {
            Some(token) => token
                .parse()
                .map_err(|_| AppError::validation(format!("Bad continuation token '{token}'")))?,
            None => 0,
        };
        let size = page_size.max(1) as usize;
        let end = (start + size).min(listed.len());

        let mut page = ListPage {
            next_token: (end < listed.len()).then(|| end.to_string()),
            ..ListPage::default()
        };
        for item in listed.into_iter().skip(start).take(end.saturating_sub(start)) {
            match item {
                Listed::Object(entry) => page.objects.push(entry),
                Listed::Prefix(p) => page.common_prefixes.push(p),
            }
        }
        Ok(page)
    }

    async fn copy_object(&self, source_key: &str, destination_key: &str) -> AppResult<()> {
        self.check_reachable()?;
        if self.copy_failures_armed.load(Ordering::SeqCst) {
            let remaining = self.copies_before_failure.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(AppError::write_failure(format!(
                    "Copy of '{source_key}' rejected"
                )));
            }
            self.copies_before_failure.store(remaining - 1, Ordering::SeqCst);
        }

        let etag = self.next_etag();
        let mut objects = self.objects.write().await;
        let source = objects
            .get(source_key)
            .cloned()
            .ok_or_else(|| AppError::not_found(format!("No such key '{source_key}'")))?;
        objects.insert(
            destination_key.to_string(),
            StoredObject {
                data: source.data,
                last_modified: Utc::now(),
                etag,
            },
        );
        Ok(())
    }

    async fn delete_object(&self, key: &str) -> AppResult<()> {
        self.check_reachable()?;
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::write_failure(format!("Delete of '{key}' rejected")));
        }
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn bucket_reachable(&self) -> AppResult<bool> {
        Ok(!self.unreachable.load(Ordering::SeqCst))
    }
}

/// Hands out one shared in-memory bucket per bucket name.
#[derive(Debug, Default)]
pub struct MemoryObjectStoreConnector {
    buckets: DashMap<String, Arc<MemoryObjectStore>>,
    connects: AtomicUsize,
}

impl MemoryObjectStoreConnector {
    /// Create a connector with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// The bucket with the given name, created on first use.
    pub fn bucket(&self, name: &str) -> Arc<MemoryObjectStore> {
        self.buckets
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryObjectStore::new()))
            .clone()
    }

    /// How many clients have been handed out.
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStoreConnector for MemoryObjectStoreConnector {
    async fn connect(
        &self,
        _drive: &StorageDrive,
        details: &ObjectStorageDriveDetails,
    ) -> AppResult<Arc<dyn ObjectStoreClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let bucket: Arc<dyn ObjectStoreClient> = self.bucket(&details.bucket);
        Ok(bucket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delimiter_groups_and_paginates() {
        let store = MemoryObjectStore::new();
        for key in ["a/", "a/1.txt", "a/b/", "a/b/2.txt", "a/c/3.txt", "a/d.txt"] {
            store.put_object(key, Bytes::from_static(b"x")).await.unwrap();
        }

        let first = store.list_page("a/", Some("/"), None, 2).await.unwrap();
        let second = store
            .list_page("a/", Some("/"), first.next_token.clone(), 2)
            .await
            .unwrap();
        let third = store
            .list_page("a/", Some("/"), second.next_token.clone(), 2)
            .await
            .unwrap();

        let mut keys: Vec<String> = Vec::new();
        let mut prefixes: Vec<String> = Vec::new();
        for page in [&first, &second, &third] {
            keys.extend(page.objects.iter().map(|o| o.key.clone()));
            prefixes.extend(page.common_prefixes.iter().cloned());
        }
        assert_eq!(keys, vec!["a/", "a/1.txt", "a/d.txt"]);
        assert_eq!(prefixes, vec!["a/b/", "a/c/"]);
        assert!(third.next_token.is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = MemoryObjectStore::new();
        store.delete_object("missing").await.unwrap();
        assert!(store.head_object("missing").await.unwrap().is_none());
    }
}
