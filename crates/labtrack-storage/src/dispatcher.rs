//! Backend dispatcher: routes a drive to the backend registered for its kind.

use std::sync::Arc;

use tracing::info;

use labtrack_core::config::StorageConfig;
use labtrack_core::{AppError, AppResult};
use labtrack_entity::{DriveType, StorageDrive};

use crate::backend::StorageBackend;
use crate::providers::LocalStorageBackend;

/// One backend slot per drive kind, fixed at process start.
#[derive(Debug, Clone, Default)]
pub struct StorageDispatcher {
    local: Option<Arc<dyn StorageBackend>>,
    object_storage: Option<Arc<dyn StorageBackend>>,
    document_api: Option<Arc<dyn StorageBackend>>,
}

impl StorageDispatcher {
    /// Start building a dispatcher.
    pub fn builder() -> StorageDispatcherBuilder {
        StorageDispatcherBuilder::default()
    }

    /// Build the dispatcher described by the storage configuration.
    pub fn from_config(config: &StorageConfig) -> AppResult<Self> {
        let policy = config.existence_check;
        let mut builder = Self::builder();

        if config.local.enabled {
            builder = builder.local(Arc::new(LocalStorageBackend::new(policy)));
        }

        if config.object_storage.enabled {
            #[cfg(feature = "s3")]
            {
                use crate::providers::object_storage::{ObjectStorageBackend, S3Connector};
                builder = builder.object_storage(Arc::new(ObjectStorageBackend::new(
                    Arc::new(S3Connector),
                    &config.object_storage,
                    policy,
                )));
            }
            #[cfg(not(feature = "s3"))]
            return Err(AppError::configuration(
                "Object storage is enabled but this build lacks the `s3` feature",
            ));
        }

        if config.document_api.enabled {
            #[cfg(feature = "document-api")]
            {
                use crate::providers::document_api::{DocumentApiBackend, HttpDocumentApiConnector};
                let timeout =
                    std::time::Duration::from_secs(config.document_api.request_timeout_seconds);
                builder = builder.document_api(Arc::new(DocumentApiBackend::new(
                    Arc::new(HttpDocumentApiConnector::new(timeout)),
                    policy,
                )));
            }
            #[cfg(not(feature = "document-api"))]
            return Err(AppError::configuration(
                "The document API is enabled but this build lacks the `document-api` feature",
            ));
        }

        let dispatcher = builder.build();
        info!(
            backends = ?dispatcher.registered_kinds(),
            existence_check = ?policy,
            "Storage dispatcher ready"
        );
        Ok(dispatcher)
    }

    /// The backend registered for `kind`.
    pub fn resolve(&self, kind: DriveType) -> AppResult<Arc<dyn StorageBackend>> {
        let slot = match kind {
            DriveType::Local => &self.local,
            DriveType::ObjectStorage => &self.object_storage,
            DriveType::DocumentApi => &self.document_api,
        };
        slot.clone().ok_or_else(|| {
            AppError::configuration(format!("Storage backend not configured for kind '{kind}'"))
        })
    }

    /// The backend serving `drive`. Inactive drives are refused.
    pub fn for_drive(&self, drive: &StorageDrive) -> AppResult<Arc<dyn StorageBackend>> {
        if !drive.is_active() {
            return Err(AppError::configuration(format!(
                "Drive '{}' is inactive",
                drive.display_name
            )));
        }
        drive.ensure_consistent()?;
        self.resolve(drive.drive_type)
    }

    /// Let the drive's backend release what it holds for the drive.
    pub fn forget_drive(&self, drive: &StorageDrive) {
        if let Ok(backend) = self.resolve(drive.drive_type) {
            backend.forget_drive(drive);
        }
    }

    /// Kinds that have a backend.
    pub fn registered_kinds(&self) -> Vec<DriveType> {
        DriveType::ALL
            .into_iter()
            .filter(|kind| self.resolve(*kind).is_ok())
            .collect()
    }
}

/// Builder for [`StorageDispatcher`].
#[derive(Debug, Default)]
pub struct StorageDispatcherBuilder {
    dispatcher: StorageDispatcher,
}

impl StorageDispatcherBuilder {
    /// Register the local filesystem backend.
    pub fn local(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.dispatcher.local = Some(backend);
        self
    }

    /// Register the object-storage backend.
    pub fn object_storage(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.dispatcher.object_storage = Some(backend);
        self
    }

    /// Register the document-API backend.
    pub fn document_api(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.dispatcher.document_api = Some(backend);
        self
    }

    /// Register a backend in the slot of the kind it reports.
    pub fn with_backend(self, backend: Arc<dyn StorageBackend>) -> Self {
        match backend.kind() {
            DriveType::Local => self.local(backend),
            DriveType::ObjectStorage => self.object_storage(backend),
            DriveType::DocumentApi => self.document_api(backend),
        }
    }

    /// Finish building.
    pub fn build(self) -> StorageDispatcher {
        self.dispatcher
    }
}
