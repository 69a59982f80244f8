//! Startup registration of configured drives and their root folders.

use std::str::FromStr;

use tracing::{debug, info};

use labtrack_core::config::{DriveSettings, RootFolderSettings, StorageConfig};
use labtrack_core::{AppError, AppResult};
use labtrack_entity::{
    CreateStorageDrive, DocumentApiDriveDetails, DriveDetails, DriveType, ExistingFolderPolicy,
    FolderOptions, LocalDriveDetails, ObjectStorageDriveDetails, StorageDrive,
};

use crate::binding::FolderBindingService;
use crate::drive::DriveService;

/// What an initialization run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitializationReport {
    /// Drives newly registered.
    pub drives_registered: usize,
    /// Drives that already existed.
    pub drives_existing: usize,
    /// Root folder bindings ensured.
    pub root_folders: usize,
}

/// Registers the drives listed in configuration.
#[derive(Debug, Clone)]
pub struct StorageInitializer {
    drives: DriveService,
    bindings: FolderBindingService,
}

impl StorageInitializer {
    /// Creates a new initializer.
    pub fn new(drives: DriveService, bindings: FolderBindingService) -> Self {
        Self { drives, bindings }
    }

    /// Register every configured drive (by display name, idempotently) and
    /// make sure each active drive has at least one root folder.
    pub async fn initialize(&self, config: &StorageConfig) -> AppResult<InitializationReport> {
        let mut report = InitializationReport::default();

        for settings in &config.drives {
            let drive = match self.drives.find_by_name(&settings.name).await? {
                Some(existing) => {
                    debug!(name = %existing.display_name, "Drive already registered");
                    report.drives_existing += 1;
                    existing
                }
                None => {
                    let data = drive_from_settings(settings, config)?;
                    let drive = self.drives.register(data).await?;
                    report.drives_registered += 1;
                    drive
                }
            };

            if !drive.is_active() {
                debug!(name = %drive.display_name, "Skipping root folders of inactive drive");
                continue;
            }
            report.root_folders += self.ensure_roots(&drive, &settings.root_folders).await?;
        }

        info!(
            registered = report.drives_registered,
            existing = report.drives_existing,
            root_folders = report.root_folders,
            "Storage initialized"
        );
        Ok(report)
    }

    async fn ensure_roots(
        &self,
        drive: &StorageDrive,
        roots: &[RootFolderSettings],
    ) -> AppResult<usize> {
        if roots.is_empty() {
            // The drive root doubles as browser and study root.
            self.bindings
                .register_root_folder(drive.id, "", &drive.display_name, FolderOptions::study_root())
                .await?;
            return Ok(1);
        }

        for root in roots {
            let options = FolderOptions {
                write_enabled: root.write_enabled,
                delete_enabled: root.delete_enabled,
                browser_root: root.browser_root,
                study_root: root.study_root,
            };
            self.bindings
                .register_root_folder(drive.id, &root.path, &root.name, options)
                .await?;
        }
        Ok(roots.len())
    }
}

/// Build registration data from a configured drive.
pub fn drive_from_settings(
    settings: &DriveSettings,
    config: &StorageConfig,
) -> AppResult<CreateStorageDrive> {
    let missing = |field: &str| {
        AppError::configuration(format!(
            "Drive '{}' is missing required setting '{field}'",
            settings.name
        ))
    };

    let details = match DriveType::from_str(&settings.kind)? {
        DriveType::Local => DriveDetails::Local(LocalDriveDetails {
            root_path: settings.root_path.clone(),
            existing_folder_policy: settings
                .existing_folder_policy
                .as_deref()
                .map(ExistingFolderPolicy::from_str)
                .transpose()?
                .unwrap_or_default(),
        }),
        DriveType::ObjectStorage => DriveDetails::ObjectStorage(ObjectStorageDriveDetails {
            bucket: settings.bucket.clone().ok_or_else(|| missing("bucket"))?,
            region: settings
                .region
                .clone()
                .unwrap_or_else(|| config.object_storage.default_region.clone()),
            endpoint: settings.endpoint.clone(),
            access_key_id: settings.access_key_id.clone(),
            secret_access_key: settings.secret_access_key.clone(),
            force_path_style: settings.force_path_style,
        }),
        DriveType::DocumentApi => DriveDetails::DocumentApi(DocumentApiDriveDetails {
            base_url: settings.base_url.clone().ok_or_else(|| missing("base_url"))?,
            tenant: settings.tenant.clone().ok_or_else(|| missing("tenant"))?,
            api_token: settings.api_token.clone().ok_or_else(|| missing("api_token"))?,
            root_folder_id: None,
        }),
    };

    let data = CreateStorageDrive::new(settings.name.clone(), settings.root_path.clone(), details);
    data.validate()?;
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use labtrack_core::ErrorKind;

    fn settings(kind: &str) -> DriveSettings {
        DriveSettings {
            name: "Primary".into(),
            kind: kind.into(),
            root_path: "/data".into(),
            existing_folder_policy: None,
            bucket: None,
            region: None,
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            force_path_style: false,
            base_url: None,
            tenant: None,
            api_token: None,
            root_folders: Vec::new(),
        }
    }

    #[test]
    fn test_local_settings() {
        let mut local = settings("local");
        local.existing_folder_policy = Some("use_existing".into());
        let data = drive_from_settings(&local, &StorageConfig::default()).unwrap();
        assert_eq!(data.drive_type(), DriveType::Local);
        match data.details {
            DriveDetails::Local(d) => {
                assert_eq!(d.existing_folder_policy, ExistingFolderPolicy::UseExisting)
            }
            other => panic!("unexpected details {other:?}"),
        }
    }

    #[test]
    fn test_object_storage_uses_default_region() {
        let mut s3 = settings("object_storage");
        s3.bucket = Some("bucket1".into());
        let data = drive_from_settings(&s3, &StorageConfig::default()).unwrap();
        match data.details {
            DriveDetails::ObjectStorage(d) => assert_eq!(d.region, "us-east-1"),
            other => panic!("unexpected details {other:?}"),
        }

        let err = drive_from_settings(&settings("object_storage"), &StorageConfig::default())
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_unknown_kind() {
        let err = drive_from_settings(&settings("ftp"), &StorageConfig::default()).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }
}
