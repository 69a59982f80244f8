//! # labtrack-entity
//!
//! Persisted record models for the LabTrack storage layer. Every struct in
//! this crate represents a database table row or a tagged sub-record stored
//! alongside one. Database rows derive `sqlx::FromRow`.

pub mod drive;
pub mod folder;
pub mod link;

pub use drive::{
    CreateStorageDrive, DocumentApiDriveDetails, DriveDetails, DriveType, ExistingFolderPolicy,
    LocalDriveDetails, ObjectStorageDriveDetails, StorageDrive,
};
pub use folder::{CreateStorageDriveFolder, DriveFolderDetails, FolderOptions, StorageDriveFolder};
pub use link::{BindingState, EntityFolderLink, EntityKind, EntityRef};
