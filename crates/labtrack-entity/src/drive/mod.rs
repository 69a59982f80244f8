//! Storage drive entities.

pub mod details;
pub mod kind;
pub mod model;

pub use details::{
    DocumentApiDriveDetails, DriveDetails, ExistingFolderPolicy, LocalDriveDetails,
    ObjectStorageDriveDetails,
};
pub use kind::DriveType;
pub use model::{CreateStorageDrive, StorageDrive};
