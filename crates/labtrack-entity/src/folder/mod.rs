//! Folder binding entities.

pub mod details;
pub mod model;

pub use details::DriveFolderDetails;
pub use model::{CreateStorageDriveFolder, FolderOptions, StorageDriveFolder};
