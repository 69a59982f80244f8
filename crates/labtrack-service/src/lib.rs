//! # labtrack-service
//!
//! Application services over the storage layer. Each service receives its
//! repositories and the backend dispatcher at construction time as `Arc`
//! references.
//!
//! [`FolderBindingService`] is the only writer of folder bindings and
//! entity links.

pub mod binding;
pub mod drive;
pub mod initializer;

pub use binding::{CreateEntityFolderRequest, FolderBindingService};
pub use drive::{DriveHealth, DriveService, UpdateDriveRequest};
pub use initializer::{InitializationReport, StorageInitializer};
