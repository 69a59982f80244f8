//! Repository traits and their PostgreSQL implementations.

pub mod drive;
pub mod folder;
pub mod link;

pub use drive::{PgStorageDriveRepository, StorageDriveRepository};
pub use folder::{PgStorageDriveFolderRepository, StorageDriveFolderRepository};
pub use link::{EntityFolderLinkRepository, PgEntityFolderLinkRepository};
