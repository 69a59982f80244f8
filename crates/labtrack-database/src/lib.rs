//! # labtrack-database
//!
//! PostgreSQL connection management, migrations, and the repositories for
//! storage drives, folder bindings, and entity links. Every repository is a
//! trait with a PostgreSQL implementation and an in-memory implementation
//! for tests and single-process tooling.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use memory::{
    MemoryEntityFolderLinkRepository, MemoryStorageDriveFolderRepository,
    MemoryStorageDriveRepository,
};
pub use repositories::{
    EntityFolderLinkRepository, PgEntityFolderLinkRepository, PgStorageDriveFolderRepository,
    PgStorageDriveRepository, StorageDriveFolderRepository, StorageDriveRepository,
};
