//! In-memory repositories for tests and single-process tooling.
//!
//! They enforce the same uniqueness rules as the PostgreSQL schema.

mod drive;
mod folder;
mod link;

use chrono::{DateTime, Utc};

pub use drive::MemoryStorageDriveRepository;
pub use folder::MemoryStorageDriveFolderRepository;
pub use link::MemoryEntityFolderLinkRepository;

/// A fresh `updated_at` that is strictly later than the previous one.
fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}
