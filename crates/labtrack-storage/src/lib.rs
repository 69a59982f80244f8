//! # labtrack-storage
//!
//! The backend-agnostic folder/file contract, its three implementations
//! (local filesystem, S3-compatible object storage, document-management
//! REST API), and the dispatcher that routes a drive to its backend.
//!
//! Object storage and the document API talk to their services through
//! client traits. Real clients sit behind the `s3` and `document-api`
//! features; in-memory clients are always available.

pub mod backend;
pub mod cache;
pub mod dispatcher;
pub mod providers;

pub use backend::StorageBackend;
pub use dispatcher::{StorageDispatcher, StorageDispatcherBuilder};
pub use providers::{DocumentApiBackend, LocalStorageBackend, ObjectStorageBackend};
