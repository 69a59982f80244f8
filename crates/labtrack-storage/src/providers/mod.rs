//! Storage backend implementations.

pub mod document_api;
pub mod local;
pub mod object_storage;

pub use document_api::DocumentApiBackend;
pub use local::LocalStorageBackend;
pub use object_storage::ObjectStorageBackend;
