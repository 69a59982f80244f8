//! # labtrack-core
//!
//! Core crate for LabTrack storage. Contains the unified error system,
//! configuration schemas, storage path utilities, and the transient
//! folder/file snapshots returned by storage backends.
//!
//! This crate has **no** internal dependencies on other LabTrack crates.

pub mod config;
pub mod error;
pub mod path;
pub mod result;
pub mod types;

pub use error::{AppError, ErrorKind, RelocationState};
pub use result::AppResult;
pub use types::{ListingDepth, StorageFile, StorageFolder};
