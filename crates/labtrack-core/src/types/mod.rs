//! Core type definitions used across the LabTrack workspace.

pub mod storage;

pub use storage::{ListingDepth, StorageFile, StorageFolder, mime_from_path};
