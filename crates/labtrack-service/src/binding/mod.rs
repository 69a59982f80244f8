//! Folder binding service.

pub mod service;

pub use service::{CreateEntityFolderRequest, FolderBindingService};
