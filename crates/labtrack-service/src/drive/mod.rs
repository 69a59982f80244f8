//! Drive administration service.

pub mod service;

pub use service::{DriveHealth, DriveService, UpdateDriveRequest};
