//! Convenience result type alias for LabTrack.

use crate::error::AppError;

/// A specialized `Result` type for LabTrack operations.
pub type AppResult<T> = Result<T, AppError>;
