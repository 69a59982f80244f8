//! Unified application error types for LabTrack.
//!
//! Backend implementations map every client error into [`AppError`] at their
//! boundary, so the binding service only ever sees the kinds listed in
//! [`ErrorKind`].

use std::fmt;
use thiserror::Error;

/// Top-level error kind categorization used across the entire application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    /// The folder, file, drive, or binding does not exist.
    NotFound,
    /// The creation target already exists under a policy that forbids reuse.
    Duplicate,
    /// The backend rejected a write (quota, transport, backend-side permission).
    WriteFailure,
    /// The folder binding does not allow the requested write.
    InsufficientPrivileges,
    /// No backend is registered for a drive kind, or drive details are incomplete.
    Configuration,
    /// Input validation failed.
    Validation,
    /// A database error occurred.
    Database,
    /// A serialization/deserialization error occurred.
    Serialization,
    /// An internal error occurred.
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::Duplicate => write!(f, "DUPLICATE"),
            Self::WriteFailure => write!(f, "WRITE_FAILURE"),
            Self::InsufficientPrivileges => write!(f, "INSUFFICIENT_PRIVILEGES"),
            Self::Configuration => write!(f, "CONFIGURATION"),
            Self::Validation => write!(f, "VALIDATION"),
            Self::Database => write!(f, "DATABASE"),
            Self::Serialization => write!(f, "SERIALIZATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Which side of a folder relocation survived a failed relocate.
///
/// Relocations on backends without an atomic rename are copy-then-delete;
/// the caller uses this to reconcile instead of assuming atomicity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelocationState {
    /// Only the source is present; nothing was relocated.
    SourceOnly,
    /// Only the destination is present; the relocation effectively completed.
    DestinationOnly,
    /// Both source and destination are present (copy done, delete incomplete).
    Both,
    /// Neither side could be found.
    Neither,
}

impl RelocationState {
    /// Build a state from the observed presence of each side.
    pub fn observed(source_exists: bool, destination_exists: bool) -> Self {
        match (source_exists, destination_exists) {
            (true, false) => Self::SourceOnly,
            (false, true) => Self::DestinationOnly,
            (true, true) => Self::Both,
            (false, false) => Self::Neither,
        }
    }

    /// Whether the source still exists.
    pub fn source_exists(&self) -> bool {
        matches!(self, Self::SourceOnly | Self::Both)
    }

    /// Whether the destination exists.
    pub fn destination_exists(&self) -> bool {
        matches!(self, Self::DestinationOnly | Self::Both)
    }
}

impl fmt::Display for RelocationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceOnly => write!(f, "source only"),
            Self::DestinationOnly => write!(f, "destination only"),
            Self::Both => write!(f, "source and destination"),
            Self::Neither => write!(f, "neither source nor destination"),
        }
    }
}

/// The unified application error used throughout LabTrack.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// The category of error.
    pub kind: ErrorKind,
    /// A human-readable error message.
    pub message: String,
    /// Optional underlying cause.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
    /// Post-failure state of a relocation, when the failed operation was one.
    pub relocation: Option<RelocationState>,
}

impl AppError {
    /// Create a new application error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
            relocation: None,
        }
    }

    /// Create a new application error with an underlying cause.
    pub fn with_source(
        kind: ErrorKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            message: message.into(),
            source: Some(Box::new(source)),
            relocation: None,
        }
    }

    /// Attach the observed relocation state to this error.
    pub fn with_relocation(mut self, state: RelocationState) -> Self {
        self.relocation = Some(state);
        self
    }

    /// Create a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Create a duplicate error.
    pub fn duplicate(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Duplicate, message)
    }

    /// Create a write-failure error.
    pub fn write_failure(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::WriteFailure, message)
    }

    /// Create an insufficient-privileges error.
    pub fn insufficient_privileges(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InsufficientPrivileges, message)
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Database, message)
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Check whether this error is of the given kind.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl Clone for AppError {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            source: None,
            relocation: self.relocation,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::with_source(
            ErrorKind::Serialization,
            format!("JSON serialization error: {err}"),
            err,
        )
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            std::io::ErrorKind::AlreadyExists => ErrorKind::Duplicate,
            _ => ErrorKind::WriteFailure,
        };
        Self::with_source(kind, format!("I/O error: {err}"), err)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::with_source(
            ErrorKind::Configuration,
            format!("Configuration error: {err}"),
            err,
        )
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let kind = match &err {
            sqlx::Error::RowNotFound => ErrorKind::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => ErrorKind::Duplicate,
            _ => ErrorKind::Database,
        };
        Self::with_source(kind, format!("Database error: {err}"), err)
    }
}
