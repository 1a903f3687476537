//! Error types for kbsync-engine.

use std::path::PathBuf;

use thiserror::Error;

use kbsync_core::{ConfigError, EntityType, ErrorBody};

/// All errors that can arise from a sync pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Cooperative cancellation; the run unwinds to the checkpoint step.
    #[error("interrupted")]
    Interrupted,

    /// Item-level content-shape problem that may resolve on retry.
    #[error("transformation error: {0}")]
    Transformation(String),

    /// A referenced parent, category or label is not known yet.
    #[error("missing {kind} reference '{reference}'")]
    MissingReference { kind: EntityType, reference: String },

    /// Policy violation that needs an operator configuration change.
    #[error("configuration required: {0}")]
    Configurer(String),

    /// A required collaborator or value is missing at initialization.
    #[error("validation error: {0}")]
    Validation(String),

    /// Adapter HTTP or protocol failure.
    #[error("API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api {
        status: Option<u16>,
        message: String,
    },

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    /// Attachment or image fetch failure.
    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (checkpoint, payloads).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl SyncError {
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SyncError::Interrupted)
    }

    /// `Transformation` and its `MissingReference` subtype.
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            SyncError::Transformation(_) | SyncError::MissingReference { .. }
        )
    }

    /// Run-level faults the Worker never converts into a failed item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Configurer(_) | SyncError::Validation(_))
    }

    /// Stable kind name written into failed-item records.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Interrupted => "Interrupted",
            SyncError::Transformation(_) => "TransformationError",
            SyncError::MissingReference { .. } => "MissingReferenceError",
            SyncError::Configurer(_) => "ConfigurerError",
            SyncError::Validation(_) => "ValidationError",
            SyncError::Api { .. } => "ApiError",
            SyncError::InvalidCredentials(_) => "InvalidCredentialsError",
            SyncError::Download { .. } => "DownloadError",
            SyncError::Io { .. } => "IoError",
            SyncError::Json(_) => "JsonError",
            SyncError::Config(_) => "ConfigError",
        }
    }

    /// Normalized body stored on a `FailedEntity`.
    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind().to_string(),
            message: self.to_string(),
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
