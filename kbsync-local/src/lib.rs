//! Filesystem adapters for kbsync.
//!
//! - [`LocalSource`] reads `categories.json`, `labels.json` and
//!   `documents.json` from an export directory and serves them page by page.
//! - [`LocalDestination`] keeps the whole knowledge base in one
//!   `knowledge-base.json` file.

pub mod destination;
pub mod source;

use std::path::Path;

use kbsync_core::{AdapterConfig, SyncConfig};
use kbsync_engine::SyncError;

pub use destination::{LocalDestination, KNOWLEDGE_BASE_FILE};
pub use source::LocalSource;

/// Build the source adapter a config section describes.
pub fn source_from_config(config: &SyncConfig) -> Result<LocalSource, SyncError> {
    match &config.source {
        Some(AdapterConfig::Local { path }) => Ok(LocalSource::new(path, config.page_size)),
        None => Err(SyncError::Validation("missing `source` section".to_string())),
    }
}

/// Build the destination adapter a config section describes.
pub fn destination_from_config(config: &SyncConfig) -> Result<LocalDestination, SyncError> {
    match &config.destination {
        Some(AdapterConfig::Local { path }) => Ok(LocalDestination::new(path)),
        None => Err(SyncError::Validation(
            "missing `destination` section".to_string(),
        )),
    }
}

pub(crate) fn io_err(path: &Path, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.to_path_buf(),
        source,
    }
}
