//! Checkpoint persistence for [`PipeContext`].
//!
//! The file repository keeps the whole context as one pretty-printed JSON
//! document. Writes use the atomic `.tmp` + rename pattern so an interrupted
//! save never leaves a truncated checkpoint behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;

use crate::context::PipeContext;
use crate::error::{io_err, SyncError};

/// Storage for the resumable run state.
#[async_trait]
pub trait ContextRepository: Send + Sync {
    async fn exists(&self) -> Result<bool, SyncError>;
    async fn load(&self) -> Result<PipeContext, SyncError>;
    async fn save(&self, ctx: &PipeContext) -> Result<(), SyncError>;
    /// Discard the checkpoint. Missing checkpoint is not an error.
    async fn clear(&self) -> Result<(), SyncError>;
}

/// Checkpoint stored as a JSON file, conventionally `context.json`.
#[derive(Debug, Clone)]
pub struct FileContextRepository {
    path: PathBuf,
}

impl FileContextRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        self.path.with_extension("json.tmp")
    }
}

#[async_trait]
impl ContextRepository for FileContextRepository {
    async fn exists(&self) -> Result<bool, SyncError> {
        tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| io_err(&self.path, e))
    }

    async fn load(&self) -> Result<PipeContext, SyncError> {
        let contents = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| io_err(&self.path, e))?;
        let ctx = serde_json::from_str(&contents)?;
        tracing::debug!(path = %self.path.display(), "checkpoint loaded");
        Ok(ctx)
    }

    async fn save(&self, ctx: &PipeContext) -> Result<(), SyncError> {
        let Some(dir) = self.path.parent() else {
            return Err(io_err(
                &self.path,
                std::io::Error::other("invalid checkpoint path"),
            ));
        };
        if !dir.as_os_str().is_empty() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| io_err(dir, e))?;
        }

        let mut stamped = ctx.clone();
        stamped.saved_at = Some(Utc::now());
        let json = serde_json::to_string_pretty(&stamped)?;

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| io_err(&self.path, e))?;
        tracing::info!(path = %self.path.display(), "checkpoint saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), SyncError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), "checkpoint cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(&self.path, e)),
        }
    }
}
