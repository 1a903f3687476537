//! Boundary contracts for source and destination systems.
//!
//! The engine never branches on vendor: everything vendor-specific lives
//! behind these traits.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Value;

use kbsync_core::{Category, Document, ExportModel, Label};

use crate::context::{ContextEntity, PipeContext};
use crate::error::SyncError;
use crate::upload::UploadPayload;

/// Lazy pull sequence of source items. Not replayable; resuming is the
/// adapter's business (see [`crate::pager::Pager`]).
pub type ItemStream<'a, T> = BoxStream<'a, Result<T, SyncError>>;

/// A system entities are pulled from.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Key of this adapter's slot in `PipeContext::adapter_state`.
    fn name(&self) -> &str;

    /// Restore resume state saved by an interrupted run, if any.
    async fn initialize(&mut self, ctx: &PipeContext) -> Result<(), SyncError>;

    fn categories(&mut self) -> ItemStream<'_, Category>;
    fn labels(&mut self) -> ItemStream<'_, Label>;
    fn documents(&mut self) -> ItemStream<'_, Document>;

    /// Resume state to persist with the checkpoint. `None` if the adapter
    /// keeps none.
    fn checkpoint(&self) -> Result<Option<Value>, SyncError>;
}

/// The knowledge base entities are pushed to.
#[async_trait]
pub trait DestinationAdapter: Send + Sync {
    fn name(&self) -> &str;
    async fn authenticate(&mut self) -> Result<(), SyncError>;
    /// Full current state of the destination.
    async fn export_all_entities(&mut self) -> Result<ExportModel, SyncError>;
    async fn sync_data(&mut self, payload: &UploadPayload) -> Result<(), SyncError>;
    /// Delete documents by destination id. Callers batch.
    async fn delete_articles(&mut self, ids: &[String]) -> Result<(), SyncError>;
}

/// Entity types a [`SourceAdapter`] can stream.
pub trait SourceEntity: ContextEntity {
    fn open<'a>(source: &'a mut dyn SourceAdapter) -> ItemStream<'a, Self>;
}

impl SourceEntity for Category {
    fn open<'a>(source: &'a mut dyn SourceAdapter) -> ItemStream<'a, Self> {
        source.categories()
    }
}

impl SourceEntity for Label {
    fn open<'a>(source: &'a mut dyn SourceAdapter) -> ItemStream<'a, Self> {
        source.labels()
    }
}

impl SourceEntity for Document {
    fn open<'a>(source: &'a mut dyn SourceAdapter) -> ItemStream<'a, Self> {
        source.documents()
    }
}
