//! In-memory collaborators for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::future;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kbsync_core::{
    Category, Document, DocumentVersion, Entity, EntityMeta, EntityReference, ExportModel, Label,
    GENERATED_VALUE,
};
use kbsync_engine::{
    ContextRepository, DestinationAdapter, ItemStream, Pager, PipeContext, Processor,
    SourceAdapter, SyncError, UploadPayload,
};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn category(external_id: &str, name: &str, parent: Option<&str>) -> Category {
    Category {
        meta: EntityMeta::with_external_id(external_id),
        name: name.to_string(),
        parent_category: parent.map(EntityReference::external),
    }
}

pub fn label(external_id: &str, name: &str) -> Label {
    Label {
        meta: EntityMeta::with_external_id(external_id),
        name: name.to_string(),
        color: Some(GENERATED_VALUE.to_string()),
    }
}

pub fn document(external_id: &str, title: &str, category: &str, labels: &[&str]) -> Document {
    Document {
        meta: EntityMeta::with_external_id(external_id),
        published: Some(DocumentVersion {
            title: title.to_string(),
            category: Some(EntityReference::external(category)),
            labels: Some(labels.iter().map(|l| EntityReference::external(*l)).collect()),
            variations: vec![kbsync_core::Variation {
                name: None,
                body: Some(serde_json::json!({"blocks": [{"type": "Paragraph", "text": title}]})),
            }],
            ..DocumentVersion::default()
        }),
        draft: None,
    }
}

/// Same-source stored item with a destination id.
pub fn stored<T: Entity>(mut item: T, id: &str) -> T {
    item.meta_mut().id = Some(id.to_string());
    item
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryState {
    categories: Pager<Category>,
    labels: Pager<Label>,
    documents: Pager<Document>,
}

/// Paged in-memory source with resumable pagers.
pub struct MemorySource {
    data: ExportModel,
    page_size: usize,
    state: MemoryState,
}

impl MemorySource {
    pub fn new(data: ExportModel, page_size: usize) -> Self {
        Self {
            data,
            page_size,
            state: MemoryState::default(),
        }
    }
}

fn page_of<T: Clone>(items: &[T], page: usize, size: usize) -> Option<Vec<T>> {
    let start = page * size;
    if start >= items.len() {
        return None;
    }
    Some(items[start..(start + size).min(items.len())].to_vec())
}

fn paged<'a, T: Clone + Send + 'a>(
    pager: &'a mut Pager<T>,
    items: Vec<T>,
    size: usize,
) -> ItemStream<'a, T> {
    pager.fetch(move |page| future::ready(Ok(page_of(&items, page, size))))
}

#[async_trait]
impl SourceAdapter for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn initialize(&mut self, ctx: &PipeContext) -> Result<(), SyncError> {
        if let Some(state) = ctx.adapter_state.get("memory") {
            self.state = serde_json::from_value(state.clone())?;
        }
        Ok(())
    }

    fn categories(&mut self) -> ItemStream<'_, Category> {
        paged(&mut self.state.categories, self.data.categories.clone(), self.page_size)
    }

    fn labels(&mut self) -> ItemStream<'_, Label> {
        paged(&mut self.state.labels, self.data.labels.clone(), self.page_size)
    }

    fn documents(&mut self) -> ItemStream<'_, Document> {
        paged(&mut self.state.documents, self.data.documents.clone(), self.page_size)
    }

    fn checkpoint(&self) -> Result<Option<Value>, SyncError> {
        Ok(Some(serde_json::to_value(&self.state)?))
    }
}

// ---------------------------------------------------------------------------
// Destination
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DestinationLog {
    pub model: ExportModel,
    pub sync_calls: usize,
    pub delete_batches: Vec<usize>,
    next_id: usize,
}

/// Destination whose state the test keeps a handle to.
#[derive(Clone, Default)]
pub struct MemoryDestination {
    pub log: Arc<Mutex<DestinationLog>>,
}

impl MemoryDestination {
    pub fn with_model(model: ExportModel) -> Self {
        let destination = Self::default();
        destination.log.lock().expect("lock").model = model;
        destination
    }

    pub fn model(&self) -> ExportModel {
        self.log.lock().expect("lock").model.clone()
    }

    pub fn sync_calls(&self) -> usize {
        self.log.lock().expect("lock").sync_calls
    }

    pub fn delete_batches(&self) -> Vec<usize> {
        self.log.lock().expect("lock").delete_batches.clone()
    }
}

fn upsert<T: Entity>(existing: &mut Vec<T>, incoming: &[T], next_id: &mut usize) {
    for item in incoming {
        let mut item = item.clone();
        let slot = item
            .id()
            .and_then(|id| existing.iter().position(|e| e.id() == Some(id)));
        match slot {
            Some(index) => existing[index] = item,
            None => {
                *next_id += 1;
                item.meta_mut().id = Some(format!("{}-{next_id}", T::KIND));
                existing.push(item);
            }
        }
    }
}

#[async_trait]
impl DestinationAdapter for MemoryDestination {
    fn name(&self) -> &str {
        "memory"
    }

    async fn authenticate(&mut self) -> Result<(), SyncError> {
        Ok(())
    }

    async fn export_all_entities(&mut self) -> Result<ExportModel, SyncError> {
        Ok(self.model())
    }

    async fn sync_data(&mut self, payload: &UploadPayload) -> Result<(), SyncError> {
        let mut log = self.log.lock().expect("lock");
        log.sync_calls += 1;
        let DestinationLog { model, next_id, .. } = &mut *log;

        upsert(&mut model.categories, &payload.import_action.categories, next_id);
        upsert(&mut model.labels, &payload.import_action.labels, next_id);
        upsert(&mut model.documents, &payload.import_action.documents, next_id);
        for label in &mut model.labels {
            if label.color.as_deref() == Some(GENERATED_VALUE) {
                label.color = Some("#336699".to_string());
            }
        }

        let deletes = &payload.delete_action;
        model
            .categories
            .retain(|c| !c.id().is_some_and(|id| deletes.categories.iter().any(|d| d == id)));
        model
            .labels
            .retain(|l| !l.id().is_some_and(|id| deletes.labels.iter().any(|d| d == id)));
        Ok(())
    }

    async fn delete_articles(&mut self, ids: &[String]) -> Result<(), SyncError> {
        let mut log = self.log.lock().expect("lock");
        log.delete_batches.push(ids.len());
        log.model
            .documents
            .retain(|d| !d.id().is_some_and(|id| ids.iter().any(|i| i == id)));
        Ok(())
    }
}

/// Delegates to a [`MemoryDestination`] after sleeping in `sync_data`.
pub struct SlowUpload {
    pub inner: MemoryDestination,
    pub delay: Duration,
}

#[async_trait]
impl DestinationAdapter for SlowUpload {
    fn name(&self) -> &str {
        "slow-upload"
    }

    async fn authenticate(&mut self) -> Result<(), SyncError> {
        self.inner.authenticate().await
    }

    async fn export_all_entities(&mut self) -> Result<ExportModel, SyncError> {
        self.inner.export_all_entities().await
    }

    async fn sync_data(&mut self, payload: &UploadPayload) -> Result<(), SyncError> {
        tokio::time::sleep(self.delay).await;
        self.inner.sync_data(payload).await
    }

    async fn delete_articles(&mut self, ids: &[String]) -> Result<(), SyncError> {
        self.inner.delete_articles(ids).await
    }
}

// ---------------------------------------------------------------------------
// Checkpoint
// ---------------------------------------------------------------------------

/// Checkpoint held in memory; `clear` can be made to fail.
#[derive(Clone, Default)]
pub struct MemoryRepository {
    saved: Arc<Mutex<Option<PipeContext>>>,
    fail_clear: bool,
}

impl MemoryRepository {
    pub fn failing_clear() -> Self {
        Self {
            fail_clear: true,
            ..Self::default()
        }
    }

    pub fn saved(&self) -> Option<PipeContext> {
        self.saved.lock().expect("lock").clone()
    }
}

#[async_trait]
impl ContextRepository for MemoryRepository {
    async fn exists(&self) -> Result<bool, SyncError> {
        Ok(self.saved.lock().expect("lock").is_some())
    }

    async fn load(&self) -> Result<PipeContext, SyncError> {
        self.saved()
            .ok_or_else(|| SyncError::Validation("no checkpoint".to_string()))
    }

    async fn save(&self, ctx: &PipeContext) -> Result<(), SyncError> {
        *self.saved.lock().expect("lock") = Some(ctx.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), SyncError> {
        if self.fail_clear {
            return Err(SyncError::Validation("checkpoint store is read-only".to_string()));
        }
        *self.saved.lock().expect("lock") = None;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Processors
// ---------------------------------------------------------------------------

/// Sleeps on every document, like a slow remote lookup.
pub struct SlowDocuments(pub Duration);

#[async_trait]
impl Processor<Document> for SlowDocuments {
    fn name(&self) -> &str {
        "slow-documents"
    }

    async fn run(&self, item: Document, _ctx: &PipeContext, _first_try: bool) -> Result<Document, SyncError> {
        tokio::time::sleep(self.0).await;
        Ok(item)
    }
}

/// Reports `Interrupted` the first time it sees `target`, like a kill timer
/// firing mid-item.
pub struct InterruptOnce {
    target: String,
    fired: AtomicBool,
}

impl InterruptOnce {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            fired: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Processor<Document> for InterruptOnce {
    fn name(&self) -> &str {
        "interrupt-once"
    }

    async fn run(&self, item: Document, _ctx: &PipeContext, _first_try: bool) -> Result<Document, SyncError> {
        if item.external_id() == Some(self.target.as_str()) && !self.fired.swap(true, Ordering::SeqCst) {
            return Err(SyncError::Interrupted);
        }
        Ok(item)
    }
}
