//! Export-directory source.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::future;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kbsync_core::{Category, Document, ExportModel, Label};
use kbsync_engine::{ItemStream, Pager, PipeContext, SourceAdapter, SyncError};

use crate::io_err;

const NAME: &str = "local";

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocalState {
    categories: Pager<Category>,
    labels: Pager<Label>,
    documents: Pager<Document>,
}

/// Reads one JSON array per entity type from `dir`. A missing file means
/// the source has no items of that type.
pub struct LocalSource {
    dir: PathBuf,
    page_size: usize,
    data: ExportModel,
    state: LocalState,
}

impl LocalSource {
    pub fn new(dir: impl Into<PathBuf>, page_size: usize) -> Self {
        Self {
            dir: dir.into(),
            page_size: page_size.max(1),
            data: ExportModel::default(),
            state: LocalState::default(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

async fn read_items<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SyncError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(serde_json::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(io_err(path, e)),
    }
}

fn page_of<T: Clone>(items: &[T], page: usize, size: usize) -> Option<Vec<T>> {
    let start = page.checked_mul(size)?;
    if start >= items.len() {
        return None;
    }
    let end = (start + size).min(items.len());
    Some(items[start..end].to_vec())
}

fn paged<'a, T: Clone + Send + Sync + 'a>(
    pager: &'a mut Pager<T>,
    items: &'a [T],
    size: usize,
) -> ItemStream<'a, T> {
    pager.fetch(move |page| future::ready(Ok(page_of(items, page, size))))
}

#[async_trait]
impl SourceAdapter for LocalSource {
    fn name(&self) -> &str {
        NAME
    }

    async fn initialize(&mut self, ctx: &PipeContext) -> Result<(), SyncError> {
        self.data = ExportModel {
            categories: read_items(&self.dir.join("categories.json")).await?,
            labels: read_items(&self.dir.join("labels.json")).await?,
            documents: read_items(&self.dir.join("documents.json")).await?,
        };
        self.state = match ctx.adapter_state.get(NAME) {
            Some(saved) => serde_json::from_value(saved.clone())?,
            None => LocalState::default(),
        };
        tracing::debug!(
            dir = %self.dir.display(),
            categories = self.data.categories.len(),
            labels = self.data.labels.len(),
            documents = self.data.documents.len(),
            "local export loaded"
        );
        Ok(())
    }

    fn categories(&mut self) -> ItemStream<'_, Category> {
        paged(&mut self.state.categories, &self.data.categories, self.page_size)
    }

    fn labels(&mut self) -> ItemStream<'_, Label> {
        paged(&mut self.state.labels, &self.data.labels, self.page_size)
    }

    fn documents(&mut self) -> ItemStream<'_, Document> {
        paged(&mut self.state.documents, &self.data.documents, self.page_size)
    }

    fn checkpoint(&self) -> Result<Option<Value>, SyncError> {
        Ok(Some(serde_json::to_value(&self.state)?))
    }
}
