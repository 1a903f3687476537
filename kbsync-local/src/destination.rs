//! Single-file knowledge base.
//!
//! The file holds an [`ExportModel`]. Every mutation reads the file, applies
//! the change and writes it back with the `.tmp` + rename pattern.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use uuid::Uuid;

use kbsync_core::{
    Category, Document, Entity, EntityReference, ExportModel, Label, GENERATED_VALUE,
};
use kbsync_engine::{DestinationAdapter, SyncError, UploadPayload};

use crate::io_err;

pub const KNOWLEDGE_BASE_FILE: &str = "knowledge-base.json";

const PALETTE: &[&str] = &[
    "#1F77B4", "#FF7F0E", "#2CA02C", "#D62728", "#9467BD", "#8C564B", "#E377C2", "#17BECF",
];

/// Destination backed by `<dir>/knowledge-base.json`.
#[derive(Debug, Clone)]
pub struct LocalDestination {
    dir: PathBuf,
}

impl LocalDestination {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(KNOWLEDGE_BASE_FILE)
    }

    /// Current contents; an absent file is an empty knowledge base.
    pub async fn read(&self) -> Result<ExportModel, SyncError> {
        let path = self.path();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ExportModel::default()),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    async fn write(&self, model: &ExportModel) -> Result<(), SyncError> {
        let path = self.path();
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(model)?;
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|e| io_err(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_err(&path, e))
    }
}

/// Insert or replace by destination id. New items get a fresh id.
fn upsert<T: Entity>(existing: &mut Vec<T>, incoming: &[T]) -> usize {
    let mut created = 0;
    for item in incoming {
        let mut item = item.clone();
        let slot = item
            .id()
            .and_then(|id| existing.iter().position(|e| e.id() == Some(id)));
        match slot {
            Some(index) => existing[index] = item,
            None => {
                item.meta_mut().id = Some(Uuid::new_v4().to_string());
                existing.push(item);
                created += 1;
            }
        }
    }
    created
}

fn remove_ids<T: Entity>(items: &mut Vec<T>, ids: &[String]) -> usize {
    let before = items.len();
    items.retain(|item| !item.id().is_some_and(|id| ids.iter().any(|d| d == id)));
    before - items.len()
}

/// Destination id and name per external id.
fn index<T: Entity>(items: &[T]) -> BTreeMap<String, (Option<String>, Option<String>)> {
    items
        .iter()
        .filter_map(|item| {
            let external_id = item.external_id()?;
            Some((
                external_id.to_string(),
                (item.id().map(str::to_owned), item.name().map(str::to_owned)),
            ))
        })
        .collect()
}

fn link(
    reference: &mut EntityReference,
    index: &BTreeMap<String, (Option<String>, Option<String>)>,
) {
    let Some(external_id) = reference.external_id.as_deref() else {
        return;
    };
    if let Some((id, name)) = index.get(external_id) {
        if reference.id.is_none() {
            reference.id = id.clone();
        }
        if reference.name.is_none() {
            reference.name = name.clone();
        }
    }
}

/// Point references created in the same payload at their new ids.
fn link_references(model: &mut ExportModel) {
    let categories = index(&model.categories);
    let labels = index(&model.labels);

    for category in &mut model.categories {
        if let Some(parent) = category.parent_category.as_mut() {
            link(parent, &categories);
        }
    }
    for document in &mut model.documents {
        for version in document.versions_mut() {
            if let Some(category) = version.category.as_mut() {
                link(category, &categories);
            }
            for label in version.labels.iter_mut().flatten() {
                link(label, &labels);
            }
        }
    }
}

fn assign_colors(labels: &mut [Label]) {
    for (n, label) in labels.iter_mut().enumerate() {
        if label.color.as_deref() == Some(GENERATED_VALUE) {
            label.color = Some(PALETTE[n % PALETTE.len()].to_string());
        }
    }
}

#[async_trait]
impl DestinationAdapter for LocalDestination {
    fn name(&self) -> &str {
        "local"
    }

    async fn authenticate(&mut self) -> Result<(), SyncError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| io_err(&self.dir, e))
    }

    async fn export_all_entities(&mut self) -> Result<ExportModel, SyncError> {
        self.read().await
    }

    async fn sync_data(&mut self, payload: &UploadPayload) -> Result<(), SyncError> {
        let mut model = self.read().await?;
        let imports = &payload.import_action;
        let deletes = &payload.delete_action;

        let created = upsert::<Category>(&mut model.categories, &imports.categories)
            + upsert::<Label>(&mut model.labels, &imports.labels)
            + upsert::<Document>(&mut model.documents, &imports.documents);
        let removed = remove_ids(&mut model.categories, &deletes.categories)
            + remove_ids(&mut model.labels, &deletes.labels)
            + remove_ids(&mut model.documents, &deletes.documents);

        assign_colors(&mut model.labels);
        link_references(&mut model);
        self.write(&model).await?;
        tracing::info!(path = %self.path().display(), created, removed, "knowledge base written");
        Ok(())
    }

    async fn delete_articles(&mut self, ids: &[String]) -> Result<(), SyncError> {
        let mut model = self.read().await?;
        let removed = remove_ids(&mut model.documents, ids);
        self.write(&model).await?;
        tracing::debug!(requested = ids.len(), removed, "documents deleted");
        Ok(())
    }
}
