//! Turning a diff into destination calls.

use serde::{Deserialize, Serialize};

use kbsync_core::{Entity, ExportModel, ImportableContent, SyncableContents};

use crate::adapter::DestinationAdapter;
use crate::error::SyncError;

/// Documents deleted per `delete_articles` call.
pub const DELETE_BATCH_SIZE: usize = 100;

/// Destination ids to delete, per entity type.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAction {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub documents: Vec<String>,
}

impl DeleteAction {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.labels.is_empty() && self.documents.is_empty()
    }
}

/// What the destination receives: created ∪ updated to import, ids to delete.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub import_action: ExportModel,
    pub delete_action: DeleteAction,
}

impl UploadPayload {
    pub fn from_contents(contents: &SyncableContents) -> Self {
        Self {
            import_action: ExportModel {
                categories: imports(&contents.categories),
                labels: imports(&contents.labels),
                documents: imports(&contents.documents),
            },
            delete_action: DeleteAction {
                categories: delete_ids(&contents.categories),
                labels: delete_ids(&contents.labels),
                documents: delete_ids(&contents.documents),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        let imports = &self.import_action;
        imports.categories.is_empty()
            && imports.labels.is_empty()
            && imports.documents.is_empty()
            && self.delete_action.is_empty()
    }
}

fn imports<T: Clone>(content: &ImportableContent<T>) -> Vec<T> {
    content
        .created
        .iter()
        .chain(content.updated.iter())
        .cloned()
        .collect()
}

/// Items that were never created remotely have nothing to delete.
fn delete_ids<T: Entity>(content: &ImportableContent<T>) -> Vec<String> {
    content
        .deleted
        .iter()
        .filter_map(|item| item.id().map(str::to_owned))
        .collect()
}

/// Per-type counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EntityCounts {
    pub categories: usize,
    pub labels: usize,
    pub documents: usize,
}

impl EntityCounts {
    pub fn total(&self) -> usize {
        self.categories + self.labels + self.documents
    }
}

/// What an upload actually sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploadSummary {
    pub imported: EntityCounts,
    pub deleted: EntityCounts,
    /// Nothing to send; the destination was not called.
    pub skipped: bool,
}

/// Push a diff to the destination.
///
/// Imports plus category/label deletions go through one `sync_data` call;
/// documents are deleted through `delete_articles` in batches of
/// [`DELETE_BATCH_SIZE`].
pub async fn upload(
    destination: &mut dyn DestinationAdapter,
    contents: &SyncableContents,
) -> Result<UploadSummary, SyncError> {
    let mut payload = UploadPayload::from_contents(contents);
    if payload.is_empty() {
        tracing::info!("nothing to upload");
        return Ok(UploadSummary {
            skipped: true,
            ..UploadSummary::default()
        });
    }

    let documents_to_delete = std::mem::take(&mut payload.delete_action.documents);
    let summary = UploadSummary {
        imported: EntityCounts {
            categories: payload.import_action.categories.len(),
            labels: payload.import_action.labels.len(),
            documents: payload.import_action.documents.len(),
        },
        deleted: EntityCounts {
            categories: payload.delete_action.categories.len(),
            labels: payload.delete_action.labels.len(),
            documents: documents_to_delete.len(),
        },
        skipped: false,
    };

    if !payload.is_empty() {
        tracing::info!(
            destination = destination.name(),
            imports = summary.imported.total(),
            deletes = summary.deleted.categories + summary.deleted.labels,
            "uploading changes",
        );
        destination.sync_data(&payload).await?;
    }

    for (batch_no, batch) in documents_to_delete.chunks(DELETE_BATCH_SIZE).enumerate() {
        tracing::debug!(batch = batch_no, size = batch.len(), "deleting documents");
        destination.delete_articles(batch).await?;
    }

    Ok(summary)
}
