//! Resumable run state shared by every phase of a pass.
//!
//! A [`PipeContext`] is created fresh from the destination snapshot (or
//! loaded from a checkpoint), mutated by the Worker and aggregators, saved on
//! interruption and discarded on clean completion. The whole struct is the
//! checkpoint payload.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kbsync_core::{
    Category, Document, Entity, EntityType, ExportModel, ExternalLink, FailedEntity, FailedItems,
    ImportableContent, Label, PendingItems, SyncableContents,
};

/// Per-type item lists of the Worker.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeState {
    #[serde(default)]
    pub processed_items: ExportModel,
    #[serde(default)]
    pub unprocessed_items: PendingItems,
    #[serde(default)]
    pub failed_items: FailedItems,
    /// Entity types whose phase finished; a resumed run skips them.
    #[serde(default)]
    pub completed_phases: Vec<EntityType>,
}

/// Full run state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipeContext {
    #[serde(default)]
    pub pipe: PipeState,
    /// Destination snapshot fetched once at run start.
    #[serde(default)]
    pub stored_content: Option<ExportModel>,
    #[serde(default)]
    pub syncable_contents: SyncableContents,
    #[serde(default)]
    pub category_lookup: BTreeMap<String, ExternalLink>,
    #[serde(default)]
    pub label_lookup: BTreeMap<String, ExternalLink>,
    #[serde(default)]
    pub article_lookup: BTreeMap<String, ExternalLink>,
    /// Opaque resume state per source adapter, keyed by adapter name.
    #[serde(default)]
    pub adapter_state: BTreeMap<String, Value>,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
}

impl PipeContext {
    /// Fresh context for a destination snapshot. Everything stored starts
    /// out in `deleted` until the diff proves otherwise.
    pub fn fresh(stored: ExportModel) -> Self {
        let mut ctx = Self::default();
        ctx.syncable_contents.categories.deleted = stored.categories.clone();
        ctx.syncable_contents.labels.deleted = stored.labels.clone();
        ctx.syncable_contents.documents.deleted = stored.documents.clone();

        for category in &stored.categories {
            record_link(&mut ctx.category_lookup, category);
        }
        for label in &stored.labels {
            record_link(&mut ctx.label_lookup, label);
        }
        for document in &stored.documents {
            record_link(&mut ctx.article_lookup, document);
        }

        ctx.stored_content = Some(stored);
        ctx
    }

    pub fn is_phase_complete(&self, kind: EntityType) -> bool {
        self.pipe.completed_phases.contains(&kind)
    }

    pub fn mark_phase_complete(&mut self, kind: EntityType) {
        if !self.is_phase_complete(kind) {
            self.pipe.completed_phases.push(kind);
        }
    }

    /// External-link lookup for one entity type.
    pub fn lookup(&self, kind: EntityType) -> &BTreeMap<String, ExternalLink> {
        match kind {
            EntityType::Category => &self.category_lookup,
            EntityType::Label => &self.label_lookup,
            EntityType::Document => &self.article_lookup,
        }
    }

    /// `(processed, failed, pending)` counts for one entity type.
    pub fn counts(&self, kind: EntityType) -> (usize, usize, usize) {
        let pipe = &self.pipe;
        match kind {
            EntityType::Category => (
                pipe.processed_items.categories.len(),
                pipe.failed_items.categories.len(),
                pipe.unprocessed_items.categories.len(),
            ),
            EntityType::Label => (
                pipe.processed_items.labels.len(),
                pipe.failed_items.labels.len(),
                pipe.unprocessed_items.labels.len(),
            ),
            EntityType::Document => (
                pipe.processed_items.documents.len(),
                pipe.failed_items.documents.len(),
                pipe.unprocessed_items.documents.len(),
            ),
        }
    }
}

/// Insert or refresh the lookup entry for an item with an external id.
pub fn record_link<T: Entity>(lookup: &mut BTreeMap<String, ExternalLink>, item: &T) {
    let Some(external_id) = item.external_id() else {
        return;
    };
    lookup.insert(
        external_id.to_string(),
        ExternalLink {
            id: item.id().map(str::to_owned),
            external_id: external_id.to_string(),
            name: item.name().map(str::to_owned),
        },
    );
}

/// Typed access to the slots of a [`PipeContext`] that belong to one entity type.
pub trait ContextEntity: Entity {
    fn processed(ctx: &PipeContext) -> &[Self];
    fn processed_mut(ctx: &mut PipeContext) -> &mut Vec<Self>;
    fn unprocessed_mut(ctx: &mut PipeContext) -> &mut VecDeque<Self>;
    fn failed_mut(ctx: &mut PipeContext) -> &mut Vec<FailedEntity<Self>>;
    fn stored(ctx: &PipeContext) -> &[Self];
    fn importable(ctx: &PipeContext) -> &ImportableContent<Self>;
    fn importable_mut(ctx: &mut PipeContext) -> &mut ImportableContent<Self>;
    fn lookup_mut(ctx: &mut PipeContext) -> &mut BTreeMap<String, ExternalLink>;
}

macro_rules! context_entity {
    ($ty:ty, $field:ident, $lookup:ident) => {
        impl ContextEntity for $ty {
            fn processed(ctx: &PipeContext) -> &[Self] {
                &ctx.pipe.processed_items.$field
            }
            fn processed_mut(ctx: &mut PipeContext) -> &mut Vec<Self> {
                &mut ctx.pipe.processed_items.$field
            }
            fn unprocessed_mut(ctx: &mut PipeContext) -> &mut VecDeque<Self> {
                &mut ctx.pipe.unprocessed_items.$field
            }
            fn failed_mut(ctx: &mut PipeContext) -> &mut Vec<FailedEntity<Self>> {
                &mut ctx.pipe.failed_items.$field
            }
            fn stored(ctx: &PipeContext) -> &[Self] {
                ctx.stored_content
                    .as_ref()
                    .map(|stored| stored.$field.as_slice())
                    .unwrap_or(&[])
            }
            fn importable(ctx: &PipeContext) -> &ImportableContent<Self> {
                &ctx.syncable_contents.$field
            }
            fn importable_mut(ctx: &mut PipeContext) -> &mut ImportableContent<Self> {
                &mut ctx.syncable_contents.$field
            }
            fn lookup_mut(ctx: &mut PipeContext) -> &mut BTreeMap<String, ExternalLink> {
                &mut ctx.$lookup
            }
        }
    };
}

context_entity!(Category, categories, category_lookup);
context_entity!(Label, labels, label_lookup);
context_entity!(Document, documents, article_lookup);

#[cfg(test)]
mod tests {
    use super::*;
    use kbsync_core::EntityMeta;

    fn stored_category(id: &str, external_id: Option<&str>, name: &str) -> Category {
        Category {
            meta: EntityMeta {
                id: Some(id.to_string()),
                external_id: external_id.map(str::to_owned),
                ..EntityMeta::default()
            },
            name: name.to_string(),
            parent_category: None,
        }
    }

    #[test]
    fn fresh_context_seeds_deleted_and_lookups() {
        let stored = ExportModel {
            categories: vec![
                stored_category("1", Some("c1"), "Cat"),
                stored_category("2", None, "Manual"),
            ],
            ..ExportModel::default()
        };
        let ctx = PipeContext::fresh(stored);

        assert_eq!(ctx.syncable_contents.categories.deleted.len(), 2);
        assert_eq!(Category::stored(&ctx).len(), 2);
        assert_eq!(ctx.category_lookup.len(), 1);
        let link = &ctx.category_lookup["c1"];
        assert_eq!(link.id.as_deref(), Some("1"));
        assert_eq!(link.name.as_deref(), Some("Cat"));
    }

    #[test]
    fn phase_completion_is_recorded_once() {
        let mut ctx = PipeContext::default();
        ctx.mark_phase_complete(EntityType::Label);
        ctx.mark_phase_complete(EntityType::Label);
        assert!(ctx.is_phase_complete(EntityType::Label));
        assert!(!ctx.is_phase_complete(EntityType::Document));
        assert_eq!(ctx.pipe.completed_phases.len(), 1);
    }

    #[test]
    fn accessors_reach_the_right_slots() {
        let mut ctx = PipeContext::default();
        Label::processed_mut(&mut ctx).push(Label::default());
        Document::unprocessed_mut(&mut ctx).push_back(Document::default());
        assert_eq!(ctx.counts(EntityType::Label), (1, 0, 0));
        assert_eq!(ctx.counts(EntityType::Document), (0, 0, 1));
        assert!(Category::stored(&ctx).is_empty());
    }
}
