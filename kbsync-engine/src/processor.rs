//! Per-item transforms run by the Worker ahead of the aggregator.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use kbsync_core::{Entity, SyncConfig};

use crate::aggregator::conflicts::NameRegistry;
use crate::context::{ContextEntity, PipeContext};
use crate::error::SyncError;

/// One step of the Worker's processor chain. Higher priority runs first.
#[async_trait]
pub trait Processor<T: Entity>: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        0
    }

    async fn initialize(&mut self, _ctx: &PipeContext) -> Result<(), SyncError> {
        Ok(())
    }

    /// Transform one item. `first_try` is false on the retry pass.
    async fn run(&self, item: T, ctx: &PipeContext, first_try: bool) -> Result<T, SyncError>;
}

// ---------------------------------------------------------------------------
// External id prefix / source id
// ---------------------------------------------------------------------------

/// Stamps the source id and namespaces external ids with the configured
/// prefix, references included. Runs on the pristine source item, so the
/// prefix is always prepended.
#[derive(Debug, Clone, Default)]
pub struct ExternalIdProcessor {
    prefix: Option<String>,
    source_id: Option<String>,
}

impl ExternalIdProcessor {
    pub fn new(prefix: Option<String>, source_id: Option<String>) -> Self {
        Self { prefix, source_id }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(config.external_id_prefix.clone(), config.source_id.clone())
    }

    pub fn apply<T: Entity>(&self, mut item: T) -> T {
        if let Some(prefix) = self.prefix.as_deref() {
            let meta = item.meta_mut();
            if let Some(external_id) = meta.external_id.as_mut() {
                add_prefix(external_id, prefix);
            }
            for alternative in meta.external_id_alternatives.iter_mut().flatten() {
                add_prefix(alternative, prefix);
            }
            for (_, reference) in item.references_mut() {
                if let Some(external_id) = reference.external_id.as_mut() {
                    add_prefix(external_id, prefix);
                }
            }
        }
        if let Some(source_id) = &self.source_id {
            item.meta_mut().source_id = Some(source_id.clone());
        }
        item
    }
}

fn add_prefix(id: &mut String, prefix: &str) {
    id.insert_str(0, prefix);
}

#[async_trait]
impl<T: Entity> Processor<T> for ExternalIdProcessor {
    fn name(&self) -> &str {
        "external-id"
    }

    fn priority(&self) -> i32 {
        100
    }

    async fn run(&self, item: T, _ctx: &PipeContext, _first_try: bool) -> Result<T, SyncError> {
        Ok(self.apply(item))
    }
}

// ---------------------------------------------------------------------------
// Reference resolution
// ---------------------------------------------------------------------------

/// Resolves references carrying an external id against everything aggregated
/// so far plus the stored snapshot, filling in destination id and name.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceResolver;

#[async_trait]
impl<T: Entity> Processor<T> for ReferenceResolver {
    fn name(&self) -> &str {
        "reference-resolver"
    }

    fn priority(&self) -> i32 {
        50
    }

    async fn run(&self, mut item: T, ctx: &PipeContext, _first_try: bool) -> Result<T, SyncError> {
        for (kind, reference) in item.references_mut() {
            let Some(external_id) = reference.external_id.clone() else {
                continue;
            };
            let Some(link) = ctx.lookup(kind).get(&external_id) else {
                return Err(SyncError::MissingReference {
                    kind,
                    reference: external_id,
                });
            };
            if link.id.is_some() {
                reference.id = link.id.clone();
            }
            if link.name.is_some() {
                reference.name = link.name.clone();
            }
        }
        Ok(item)
    }
}

// ---------------------------------------------------------------------------
// Name conflicts
// ---------------------------------------------------------------------------

/// Makes category and label names unique against the destination.
///
/// One instance serves one entity type; its registry is built on first use
/// and refreshed with each newly processed item.
#[derive(Debug, Default)]
pub struct NameConflictProcessor {
    suffix: Option<String>,
    registry: Mutex<Option<NameRegistry>>,
}

impl NameConflictProcessor {
    pub fn new(suffix: Option<String>) -> Self {
        Self {
            suffix,
            registry: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<T: ContextEntity> Processor<T> for NameConflictProcessor {
    fn name(&self) -> &str {
        "name-conflict"
    }

    fn priority(&self) -> i32 {
        10
    }

    async fn initialize(&mut self, _ctx: &PipeContext) -> Result<(), SyncError> {
        *self.registry.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }

    async fn run(&self, item: T, ctx: &PipeContext, _first_try: bool) -> Result<T, SyncError> {
        let mut guard = self.registry.lock().unwrap_or_else(PoisonError::into_inner);
        let registry = guard.get_or_insert_with(|| NameRegistry::build::<T>(ctx));
        registry.refresh::<T>(ctx);
        registry.resolve(item, self.suffix.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbsync_core::{
        Category, Document, DocumentVersion, EntityMeta, EntityReference, EntityType, ExportModel,
    };

    fn child(parent: &str) -> Category {
        Category {
            meta: EntityMeta::with_external_id("c2"),
            name: "Child".to_string(),
            parent_category: Some(EntityReference::external(parent)),
        }
    }

    #[test]
    fn prefix_covers_ids_and_references() {
        let processor = ExternalIdProcessor::new(Some("zd-".to_string()), Some("src-1".to_string()));
        let item = processor.apply(child("c1"));
        assert_eq!(item.external_id(), Some("zd-c2"));
        assert_eq!(
            item.parent_category.and_then(|p| p.external_id).as_deref(),
            Some("zd-c1")
        );
        assert_eq!(item.meta.source_id.as_deref(), Some("src-1"));
    }

    #[test]
    fn source_ids_that_look_prefixed_stay_distinct() {
        let processor = ExternalIdProcessor::new(Some("p-".to_string()), None);
        let plain = processor.apply(Category {
            meta: EntityMeta::with_external_id("1"),
            ..Category::default()
        });
        let lookalike = processor.apply(Category {
            meta: EntityMeta::with_external_id("p-1"),
            ..Category::default()
        });
        assert_eq!(plain.external_id(), Some("p-1"));
        assert_eq!(lookalike.external_id(), Some("p-p-1"));
    }

    #[test]
    fn prefix_covers_document_labels() {
        let processor = ExternalIdProcessor::new(Some("p-".to_string()), None);
        let doc = Document {
            meta: EntityMeta::with_external_id("d1"),
            published: Some(DocumentVersion {
                title: "Doc".to_string(),
                labels: Some(vec![EntityReference::external("l1")]),
                ..DocumentVersion::default()
            }),
            draft: None,
        };
        let doc = processor.apply(doc);
        let labels = doc.published.and_then(|v| v.labels).unwrap_or_default();
        assert_eq!(labels[0].external_id.as_deref(), Some("p-l1"));
        assert!(doc.meta.source_id.is_none());
    }

    #[tokio::test]
    async fn resolver_fills_id_and_name_from_lookup() {
        let ctx = PipeContext::fresh(ExportModel {
            categories: vec![Category {
                meta: EntityMeta {
                    id: Some("42".to_string()),
                    external_id: Some("c1".to_string()),
                    ..EntityMeta::default()
                },
                name: "Parent".to_string(),
                parent_category: None,
            }],
            ..ExportModel::default()
        });

        let resolved = ReferenceResolver.run(child("c1"), &ctx, true).await.expect("resolve");
        let parent = resolved.parent_category.expect("parent");
        assert_eq!(parent.id.as_deref(), Some("42"));
        assert_eq!(parent.name.as_deref(), Some("Parent"));
    }

    #[tokio::test]
    async fn resolver_reports_missing_reference() {
        let ctx = PipeContext::default();
        let err = ReferenceResolver
            .run(child("nowhere"), &ctx, false)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SyncError::MissingReference { kind: EntityType::Category, .. }
        ));
        assert!(err.is_transformation());
    }

    #[tokio::test]
    async fn name_conflicts_see_items_processed_between_runs() {
        let mut ctx = PipeContext::default();
        let processor = NameConflictProcessor::new(Some(" (2)".to_string()));

        let first = Processor::<Category>::run(&processor, child("c1"), &ctx, true)
            .await
            .expect("first");
        assert_eq!(first.name, "Child");
        Category::processed_mut(&mut ctx).push(first);

        let mut second = child("c1");
        second.meta = EntityMeta::with_external_id("c3");
        let second = Processor::<Category>::run(&processor, second, &ctx, true)
            .await
            .expect("second");
        assert_eq!(second.name, "Child (2)");
    }
}
