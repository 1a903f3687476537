//! Diff aggregation: collected items against the destination snapshot.
//!
//! [`DiffAggregator`] is the streaming form the Worker drives. Each
//! aggregated item is matched against the per-type `deleted` pool in the
//! [`PipeContext`] (seeded with the whole stored snapshot), and lands in
//! `created`, `updated` or nowhere. Whatever is left in the pool once both
//! Worker passes finish is filtered to same-source items and checked by the
//! prune-all guard in [`Aggregator::finalize`].
//!
//! [`diff::collect_modified_items`] is the batch form over the same steps.

pub mod compare;
pub mod conflicts;
pub mod diff;
pub mod normalize;
pub mod protected;

use std::marker::PhantomData;

use async_trait::async_trait;

use kbsync_core::{CompareMode, Entity, EntityMeta, SyncConfig};

use crate::context::{record_link, PipeContext};
use crate::error::SyncError;

use self::diff::{classify, finish_deleted, same_source_count, take_match, Classification};
use self::normalize::{NameIndexes, Normalize};

/// Terminal step of the Worker's chain.
#[async_trait]
pub trait Aggregator<T: Entity>: Send + Sync {
    /// Record one processed item; returns the item as it should be kept in
    /// `processedItems`.
    async fn aggregate(&mut self, item: T, ctx: &mut PipeContext) -> Result<T, SyncError>;

    /// Runs once after both Worker passes.
    async fn finalize(&mut self, _ctx: &mut PipeContext) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Diff policy knobs.
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    pub protected_fields: Vec<String>,
    pub compare_mode: CompareMode,
    pub external_id_prefix: Option<String>,
    pub source_id: Option<String>,
    pub allow_prune_all_entities: bool,
}

impl DiffOptions {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            protected_fields: config.protected_fields.clone(),
            compare_mode: config.compare_mode,
            external_id_prefix: config.external_id_prefix.clone(),
            source_id: config.source_id.clone(),
            allow_prune_all_entities: config.allow_prune_all_entities,
        }
    }

    /// Whether a stored item belongs to the running source: by source id if
    /// one is configured, else by external id prefix, else by having an
    /// external id at all.
    pub fn is_same_source(&self, meta: &EntityMeta) -> bool {
        if let Some(source_id) = self.source_id.as_deref() {
            return meta.source_id.as_deref() == Some(source_id);
        }
        if let Some(prefix) = self.external_id_prefix.as_deref() {
            return meta
                .external_id
                .as_deref()
                .is_some_and(|id| id.starts_with(prefix));
        }
        meta.external_id.is_some()
    }
}

/// Streaming diff for one entity type.
#[derive(Debug)]
pub struct DiffAggregator<T> {
    options: DiffOptions,
    /// Built on the first item, so a resumed run starts from the
    /// checkpoint's processed items.
    names: Option<NameIndexes>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> DiffAggregator<T> {
    pub fn new(options: DiffOptions) -> Self {
        Self {
            options,
            names: None,
            _entity: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Normalize> Aggregator<T> for DiffAggregator<T> {
    async fn aggregate(&mut self, item: T, ctx: &mut PipeContext) -> Result<T, SyncError> {
        let names = self.names.get_or_insert_with(|| NameIndexes::build(ctx));
        names.refresh(ctx);

        let matched = take_match(&mut T::importable_mut(ctx).deleted, &item);
        let outcome = match classify(item, matched.as_ref(), names, &self.options) {
            Ok(outcome) => outcome,
            Err(err) => {
                // Put the match back so a retry sees the same pool.
                if let Some(stored) = matched {
                    T::importable_mut(ctx).deleted.push(stored);
                }
                return Err(err);
            }
        };

        let importable = T::importable_mut(ctx);
        let item = match outcome {
            Classification::Created(item) => {
                importable.created.push(item.clone());
                item
            }
            Classification::Updated(item) => {
                importable.updated.push(item.clone());
                item
            }
            Classification::Unchanged(item) => item,
        };
        tracing::trace!(entity = %T::KIND, external_id = ?item.external_id(), "aggregated");

        record_link(T::lookup_mut(ctx), &item);
        Ok(item)
    }

    async fn finalize(&mut self, ctx: &mut PipeContext) -> Result<(), SyncError> {
        self.names = None;
        let same_source = same_source_count(T::stored(ctx), &self.options);
        let importable = T::importable_mut(ctx);
        finish_deleted(importable, same_source, &self.options)?;
        tracing::info!(
            entity = %T::KIND,
            created = importable.created.len(),
            updated = importable.updated.len(),
            deleted = importable.deleted.len(),
            "diff complete",
        );
        Ok(())
    }
}
