//! Three-way classification of collected items against the stored snapshot.

use kbsync_core::{CompareMode, Entity, EntityMeta, EntityType, ImportableContent};

use crate::aggregator::compare::values_match;
use crate::aggregator::normalize::{NameIndexes, Normalize};
use crate::aggregator::protected::apply_protected_fields;
use crate::aggregator::DiffOptions;
use crate::context::PipeContext;
use crate::error::SyncError;

/// Where a collected item lands.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification<T> {
    Created(T),
    Updated(T),
    Unchanged(T),
}

impl<T> Classification<T> {
    pub fn into_item(self) -> T {
        match self {
            Classification::Created(item)
            | Classification::Updated(item)
            | Classification::Unchanged(item) => item,
        }
    }
}

/// Remove and return the stored item `item` corresponds to: same external
/// id first, then any of the item's external id alternatives.
pub fn take_match<T: Entity>(pool: &mut Vec<T>, item: &T) -> Option<T> {
    let by_external_id = item
        .external_id()
        .and_then(|external_id| pool.iter().position(|s| s.external_id() == Some(external_id)));

    let position = by_external_id.or_else(|| {
        let alternatives = item.meta().external_id_alternatives.as_ref()?;
        pool.iter().position(|s| {
            s.external_id()
                .is_some_and(|id| alternatives.iter().any(|alt| alt == id))
        })
    })?;
    Some(pool.remove(position))
}

/// Classify one collected item against its stored match.
///
/// A matched item inherits the stored destination id and protected fields
/// before comparison.
pub fn classify<T: Normalize>(
    mut item: T,
    stored: Option<&T>,
    names: &NameIndexes,
    options: &DiffOptions,
) -> Result<Classification<T>, SyncError> {
    let Some(stored) = stored else {
        return Ok(Classification::Created(item));
    };

    item.meta_mut().id = stored.meta().id.clone();
    let item = apply_protected_fields(item, stored, &options.protected_fields)?;

    let changed = match (T::KIND, options.compare_mode) {
        (EntityType::Document, CompareMode::None) => true,
        (EntityType::Document, CompareMode::ModificationDate)
            if same_version(item.meta(), stored.meta()) =>
        {
            false
        }
        _ => !values_match(&item.normalized(names)?, &stored.normalized(names)?),
    };

    Ok(if changed {
        Classification::Updated(item)
    } else {
        Classification::Unchanged(item)
    })
}

fn same_version(collected: &EntityMeta, stored: &EntityMeta) -> bool {
    matches!(
        (collected.external_version_id.as_deref(), stored.external_version_id.as_deref()),
        (Some(a), Some(b)) if a == b
    )
}

/// Number of stored items the running source owns.
pub fn same_source_count<T: Entity>(stored: &[T], options: &DiffOptions) -> usize {
    stored
        .iter()
        .filter(|item| options.is_same_source(item.meta()))
        .count()
}

/// Restrict `deleted` to same-source items and apply the prune-all guard.
pub fn finish_deleted<T: Entity>(
    content: &mut ImportableContent<T>,
    same_source_stored: usize,
    options: &DiffOptions,
) -> Result<(), SyncError> {
    content
        .deleted
        .retain(|item| options.is_same_source(item.meta()));

    let deletes_everything = !content.deleted.is_empty()
        && content.deleted.len() == same_source_stored
        && content.created.is_empty();
    if deletes_everything && !options.allow_prune_all_entities {
        return Err(SyncError::Configurer(format!(
            "refusing to delete all {} stored {} entities of this source; \
             set allowPruneAllEntities to override",
            content.deleted.len(),
            T::KIND,
        )));
    }
    Ok(())
}

/// Batch form of the diff: classify `collected` against `stored`.
pub fn collect_modified_items<T: Normalize>(
    collected: Vec<T>,
    stored: &[T],
    ctx: &PipeContext,
    options: &DiffOptions,
) -> Result<ImportableContent<T>, SyncError> {
    let names = NameIndexes::build(ctx);
    let mut pool = stored.to_vec();
    let mut content = ImportableContent::default();

    for item in collected {
        let matched = take_match(&mut pool, &item);
        match classify(item, matched.as_ref(), &names, options)? {
            Classification::Created(item) => content.created.push(item),
            Classification::Updated(item) => content.updated.push(item),
            Classification::Unchanged(_) => {}
        }
    }

    content.deleted = pool;
    finish_deleted(&mut content, same_source_count(stored, options), options)?;
    Ok(content)
}
