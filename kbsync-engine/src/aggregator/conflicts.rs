//! Case-insensitive name uniqueness for categories and labels.

use std::collections::HashMap;

use kbsync_core::{Entity, EntityMeta};

use crate::context::{ContextEntity, PipeContext};
use crate::error::SyncError;

/// Names in use by one entity type, keyed case-insensitively, with the
/// external ids of the entities that carry them.
///
/// Seeded from the stored snapshot, then kept in step with the processed
/// list through [`NameRegistry::refresh`].
#[derive(Debug, Default)]
pub struct NameRegistry {
    owners: HashMap<String, Vec<Option<String>>>,
    seen_processed: usize,
}

impl NameRegistry {
    pub fn build<T: ContextEntity>(ctx: &PipeContext) -> Self {
        let mut registry = Self::default();
        registry.extend(T::stored(ctx));
        registry.refresh::<T>(ctx);
        registry
    }

    /// Fold in the items processed since the last call.
    pub fn refresh<T: ContextEntity>(&mut self, ctx: &PipeContext) {
        let processed = T::processed(ctx);
        if let Some(new) = processed.get(self.seen_processed..) {
            self.extend(new);
        }
        self.seen_processed = processed.len();
    }

    fn extend<T: Entity>(&mut self, items: &[T]) {
        for item in items {
            if let Some(name) = item.name() {
                self.owners
                    .entry(name_key(name))
                    .or_default()
                    .push(item.external_id().map(str::to_owned));
            }
        }
    }

    /// Whether an entity other than the one `meta` describes uses `name`.
    fn taken_by_other(&self, name: &str, meta: &EntityMeta) -> bool {
        self.owners
            .get(&name_key(name))
            .is_some_and(|owners| owners.iter().any(|owner| !is_same_entity(owner.as_deref(), meta)))
    }

    /// Append `suffix` to the item's name until no other entity carries it.
    pub fn resolve<T: Entity>(&self, mut item: T, suffix: Option<&str>) -> Result<T, SyncError> {
        let Some(original) = item.name().map(str::to_owned) else {
            return Ok(item);
        };

        let mut name = original.clone();
        while self.taken_by_other(&name, item.meta()) {
            match suffix.filter(|s| !s.trim().is_empty()) {
                Some(suffix) => name.push_str(suffix),
                None => {
                    return Err(SyncError::Configurer(format!(
                        "{} name '{original}' is already used by another {}; set nameConflictSuffix",
                        T::KIND,
                        T::KIND,
                    )))
                }
            }
        }

        if name != original {
            tracing::debug!(entity = %T::KIND, from = %original, to = %name, "renamed to avoid conflict");
            item.set_name(name);
        }
        Ok(item)
    }
}

/// Append `suffix` to the item's name until no processed or stored entity
/// other than the item itself carries the same name (case-insensitive).
///
/// An entity is the item itself when its external id is the item's external
/// id or one of the item's external id alternatives, the same rule the diff
/// uses to match stored items. Fails with [`SyncError::Configurer`] when a
/// conflict exists and no usable suffix is configured.
pub fn resolve_name_conflicts<T: ContextEntity>(
    item: T,
    ctx: &PipeContext,
    suffix: Option<&str>,
) -> Result<T, SyncError> {
    NameRegistry::build::<T>(ctx).resolve(item, suffix)
}

fn is_same_entity(owner: Option<&str>, meta: &EntityMeta) -> bool {
    let Some(owner) = owner else {
        return false;
    };
    meta.external_id.as_deref() == Some(owner)
        || meta
            .external_id_alternatives
            .iter()
            .flatten()
            .any(|alternative| alternative == owner)
}

fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
