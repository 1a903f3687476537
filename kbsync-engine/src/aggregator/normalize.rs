//! Comparison form of each entity type.
//!
//! Normalization trims display strings, replaces references with the current
//! display name of their target, drops empty optionals and strips the fields
//! that identify an item rather than describe it.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;

use kbsync_core::{Category, Document, Entity, EntityReference, Label};

use crate::aggregator::compare::prune_empty;
use crate::context::{ContextEntity, PipeContext};
use crate::error::SyncError;

/// Keys excluded from content comparison.
const IDENTITY_KEYS: &[&str] = &["id", "sourceId", "externalVersionId", "externalIdAlternatives"];

/// An entity that can be reduced to a comparable JSON value.
pub trait Normalize: ContextEntity {
    fn normalized(&self, names: &NameIndexes) -> Result<Value, SyncError>;
}

/// Display names of one entity type, by external id and by destination id.
#[derive(Debug, Default)]
pub struct NameIndex {
    by_external_id: HashMap<String, String>,
    by_id: HashMap<String, String>,
}

impl NameIndex {
    fn extend<T: Entity>(&mut self, items: &[T]) {
        for item in items {
            let Some(name) = item.name() else {
                continue;
            };
            if let Some(external_id) = item.external_id() {
                self.by_external_id
                    .insert(external_id.to_string(), name.to_string());
            }
            if let Some(id) = item.id() {
                self.by_id.insert(id.to_string(), name.to_string());
            }
        }
    }

    /// Current display name of a reference target, falling back to the name
    /// the reference itself carries.
    pub fn resolve(&self, reference: &EntityReference) -> Option<String> {
        reference
            .external_id
            .as_deref()
            .and_then(|external_id| self.by_external_id.get(external_id))
            .or_else(|| {
                reference
                    .id
                    .as_deref()
                    .and_then(|id| self.by_id.get(id))
            })
            .cloned()
            .or_else(|| reference.name.clone())
            .map(|name| name.trim().to_string())
    }

    /// The reference reduced to its resolved name.
    pub fn normalize_reference(&self, reference: &EntityReference) -> EntityReference {
        EntityReference {
            name: self.resolve(reference),
            ..EntityReference::default()
        }
    }
}

/// Name indexes of the referenceable types.
///
/// Seeded from the stored snapshot, then extended with processed items as
/// they appear, so a collected name shadows the stored one.
#[derive(Debug, Default)]
pub struct NameIndexes {
    pub categories: NameIndex,
    pub labels: NameIndex,
    seen_categories: usize,
    seen_labels: usize,
}

impl NameIndexes {
    pub fn build(ctx: &PipeContext) -> Self {
        let mut names = Self::default();
        names.categories.extend(Category::stored(ctx));
        names.labels.extend(Label::stored(ctx));
        names.refresh(ctx);
        names
    }

    /// Fold in the items processed since the last call.
    pub fn refresh(&mut self, ctx: &PipeContext) {
        let categories = Category::processed(ctx);
        if let Some(new) = categories.get(self.seen_categories..) {
            self.categories.extend(new);
        }
        self.seen_categories = categories.len();

        let labels = Label::processed(ctx);
        if let Some(new) = labels.get(self.seen_labels..) {
            self.labels.extend(new);
        }
        self.seen_labels = labels.len();
    }
}

fn finish<T: Serialize>(item: &T) -> Result<Value, SyncError> {
    let mut value = serde_json::to_value(item)?;
    if let Value::Object(map) = &mut value {
        for key in IDENTITY_KEYS {
            map.remove(*key);
        }
    }
    prune_empty(&mut value);
    Ok(value)
}

impl Normalize for Category {
    fn normalized(&self, names: &NameIndexes) -> Result<Value, SyncError> {
        let mut item = self.clone();
        item.name = item.name.trim().to_string();
        item.parent_category = item
            .parent_category
            .as_ref()
            .map(|parent| names.categories.normalize_reference(parent));
        finish(&item)
    }
}

impl Normalize for Label {
    fn normalized(&self, _names: &NameIndexes) -> Result<Value, SyncError> {
        let mut item = self.clone();
        item.name = item.name.trim().to_string();
        finish(&item)
    }
}

impl Normalize for Document {
    fn normalized(&self, names: &NameIndexes) -> Result<Value, SyncError> {
        let mut item = self.clone();
        for version in item.versions_mut() {
            version.title = version.title.trim().to_string();
            version.category = version
                .category
                .as_ref()
                .map(|category| names.categories.normalize_reference(category));
            version.labels = version.labels.as_ref().map(|refs| {
                let mut refs: Vec<EntityReference> = refs
                    .iter()
                    .map(|label| names.labels.normalize_reference(label))
                    .collect();
                refs.sort_by(|a, b| a.name.cmp(&b.name));
                refs
            });
        }
        finish(&item)
    }
}
