//! Domain types for knowledge-base synchronization.
//!
//! Every syncable entity embeds an [`EntityMeta`] (flattened on the wire) and
//! implements [`Entity`]. References between entities are carried by external
//! id and display name, never by pointer.
//! All types serialize as camelCase JSON so the checkpoint file stays readable.

use std::collections::VecDeque;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Placeholder written by sources for values the destination generates
/// itself (e.g. label colors). Always compares equal to the stored value.
pub const GENERATED_VALUE: &str = "GENERATED";

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The three entity types a sync pass processes, in processing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Category,
    Label,
    Document,
}

impl EntityType {
    /// All entity types in the order a pass processes them.
    pub fn all() -> &'static [EntityType] {
        &[EntityType::Category, EntityType::Label, EntityType::Document]
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Category => write!(f, "category"),
            EntityType::Label => write!(f, "label"),
            EntityType::Document => write!(f, "document"),
        }
    }
}

/// How a matched document is judged changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompareMode {
    /// Equal `externalVersionId` on both sides means unchanged; otherwise
    /// fall back to content comparison.
    #[default]
    ModificationDate,
    /// Full normalized-content comparison.
    Content,
    /// Every matched document is treated as changed.
    None,
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identity fields shared by every syncable entity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityMeta {
    /// Destination-assigned id; `None` until the entity is created remotely.
    #[serde(default)]
    pub id: Option<String>,
    /// Source-assigned stable key, the diff join key.
    #[serde(default)]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id_alternatives: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Opaque modification marker (e.g. a timestamp string).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_version_id: Option<String>,
}

impl EntityMeta {
    pub fn with_external_id(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            ..Self::default()
        }
    }
}

/// Reference from one entity to another, resolved by external id or name.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl EntityReference {
    pub fn external(external_id: impl Into<String>) -> Self {
        Self {
            external_id: Some(external_id.into()),
            ..Self::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// A node in the category tree. The parent is referenced, never embedded.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_category: Option<EntityReference>,
}

/// A free-form tag attached to documents.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Label {
    #[serde(flatten)]
    pub meta: EntityMeta,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// One body variant of a document version. The body is opaque block content.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// A published or draft version of a document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    pub title: String,
    #[serde(default = "default_visible")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alternatives: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<EntityReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<EntityReference>>,
    #[serde(default)]
    pub variations: Vec<Variation>,
}

fn default_visible() -> bool {
    true
}

/// A knowledge-base article with optional published and draft versions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(flatten)]
    pub meta: EntityMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DocumentVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<DocumentVersion>,
}

impl Document {
    /// References carried by whichever versions are present.
    pub fn versions(&self) -> impl Iterator<Item = &DocumentVersion> {
        self.published.iter().chain(self.draft.iter())
    }

    pub fn versions_mut(&mut self) -> impl Iterator<Item = &mut DocumentVersion> {
        self.published.iter_mut().chain(self.draft.iter_mut())
    }
}

// ---------------------------------------------------------------------------
// Entity trait
// ---------------------------------------------------------------------------

/// Common behaviour of every syncable entity.
pub trait Entity:
    Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    const KIND: EntityType;

    fn meta(&self) -> &EntityMeta;
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Display name used for uniqueness checks and reference resolution.
    fn name(&self) -> Option<&str>;
    fn set_name(&mut self, name: String);

    fn external_id(&self) -> Option<&str> {
        self.meta().external_id.as_deref()
    }

    fn id(&self) -> Option<&str> {
        self.meta().id.as_deref()
    }

    /// Outgoing references, tagged with the entity type they point at.
    fn references_mut(&mut self) -> Vec<(EntityType, &mut EntityReference)> {
        Vec::new()
    }
}

impl Entity for Category {
    const KIND: EntityType = EntityType::Category;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn set_name(&mut self, name: String) {
        self.name = name;
    }
    fn references_mut(&mut self) -> Vec<(EntityType, &mut EntityReference)> {
        self.parent_category
            .iter_mut()
            .map(|parent| (EntityType::Category, parent))
            .collect()
    }
}

impl Entity for Label {
    const KIND: EntityType = EntityType::Label;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
    fn set_name(&mut self, name: String) {
        self.name = name;
    }
}

impl Entity for Document {
    const KIND: EntityType = EntityType::Document;

    fn meta(&self) -> &EntityMeta {
        &self.meta
    }
    fn meta_mut(&mut self) -> &mut EntityMeta {
        &mut self.meta
    }
    /// Title of the published version, or of the draft when unpublished.
    fn name(&self) -> Option<&str> {
        self.versions().next().map(|v| v.title.as_str())
    }
    fn set_name(&mut self, name: String) {
        if let Some(version) = self.versions_mut().next() {
            version.title = name;
        }
    }
    fn references_mut(&mut self) -> Vec<(EntityType, &mut EntityReference)> {
        let mut refs = Vec::new();
        for version in self.versions_mut() {
            if let Some(category) = version.category.as_mut() {
                refs.push((EntityType::Category, category));
            }
            for label in version.labels.iter_mut().flatten() {
                refs.push((EntityType::Label, label));
            }
        }
        refs
    }
}

// ---------------------------------------------------------------------------
// Collections
// ---------------------------------------------------------------------------

/// Three-way partition of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportableContent<T> {
    #[serde(default = "Vec::new")]
    pub created: Vec<T>,
    #[serde(default = "Vec::new")]
    pub updated: Vec<T>,
    #[serde(default = "Vec::new")]
    pub deleted: Vec<T>,
}

impl<T> Default for ImportableContent<T> {
    fn default() -> Self {
        Self {
            created: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<T> ImportableContent<T> {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// The diff result for all three entity types.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncableContents {
    #[serde(default)]
    pub categories: ImportableContent<Category>,
    #[serde(default)]
    pub labels: ImportableContent<Label>,
    #[serde(default)]
    pub documents: ImportableContent<Document>,
}

impl SyncableContents {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.labels.is_empty() && self.documents.is_empty()
    }
}

/// A full set of entities: a destination export or a per-type item list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportModel {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub labels: Vec<Label>,
    #[serde(default)]
    pub documents: Vec<Document>,
}

/// Items waiting for (re)processing, per entity type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItems {
    #[serde(default)]
    pub categories: VecDeque<Category>,
    #[serde(default)]
    pub labels: VecDeque<Label>,
    #[serde(default)]
    pub documents: VecDeque<Document>,
}

/// Normalized error attached to a failed entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// An entity that failed terminally within the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedEntity<T> {
    pub item: T,
    pub errors: Vec<ErrorBody>,
}

/// Failed items per entity type.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedItems {
    #[serde(default)]
    pub categories: Vec<FailedEntity<Category>>,
    #[serde(default)]
    pub labels: Vec<FailedEntity<Label>>,
    #[serde(default)]
    pub documents: Vec<FailedEntity<Document>>,
}

/// Cross-run link target for an entity, keyed by external id in lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLink {
    #[serde(default)]
    pub id: Option<String>,
    pub external_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_type_display_and_order() {
        assert_eq!(EntityType::Category.to_string(), "category");
        assert_eq!(EntityType::Document.to_string(), "document");
        assert_eq!(
            EntityType::all(),
            &[EntityType::Category, EntityType::Label, EntityType::Document]
        );
    }

    #[test]
    fn compare_mode_uses_screaming_case() {
        let mode: CompareMode = serde_json::from_str("\"MODIFICATION_DATE\"").unwrap();
        assert_eq!(mode, CompareMode::ModificationDate);
        assert_eq!(serde_json::to_string(&CompareMode::None).unwrap(), "\"NONE\"");
    }

    #[test]
    fn meta_is_flattened_into_entity_json() {
        let category = Category {
            meta: EntityMeta::with_external_id("c1"),
            name: "Cat".to_string(),
            parent_category: None,
        };
        let json = serde_json::to_value(&category).unwrap();
        assert_eq!(json["externalId"], "c1");
        assert_eq!(json["name"], "Cat");
        assert!(json.get("meta").is_none());
    }

    #[test]
    fn document_name_prefers_published_title() {
        let mut doc = Document {
            meta: EntityMeta::with_external_id("d1"),
            published: Some(DocumentVersion {
                title: "Published".to_string(),
                ..DocumentVersion::default()
            }),
            draft: Some(DocumentVersion {
                title: "Draft".to_string(),
                ..DocumentVersion::default()
            }),
        };
        assert_eq!(doc.name(), Some("Published"));
        doc.published = None;
        assert_eq!(doc.name(), Some("Draft"));
    }

    #[test]
    fn document_references_cover_both_versions() {
        let version = DocumentVersion {
            title: "t".to_string(),
            category: Some(EntityReference::external("c1")),
            labels: Some(vec![EntityReference::external("l1"), EntityReference::external("l2")]),
            ..DocumentVersion::default()
        };
        let mut doc = Document {
            meta: EntityMeta::with_external_id("d1"),
            published: Some(version.clone()),
            draft: Some(version),
        };
        let kinds: Vec<EntityType> = doc.references_mut().into_iter().map(|(k, _)| k).collect();
        assert_eq!(kinds.len(), 6);
        assert_eq!(kinds.iter().filter(|k| **k == EntityType::Label).count(), 4);
        assert!(Label::default().references_mut().is_empty());
    }

    #[test]
    fn document_version_defaults_to_visible() {
        let version: DocumentVersion = serde_json::from_str(r#"{"title":"t"}"#).unwrap();
        assert!(version.visible);
        assert!(version.variations.is_empty());
    }
}
