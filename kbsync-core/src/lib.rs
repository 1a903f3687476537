//! kbsync core library: domain types, configuration, errors.
//!
//! - [`types`]: entities, diff partitions and the [`Entity`] trait
//! - [`config`]: [`SyncConfig`] loading and validation
//! - [`error`]: [`ConfigError`]

pub mod config;
pub mod error;
pub mod types;

pub use config::{AdapterConfig, SyncConfig};
pub use error::ConfigError;
pub use types::{
    Category, CompareMode, Document, DocumentVersion, Entity, EntityMeta, EntityReference,
    EntityType, ErrorBody, ExportModel, ExternalLink, FailedEntity, FailedItems,
    ImportableContent, Label, PendingItems, SyncableContents, Variation, GENERATED_VALUE,
};
