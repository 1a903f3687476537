//! # kbsync-engine
//!
//! Resumable one-way sync of knowledge-base entities.
//!
//! Build a [`Pipe`] with [`PipeBuilder`] from a [`kbsync_core::SyncConfig`],
//! one or more [`SourceAdapter`]s and a [`DestinationAdapter`], then call
//! [`Pipe::run`]. The pipe streams categories, labels and documents through
//! the [`Worker`], diffs them against the destination snapshot with the
//! [`DiffAggregator`] and uploads the delta. An interrupted run saves its
//! [`PipeContext`] through a [`ContextRepository`] and resumes from it.

pub mod adapter;
pub mod aggregator;
pub mod context;
pub mod context_store;
pub mod error;
pub mod pager;
pub mod pipe;
pub mod processor;
pub mod runtime;
pub mod upload;
pub mod worker;

pub use adapter::{DestinationAdapter, ItemStream, SourceAdapter, SourceEntity};
pub use aggregator::{Aggregator, DiffAggregator, DiffOptions};
pub use context::{ContextEntity, PipeContext, PipeState};
pub use context_store::{ContextRepository, FileContextRepository};
pub use error::SyncError;
pub use pager::Pager;
pub use pipe::{PhaseSummary, Pipe, PipeBuilder, PipeOutcome};
pub use processor::{ExternalIdProcessor, NameConflictProcessor, Processor, ReferenceResolver};
pub use runtime::{Interrupt, KillTimer, Runtime, TimeoutHook};
pub use upload::{upload, DeleteAction, EntityCounts, UploadPayload, UploadSummary};
pub use worker::{Worker, WorkerReport};
