//! Run orchestration.
//!
//! `initialize → categories → labels → documents → upload`, with the
//! checkpoint persisted only when the run is interrupted and discarded once
//! it completes.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use kbsync_core::{
    Category, Document, EntityType, ExportModel, FailedItems, Label, SyncConfig, SyncableContents,
};

use crate::adapter::{DestinationAdapter, ItemStream, SourceAdapter, SourceEntity};
use crate::aggregator::normalize::Normalize;
use crate::aggregator::{Aggregator, DiffAggregator, DiffOptions};
use crate::context::PipeContext;
use crate::context_store::ContextRepository;
use crate::error::SyncError;
use crate::processor::{ExternalIdProcessor, NameConflictProcessor, Processor, ReferenceResolver};
use crate::runtime::{Interrupt, Runtime, TimeoutHook};
use crate::upload::{upload, UploadSummary};
use crate::worker::Worker;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Per-type totals after a run, including work restored from a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PhaseSummary {
    pub entity: EntityType,
    pub processed: usize,
    pub failed: usize,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct PipeOutcome {
    /// The run continued from a checkpoint.
    pub resumed: bool,
    pub phases: Vec<PhaseSummary>,
    pub contents: SyncableContents,
    /// Destination snapshot the diff was computed against.
    pub stored: ExportModel,
    pub failed: FailedItems,
    /// `None` on a dry run.
    pub upload: Option<UploadSummary>,
}

// ---------------------------------------------------------------------------
// Phase wiring
// ---------------------------------------------------------------------------

struct Phase<T: Normalize> {
    processors: Vec<Box<dyn Processor<T>>>,
    aggregator: Box<dyn Aggregator<T>>,
}

impl<T: SourceEntity + Normalize> Phase<T> {
    fn new(processors: Vec<Box<dyn Processor<T>>>, options: &DiffOptions) -> Self {
        Self {
            processors,
            aggregator: Box::new(DiffAggregator::<T>::new(options.clone())),
        }
    }

    async fn initialize(&mut self, ctx: &PipeContext) -> Result<(), SyncError> {
        for processor in &mut self.processors {
            processor.initialize(ctx).await?;
        }
        Ok(())
    }

    /// Worker over every source's stream, then the aggregator's finalize.
    async fn run(
        &mut self,
        sources: &mut [Box<dyn SourceAdapter>],
        interrupt: &Interrupt,
        ctx: &mut PipeContext,
    ) -> Result<(), SyncError> {
        if ctx.is_phase_complete(T::KIND) {
            tracing::info!(entity = %T::KIND, "phase already complete, skipping");
            return Ok(());
        }
        tracing::info!(entity = %T::KIND, "processing");

        {
            let streams: Vec<ItemStream<'_, T>> = sources
                .iter_mut()
                .map(|source| T::open(source.as_mut()))
                .collect();
            let mut worker =
                Worker::new(interrupt.clone(), &self.processors, self.aggregator.as_mut());
            worker.execute(streams, ctx).await?;
        }

        self.aggregator.finalize(ctx).await?;
        ctx.mark_phase_complete(T::KIND);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Assembles a [`Pipe`] from configuration and collaborators.
pub struct PipeBuilder {
    config: SyncConfig,
    sources: Vec<Box<dyn SourceAdapter>>,
    destination: Option<Box<dyn DestinationAdapter>>,
    repository: Option<Box<dyn ContextRepository>>,
    hooks: Vec<Arc<dyn TimeoutHook>>,
    category_processors: Vec<Box<dyn Processor<Category>>>,
    label_processors: Vec<Box<dyn Processor<Label>>>,
    document_processors: Vec<Box<dyn Processor<Document>>>,
    dry_run: bool,
}

impl PipeBuilder {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            sources: Vec::new(),
            destination: None,
            repository: None,
            hooks: Vec::new(),
            category_processors: Vec::new(),
            label_processors: Vec::new(),
            document_processors: Vec::new(),
            dry_run: false,
        }
    }

    /// Sources are drained in the order they are added.
    pub fn source(mut self, source: Box<dyn SourceAdapter>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn destination(mut self, destination: Box<dyn DestinationAdapter>) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn repository(mut self, repository: Box<dyn ContextRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn timeout_hook(mut self, hook: Arc<dyn TimeoutHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn category_processor(mut self, processor: Box<dyn Processor<Category>>) -> Self {
        self.category_processors.push(processor);
        self
    }

    pub fn label_processor(mut self, processor: Box<dyn Processor<Label>>) -> Self {
        self.label_processors.push(processor);
        self
    }

    pub fn document_processor(mut self, processor: Box<dyn Processor<Document>>) -> Self {
        self.document_processors.push(processor);
        self
    }

    /// Stop after the diff; nothing is uploaded and the checkpoint is
    /// neither written nor cleared.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn build(self) -> Result<Pipe, SyncError> {
        if self.sources.is_empty() {
            return Err(SyncError::Validation("no source adapter configured".to_string()));
        }
        let Some(destination) = self.destination else {
            return Err(SyncError::Validation(
                "no destination adapter configured".to_string(),
            ));
        };

        let options = DiffOptions::from_config(&self.config);
        let ids = ExternalIdProcessor::from_config(&self.config);
        let suffix = &self.config.name_conflict_suffix;

        let mut category_processors: Vec<Box<dyn Processor<Category>>> = vec![
            Box::new(ids.clone()),
            Box::new(ReferenceResolver),
            Box::new(NameConflictProcessor::new(suffix.clone())),
        ];
        category_processors.extend(self.category_processors);

        let mut label_processors: Vec<Box<dyn Processor<Label>>> = vec![
            Box::new(ids.clone()),
            Box::new(NameConflictProcessor::new(suffix.clone())),
        ];
        label_processors.extend(self.label_processors);

        let mut document_processors: Vec<Box<dyn Processor<Document>>> =
            vec![Box::new(ids), Box::new(ReferenceResolver)];
        document_processors.extend(self.document_processors);

        let mut runtime = Runtime::new();
        for hook in self.hooks {
            runtime.add_timeout_hook(hook);
        }

        Ok(Pipe {
            sources: self.sources,
            destination,
            repository: self.repository,
            runtime,
            kill_after: self.config.kill_after(),
            categories: Phase::new(category_processors, &options),
            labels: Phase::new(label_processors, &options),
            documents: Phase::new(document_processors, &options),
            dry_run: self.dry_run,
        })
    }
}

// ---------------------------------------------------------------------------
// Pipe
// ---------------------------------------------------------------------------

/// One sync pass over one source/destination pair.
pub struct Pipe {
    sources: Vec<Box<dyn SourceAdapter>>,
    destination: Box<dyn DestinationAdapter>,
    repository: Option<Box<dyn ContextRepository>>,
    runtime: Runtime,
    kill_after: Option<Duration>,
    categories: Phase<Category>,
    labels: Phase<Label>,
    documents: Phase<Document>,
    dry_run: bool,
}

impl Pipe {
    /// Handle that cancels the run cooperatively (e.g. from a signal handler).
    pub fn interrupt(&self) -> Interrupt {
        self.runtime.interrupt().clone()
    }

    /// Run the whole pass.
    ///
    /// Returns [`SyncError::Interrupted`] after the checkpoint has been
    /// saved when the run was cancelled.
    pub async fn run(&mut self) -> Result<PipeOutcome, SyncError> {
        let (mut ctx, resumed) = self.initialize().await?;

        self.runtime.start_kill_timer(self.kill_after);
        let processed = self.process_all(&mut ctx).await;
        // Upload must not be killed mid-flight.
        self.runtime.stop_kill_timer();

        if let Err(err) = processed {
            if err.is_interrupted() {
                return Err(self.persist_interrupted(&mut ctx).await);
            }
            tracing::error!(kind = err.kind(), error = %err, "run failed");
            self.discard_checkpoint().await;
            return Err(err);
        }

        let uploaded = if self.dry_run {
            tracing::info!("dry run, skipping upload");
            None
        } else {
            tracing::info!(destination = self.destination.name(), "uploading");
            let summary = match upload(self.destination.as_mut(), &ctx.syncable_contents).await {
                Ok(summary) => summary,
                Err(err) => {
                    tracing::error!(kind = err.kind(), error = %err, "upload failed");
                    self.discard_checkpoint().await;
                    return Err(err);
                }
            };
            // The destination is already updated, so the run still succeeds.
            if let Some(repository) = &self.repository {
                if let Err(err) = repository.clear().await {
                    tracing::error!(
                        error = %err,
                        "upload succeeded but the checkpoint could not be cleared; \
                         remove it before the next run",
                    );
                }
            }
            Some(summary)
        };

        let phases = EntityType::all()
            .iter()
            .map(|&entity| {
                let (processed, failed, _) = ctx.counts(entity);
                PhaseSummary {
                    entity,
                    processed,
                    failed,
                }
            })
            .collect();

        Ok(PipeOutcome {
            resumed,
            phases,
            stored: ctx.stored_content.take().unwrap_or_default(),
            failed: std::mem::take(&mut ctx.pipe.failed_items),
            contents: ctx.syncable_contents,
            upload: uploaded,
        })
    }

    async fn initialize(&mut self) -> Result<(PipeContext, bool), SyncError> {
        tracing::info!(destination = self.destination.name(), "initializing");
        self.destination.authenticate().await?;

        let (ctx, resumed) = match self.restore_checkpoint().await? {
            Some(ctx) => (ctx, true),
            None => {
                let stored = self.destination.export_all_entities().await?;
                tracing::info!(
                    categories = stored.categories.len(),
                    labels = stored.labels.len(),
                    documents = stored.documents.len(),
                    "fetched destination snapshot",
                );
                (PipeContext::fresh(stored), false)
            }
        };

        for source in &mut self.sources {
            source.initialize(&ctx).await?;
        }
        self.categories.initialize(&ctx).await?;
        self.labels.initialize(&ctx).await?;
        self.documents.initialize(&ctx).await?;
        Ok((ctx, resumed))
    }

    /// A missing or unreadable checkpoint means a fresh start.
    async fn restore_checkpoint(&self) -> Result<Option<PipeContext>, SyncError> {
        let Some(repository) = &self.repository else {
            return Ok(None);
        };
        if !repository.exists().await? {
            return Ok(None);
        }
        match repository.load().await {
            Ok(ctx) => {
                tracing::info!(completed = ?ctx.pipe.completed_phases, "resuming from checkpoint");
                Ok(Some(ctx))
            }
            Err(err) => {
                tracing::warn!(error = %err, "checkpoint unreadable, starting fresh");
                Ok(None)
            }
        }
    }

    async fn process_all(&mut self, ctx: &mut PipeContext) -> Result<(), SyncError> {
        let interrupt = self.runtime.interrupt().clone();
        self.categories
            .run(&mut self.sources, &interrupt, ctx)
            .await?;
        self.labels.run(&mut self.sources, &interrupt, ctx).await?;
        self.documents
            .run(&mut self.sources, &interrupt, ctx)
            .await?;
        Ok(())
    }

    /// Capture adapter state, fire the timeout hooks and save the context.
    async fn persist_interrupted(&mut self, ctx: &mut PipeContext) -> SyncError {
        tracing::warn!("run interrupted");
        for source in &self.sources {
            match source.checkpoint() {
                Ok(Some(state)) => {
                    ctx.adapter_state.insert(source.name().to_string(), state);
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(source = source.name(), error = %err, "adapter checkpoint failed")
                }
            }
        }

        self.runtime.run_timeout_hooks(ctx).await;

        if self.dry_run {
            return SyncError::Interrupted;
        }
        if let Some(repository) = &self.repository {
            if let Err(err) = repository.save(ctx).await {
                tracing::error!(error = %err, "could not save checkpoint");
                return err;
            }
        }
        SyncError::Interrupted
    }

    /// After a hard failure the next attempt starts from a fresh snapshot.
    async fn discard_checkpoint(&self) {
        if self.dry_run {
            return;
        }
        if let Some(repository) = &self.repository {
            if let Err(err) = repository.clear().await {
                tracing::warn!(error = %err, "could not clear checkpoint");
            }
        }
    }
}
