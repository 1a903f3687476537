//! Two-pass execution of one entity type.
//!
//! First pass: every item pulled from the streams (in order, one stream
//! drained before the next) runs through the processors then the
//! aggregator. Transformation failures are deferred to the front of
//! `unprocessedItems`; anything else non-fatal becomes a [`FailedEntity`].
//!
//! Second pass: deferred items are retried exactly once, with
//! `first_try = false`; a transformation failure is now terminal.
//!
//! `Interrupted` at any point puts the pristine item back at the front of
//! `unprocessedItems` and propagates, so no item is lost.

use futures::StreamExt;
use serde::Serialize;

use kbsync_core::{Entity, FailedEntity};

use crate::adapter::ItemStream;
use crate::aggregator::Aggregator;
use crate::context::{ContextEntity, PipeContext};
use crate::error::SyncError;
use crate::processor::Processor;
use crate::runtime::Interrupt;

/// Counters for one Worker execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct WorkerReport {
    /// Items pulled from the streams.
    pub received: usize,
    pub processed: usize,
    /// First-pass deferrals.
    pub deferred: usize,
    /// Deferred items that succeeded on retry.
    pub recovered: usize,
    pub failed: usize,
}

pub struct Worker<'w, T: Entity> {
    interrupt: Interrupt,
    processors: Vec<&'w dyn Processor<T>>,
    aggregator: &'w mut dyn Aggregator<T>,
}

impl<'w, T: ContextEntity> Worker<'w, T> {
    /// Processors are ordered by descending priority; ties keep their order.
    pub fn new(
        interrupt: Interrupt,
        processors: &'w [Box<dyn Processor<T>>],
        aggregator: &'w mut dyn Aggregator<T>,
    ) -> Self {
        let mut processors: Vec<&'w dyn Processor<T>> = processors
            .iter()
            .map(|p| -> &'w dyn Processor<T> { p.as_ref() })
            .collect();
        processors.sort_by_key(|p| std::cmp::Reverse(p.priority()));
        Self {
            interrupt,
            processors,
            aggregator,
        }
    }

    /// Run both passes. Stream errors and fatal errors abort the execution.
    pub async fn execute(
        &mut self,
        streams: Vec<ItemStream<'_, T>>,
        ctx: &mut PipeContext,
    ) -> Result<WorkerReport, SyncError> {
        let mut report = WorkerReport::default();

        for mut stream in streams {
            while let Some(item) = stream.next().await {
                let item = item?;
                report.received += 1;
                self.first_pass(item, ctx, &mut report).await?;
            }
        }

        self.second_pass(ctx, &mut report).await?;

        tracing::info!(
            entity = %T::KIND,
            received = report.received,
            processed = report.processed,
            deferred = report.deferred,
            recovered = report.recovered,
            failed = report.failed,
            "phase processed",
        );
        Ok(report)
    }

    async fn first_pass(
        &mut self,
        item: T,
        ctx: &mut PipeContext,
        report: &mut WorkerReport,
    ) -> Result<(), SyncError> {
        match self.process(&item, ctx, true).await {
            Ok(done) => {
                T::processed_mut(ctx).push(done);
                report.processed += 1;
            }
            Err(err) if err.is_interrupted() => {
                T::unprocessed_mut(ctx).push_front(item);
                return Err(err);
            }
            Err(err) if err.is_transformation() => {
                tracing::debug!(
                    entity = %T::KIND,
                    external_id = ?item.external_id(),
                    error = %err,
                    "deferred to retry pass",
                );
                T::unprocessed_mut(ctx).push_front(item);
                report.deferred += 1;
            }
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => record_failure(item, err, ctx, report),
        }
        Ok(())
    }

    async fn second_pass(
        &mut self,
        ctx: &mut PipeContext,
        report: &mut WorkerReport,
    ) -> Result<(), SyncError> {
        while let Some(item) = T::unprocessed_mut(ctx).pop_front() {
            match self.process(&item, ctx, false).await {
                Ok(done) => {
                    T::processed_mut(ctx).push(done);
                    report.processed += 1;
                    report.recovered += 1;
                }
                Err(err) if err.is_interrupted() => {
                    T::unprocessed_mut(ctx).push_front(item);
                    return Err(err);
                }
                Err(err) if err.is_fatal() => return Err(err),
                Err(err) => record_failure(item, err, ctx, report),
            }
        }
        Ok(())
    }

    /// Processors then aggregator on a copy of `original`.
    async fn process(
        &mut self,
        original: &T,
        ctx: &mut PipeContext,
        first_try: bool,
    ) -> Result<T, SyncError> {
        self.interrupt.check()?;
        let mut item = original.clone();
        for processor in &self.processors {
            item = processor.run(item, &*ctx, first_try).await?;
        }
        self.aggregator.aggregate(item, ctx).await
    }
}

fn record_failure<T: ContextEntity>(
    item: T,
    err: SyncError,
    ctx: &mut PipeContext,
    report: &mut WorkerReport,
) {
    tracing::warn!(
        entity = %T::KIND,
        external_id = ?item.external_id(),
        kind = err.kind(),
        error = %err,
        "item failed",
    );
    T::failed_mut(ctx).push(FailedEntity {
        item,
        errors: vec![err.body()],
    });
    report.failed += 1;
}
