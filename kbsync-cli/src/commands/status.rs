//! `kbsync status`: what an interrupted run left behind.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use kbsync_core::EntityType;
use kbsync_engine::{ContextRepository, PipeContext};

use super::ConfigArgs;

/// Arguments for `kbsync status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    checkpoint: String,
    exists: bool,
    saved_at: Option<DateTime<Utc>>,
    entities: Vec<EntityStatus>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EntityStatus {
    entity: EntityType,
    complete: bool,
    processed: usize,
    pending: usize,
    failed: usize,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Phase")]
    phase: String,
    #[tabled(rename = "Processed")]
    processed: usize,
    #[tabled(rename = "Pending")]
    pending: usize,
    #[tabled(rename = "Failed")]
    failed: usize,
}

impl StatusArgs {
    pub async fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let repository = self.config.repository(&config)?;
        let checkpoint = repository.path().display().to_string();

        let ctx = if repository.exists().await? {
            Some(repository.load().await.context("checkpoint is unreadable")?)
        } else {
            None
        };
        let report = build_report(checkpoint, ctx.as_ref());

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
        } else {
            print_table(&report);
        }
        Ok(())
    }
}

fn build_report(checkpoint: String, ctx: Option<&PipeContext>) -> StatusReport {
    let entities = ctx
        .map(|ctx| {
            EntityType::all()
                .iter()
                .map(|&entity| {
                    let (processed, failed, pending) = ctx.counts(entity);
                    EntityStatus {
                        entity,
                        complete: ctx.is_phase_complete(entity),
                        processed,
                        pending,
                        failed,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    StatusReport {
        checkpoint,
        exists: ctx.is_some(),
        saved_at: ctx.and_then(|ctx| ctx.saved_at),
        entities,
    }
}

fn print_table(report: &StatusReport) {
    if !report.exists {
        println!(
            "{} no checkpoint at {}; the next sync starts fresh",
            "■".green().bold(),
            report.checkpoint
        );
        return;
    }

    let saved = report
        .saved_at
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "unknown".to_string());
    println!(
        "{} checkpoint at {} (saved {saved})",
        "■".yellow().bold(),
        report.checkpoint
    );

    let rows: Vec<StatusTableRow> = report
        .entities
        .iter()
        .map(|e| StatusTableRow {
            entity: e.entity.to_string(),
            phase: if e.complete { "done" } else { "pending" }.to_string(),
            processed: e.processed,
            pending: e.pending,
            failed: e.failed,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    println!("Run 'kbsync sync' to resume or 'kbsync reset' to discard.");
}
