//! `kbsync sync`: pull from the source, diff, upload.

use anyhow::{bail, Result};
use clap::Args;
use colored::Colorize;

use kbsync_engine::{PipeOutcome, SyncError};

use super::{interrupt_on_ctrl_c, pipe_builder, ConfigArgs};

/// Arguments for `kbsync sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Allow a run that would delete every entity this source created.
    #[arg(long)]
    pub allow_prune_all: bool,
}

impl SyncArgs {
    pub async fn run(self) -> Result<()> {
        let mut config = self.config.load()?;
        if self.allow_prune_all {
            config.allow_prune_all_entities = true;
        }
        let repository = self.config.repository(&config)?;
        let checkpoint = repository.path().to_path_buf();

        let mut pipe = pipe_builder(&config)?
            .repository(Box::new(repository))
            .build()?;
        interrupt_on_ctrl_c(pipe.interrupt());

        match pipe.run().await {
            Ok(outcome) => {
                print_outcome(&outcome);
                Ok(())
            }
            Err(SyncError::Interrupted) => bail!(
                "sync interrupted; progress saved to checkpoint {}",
                checkpoint.display()
            ),
            Err(err) => Err(err.into()),
        }
    }
}

fn print_outcome(outcome: &PipeOutcome) {
    if outcome.resumed {
        println!("{}", "resumed from checkpoint".bright_black());
    }
    match &outcome.upload {
        Some(upload) if upload.skipped => println!("{} nothing to do", "✓".green()),
        Some(upload) => println!(
            "{} synced ({} imported, {} deleted)",
            "✓".green(),
            upload.imported.total(),
            upload.deleted.total(),
        ),
        None => {}
    }

    for phase in &outcome.phases {
        let failed = if phase.failed > 0 {
            phase.failed.to_string().red().to_string()
        } else {
            phase.failed.to_string()
        };
        println!(
            "  {:<10} {} processed, {} failed",
            phase.entity.to_string(),
            phase.processed,
            failed
        );
    }

    let failures = outcome
        .failed
        .categories
        .iter()
        .map(|f| (f.item.meta.external_id.as_deref(), &f.errors))
        .chain(
            outcome
                .failed
                .labels
                .iter()
                .map(|f| (f.item.meta.external_id.as_deref(), &f.errors)),
        )
        .chain(
            outcome
                .failed
                .documents
                .iter()
                .map(|f| (f.item.meta.external_id.as_deref(), &f.errors)),
        );
    for (external_id, errors) in failures {
        for error in errors {
            println!(
                "  {} {}: {} ({})",
                "✗".red(),
                external_id.unwrap_or("<no external id>"),
                error.message,
                error.kind
            );
        }
    }
}
