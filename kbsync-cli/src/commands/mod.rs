//! Subcommands and the plumbing they share.

pub mod diff;
pub mod reset;
pub mod status;
pub mod sync;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use kbsync_core::SyncConfig;
use kbsync_engine::{FileContextRepository, Interrupt, PipeBuilder};

/// Options every subcommand accepts.
#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Path to the sync configuration file.
    #[arg(long, short, default_value = "kbsync.yaml")]
    pub config: PathBuf,

    /// Checkpoint file (overrides `contextPath`).
    #[arg(long)]
    pub context: Option<PathBuf>,
}

impl ConfigArgs {
    /// Load the config and apply command-line overrides.
    pub fn load(&self) -> Result<SyncConfig> {
        let mut config = SyncConfig::load_at(&self.config)
            .with_context(|| format!("failed to load config {}", self.config.display()))?;
        if let Some(context) = &self.context {
            config.context_path = Some(context.clone());
        }
        Ok(config)
    }

    /// Checkpoint repository the config points at.
    pub fn repository(&self, config: &SyncConfig) -> Result<FileContextRepository> {
        let path = config
            .context_path()
            .context("could not determine checkpoint path")?;
        Ok(FileContextRepository::new(path))
    }
}

/// Pipe wired with the adapters named in `config`.
pub fn pipe_builder(config: &SyncConfig) -> Result<PipeBuilder> {
    config.validate().context("invalid configuration")?;
    let source = kbsync_local::source_from_config(config)?;
    let destination = kbsync_local::destination_from_config(config)?;
    Ok(PipeBuilder::new(config.clone())
        .source(Box::new(source))
        .destination(Box::new(destination)))
}

/// Ctrl-C stops the run the same way the kill timer does.
pub fn interrupt_on_ctrl_c(interrupt: Interrupt) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("ctrl-c received, stopping after the current item");
            interrupt.interrupt();
        }
    });
}
