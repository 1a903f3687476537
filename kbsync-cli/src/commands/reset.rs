//! `kbsync reset`: discard the checkpoint so the next sync starts fresh.

use anyhow::{Context, Result};
use clap::Args;

use kbsync_engine::ContextRepository;

use super::ConfigArgs;

/// Arguments for `kbsync reset`.
#[derive(Args, Debug)]
pub struct ResetArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl ResetArgs {
    pub async fn run(self) -> Result<()> {
        let config = self.config.load()?;
        let repository = self.config.repository(&config)?;
        let path = repository.path().display().to_string();

        if !repository.exists().await? {
            println!("No checkpoint at {path}.");
            return Ok(());
        }
        repository
            .clear()
            .await
            .with_context(|| format!("failed to remove checkpoint {path}"))?;
        println!("Removed checkpoint {path}.");
        Ok(())
    }
}
