//! kbsync: resumable one-way knowledge-base sync.
//!
//! # Usage
//!
//! ```text
//! kbsync sync   [--config kbsync.yaml] [--context <file>] [--allow-prune-all]
//! kbsync diff   [--config kbsync.yaml]
//! kbsync status [--config kbsync.yaml] [--context <file>] [--json]
//! kbsync reset  [--config kbsync.yaml] [--context <file>]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::{diff::DiffArgs, reset::ResetArgs, status::StatusArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "kbsync",
    version,
    about = "Sync knowledge-base content from a source into a destination",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pull, diff and upload; resumes from a checkpoint if one exists.
    Sync(SyncArgs),

    /// Show what a sync would change without uploading.
    Diff(DiffArgs),

    /// Show the checkpoint left by an interrupted run.
    Status(StatusArgs),

    /// Discard the checkpoint.
    Reset(ResetArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sync(args) => args.run().await,
        Commands::Diff(args) => args.run().await,
        Commands::Status(args) => args.run().await,
        Commands::Reset(args) => args.run().await,
    }
}
