//! `kbsync diff`: show what a sync would change without uploading.

use anyhow::{Context, Result};
use clap::Args;
use similar::TextDiff;

use kbsync_core::{Entity, ImportableContent};
use kbsync_engine::PipeOutcome;

use super::{interrupt_on_ctrl_c, pipe_builder, ConfigArgs};

/// Arguments for `kbsync diff`.
#[derive(Args, Debug)]
pub struct DiffArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
}

impl DiffArgs {
    pub async fn run(self) -> Result<()> {
        let config = self.config.load()?;
        // No repository: a preview never reads or writes the checkpoint.
        let mut pipe = pipe_builder(&config)?.dry_run(true).build()?;
        interrupt_on_ctrl_c(pipe.interrupt());

        let outcome = pipe.run().await.context("diff failed")?;
        print!("{}", render(&outcome)?);
        Ok(())
    }
}

fn render(outcome: &PipeOutcome) -> Result<String> {
    if outcome.contents.is_empty() {
        return Ok("No differences.\n".to_string());
    }
    let mut out = String::new();
    render_content(&outcome.contents.categories, &outcome.stored.categories, &mut out)?;
    render_content(&outcome.contents.labels, &outcome.stored.labels, &mut out)?;
    render_content(&outcome.contents.documents, &outcome.stored.documents, &mut out)?;
    Ok(out)
}

fn describe<T: Entity>(item: &T) -> String {
    let external_id = item.external_id().unwrap_or("-");
    match item.name() {
        Some(name) => format!("{} {external_id} \"{name}\"", T::KIND),
        None => format!("{} {external_id}", T::KIND),
    }
}

fn render_content<T: Entity>(
    content: &ImportableContent<T>,
    stored: &[T],
    out: &mut String,
) -> Result<()> {
    for item in &content.created {
        out.push_str(&format!("+ {}\n", describe(item)));
    }
    for item in &content.updated {
        out.push_str(&format!("~ {}\n", describe(item)));
        let Some(previous) = stored.iter().find(|s| s.id().is_some() && s.id() == item.id())
        else {
            continue;
        };
        let old = serde_json::to_string_pretty(previous).context("serialize stored item")?;
        let new = serde_json::to_string_pretty(item).context("serialize collected item")?;
        let label = item.external_id().unwrap_or("item");
        let unified = TextDiff::from_lines(&old, &new)
            .unified_diff()
            .header(&format!("a/{label}"), &format!("b/{label}"))
            .context_radius(3)
            .to_string();
        out.push_str(&unified);
        if !unified.ends_with('\n') {
            out.push('\n');
        }
    }
    for item in &content.deleted {
        out.push_str(&format!("- {}\n", describe(item)));
    }
    Ok(())
}
