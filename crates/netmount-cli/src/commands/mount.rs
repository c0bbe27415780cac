//! Mount command - mount one entry now, regardless of automount.

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use netmount_mount::{BatchKind, Probe};
use std::path::PathBuf;
use tracing::instrument;

use super::{Context, absolute};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Mount point of the entry
    pub path: PathBuf,
}

#[instrument(level = "info", name = "cmd::mount", skip_all, fields(path = %args.path.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let entry = ctx.entry(&args.path)?;
    if ctx.probe().is_mounted(&entry.path) {
        ctx.note(format!("{} is already mounted", entry.path.display()));
        return Ok(());
    }

    let path = absolute(&args.path)?;
    let mut reconciler = ctx.manual_reconciler()?;
    let outcome = reconciler.act_on(&path, BatchKind::Mount)?;
    outcome
        .result
        .with_context(|| format!("Failed to mount {} at {}", entry.url, path.display()))?;

    ctx.note(format!("Mounted {} at {}", entry.url, path.display()));
    Ok(())
}
