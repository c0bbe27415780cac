//! Unmount command - unmount one entry and turn its automount off.

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use netmount_mount::BatchKind;
use std::path::PathBuf;
use tracing::instrument;

use super::{Context, absolute};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Mount point of the entry
    pub path: PathBuf,
}

#[instrument(level = "info", name = "cmd::unmount", skip_all, fields(path = %args.path.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let path = absolute(&args.path)?;
    let mut reconciler = ctx.manual_reconciler()?;
    let outcome = reconciler.act_on(&path, BatchKind::Unmount)?;
    outcome
        .result
        .with_context(|| format!("Failed to unmount {}", path.display()))?;

    ctx.note(format!("Unmounted {} (automount off)", path.display()));
    Ok(())
}
