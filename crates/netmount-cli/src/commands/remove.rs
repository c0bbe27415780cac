//! Remove command - unmount if needed, then delete the entry.

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use netmount_core::catalog;
use netmount_mount::{BatchKind, Probe};
use std::path::PathBuf;
use tracing::{debug, instrument};

use super::Context;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Mount point of the entry
    pub path: PathBuf,
}

#[instrument(level = "info", name = "cmd::remove", skip_all, fields(path = %args.path.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let entry = ctx.entry(&args.path)?;
    let path = entry.path.clone();

    if ctx.probe().is_mounted(&path) {
        let mut reconciler = ctx.manual_reconciler()?;
        reconciler
            .act_on(&path, BatchKind::Unmount)?
            .result
            .with_context(|| format!("Failed to unmount {} before removing it", path.display()))?;
    }

    ctx.store
        .update(ctx.admin()?, |entries| Ok(catalog::remove(entries, &path)?))?;

    // Only an empty directory goes; anything else stays for the user.
    if let Err(e) = std::fs::remove_dir(&path) {
        debug!(path = %path.display(), error = %e, "Mount point left in place");
    }

    ctx.note(format!("Removed {} ({})", path.display(), entry.url));
    Ok(())
}
