//! Automount command - opt an entry in or out of unattended mounting.

use anyhow::Result;
use clap::{Args as ClapArgs, ValueEnum};
use netmount_core::catalog;
use std::path::PathBuf;

use super::{Context, absolute};

#[derive(Clone, Copy, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Mount point of the entry
    pub path: PathBuf,

    /// New setting
    #[arg(value_enum)]
    pub state: Toggle,
}

pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let path = absolute(&args.path)?;
    let enabled = matches!(args.state, Toggle::On);
    ctx.store.update(ctx.admin()?, |entries| {
        Ok(catalog::set_automount(entries, &path, enabled)?)
    })?;
    ctx.note(format!(
        "Automount {} for {}",
        if enabled { "enabled" } else { "disabled" },
        path.display()
    ));
    Ok(())
}
