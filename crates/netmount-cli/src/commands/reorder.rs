//! Move command - change an entry's position in processing order.

use anyhow::Result;
use clap::Args as ClapArgs;
use netmount_core::catalog;
use std::path::PathBuf;

use super::{Context, absolute};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Mount point of the entry
    pub path: PathBuf,

    /// New position, 1-based as shown by `list`
    #[arg(value_parser = clap::value_parser!(u32).range(1..))]
    pub position: u32,
}

pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let path = absolute(&args.path)?;
    let index = usize::try_from(args.position - 1)?;
    ctx.store
        .update(ctx.admin()?, |entries| Ok(catalog::move_to(entries, &path, index)?))?;
    ctx.note(format!("Moved {} to #{}", path.display(), args.position));
    Ok(())
}
