//! Completions command - print a shell completion script.

use anyhow::Result;
use clap::{Args as ClapArgs, CommandFactory};
use clap_complete::Shell;

use crate::Cli;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

pub fn execute(args: &Args) -> Result<()> {
    let mut command = Cli::command();
    clap_complete::generate(args.shell, &mut command, "netmount", &mut std::io::stdout());
    Ok(())
}
