//! Login command - mount automount entries once, then hand over to the daemon.

use anyhow::Result;
use clap::Args as ClapArgs;
use netmount_mount::{ConfirmationGate, process};
use tracing::{info, instrument};

use super::Context;
use super::daemon::spawn_background;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Do not start the background daemon afterwards
    #[arg(long)]
    pub no_daemon: bool,
}

#[instrument(level = "info", name = "cmd::login", skip_all)]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let mut reconciler = ctx.reconciler(ConfirmationGate::auto(true))?;
    let report = reconciler.automount_once()?;

    for outcome in &report.outcomes {
        if let Err(e) = &outcome.result {
            ctx.note(format!("Could not mount {}: {e}", outcome.path.display()));
        }
    }
    info!(
        mounted = report.succeeded(),
        attempted = report.outcomes.len(),
        "Login automount finished"
    );

    if args.no_daemon {
        return Ok(());
    }
    let running = process::find_daemons(env!("CARGO_BIN_NAME"));
    if running.is_empty() {
        let pid = spawn_background(ctx, ctx.admin()?)?;
        ctx.note(format!("Daemon started (PID {pid})"));
    } else {
        info!(pids = ?running, "Daemon already running");
    }
    Ok(())
}
