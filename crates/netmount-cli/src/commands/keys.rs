//! Keys command - SFTP key pairs.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Subcommand;
use netmount_core::{Protocol, RemoteUrl};
use netmount_mount::keys;
use tracing::{instrument, warn};

use super::{Context, absolute};

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Generate, install and verify the key pair of an SFTP entry
    Setup {
        /// Mount point of the entry
        path: PathBuf,
    },

    /// Print where an entry's private key lives
    Path {
        /// Mount point of the entry
        path: PathBuf,
    },
}

pub fn execute(ctx: &Context, cmd: &Command) -> Result<()> {
    match cmd {
        Command::Setup { path } => setup(ctx, path),
        Command::Path { path } => show_path(ctx, path),
    }
}

#[instrument(level = "info", name = "cmd::keys::setup", skip(ctx))]
fn setup(ctx: &Context, path: &std::path::Path) -> Result<()> {
    let spec = ctx.entry(path)?;
    let executor = ctx.executor()?;
    let key_dir = ctx.config.key_dir()?;

    let outcome = keys::provision_key(executor.runner(), &spec, &key_dir);
    let valid = outcome.is_ok();
    let target = absolute(path)?;
    ctx.store.update(ctx.admin()?, |entries| {
        if let Some(entry) = entries.iter_mut().find(|e| e.path == target) {
            entry.sshkeyvalid = Some(valid);
        }
        Ok(())
    })?;

    match outcome {
        Ok(key) => {
            ctx.note(format!("Key installed: {}", key.display()));
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Key setup failed");
            Err(e).with_context(|| format!("Key setup failed for {}", spec.url))
        }
    }
}

fn show_path(ctx: &Context, path: &std::path::Path) -> Result<()> {
    let spec = ctx.entry(path)?;
    let RemoteUrl::Sftp(endpoint) = &spec.url else {
        bail!("{} is not an SFTP entry", spec.url);
    };
    let key = keys::key_path(
        &ctx.config.key_dir()?,
        &endpoint.host,
        endpoint.port_or_default(Protocol::Sftp),
    );
    println!("{}", key.display());
    if spec.sshkeyvalid != Some(true) {
        ctx.note("Key not verified yet; run 'netmount keys setup' for this entry.");
    }
    Ok(())
}
