//! Edit command - change an entry's URL or credentials.

use anyhow::{Context as _, Result, bail};
use clap::Args as ClapArgs;
use netmount_core::{Credential, EntryChanges, catalog};
use std::path::PathBuf;
use tracing::instrument;

use super::{Context, absolute};

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Mount point of the entry
    pub path: PathBuf,

    /// New remote URL
    #[arg(long)]
    pub url: Option<String>,

    /// New user name
    #[arg(long)]
    pub user: Option<String>,

    /// New remote password
    #[arg(long, value_name = "PASSWORD")]
    pub password_entry: Option<String>,

    /// New SMB version; an empty value clears it
    #[arg(long)]
    pub smb_version: Option<String>,
}

#[instrument(level = "info", name = "cmd::edit", skip_all, fields(path = %args.path.display()))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let changes = EntryChanges {
        url: args.url.clone(),
        user: args.user.clone(),
        password: args.password_entry.as_deref().map(Credential::from),
        smb_version: args.smb_version.clone().map(Some),
    };
    if changes.url.is_none()
        && changes.user.is_none()
        && changes.password.is_none()
        && changes.smb_version.is_none()
    {
        bail!("Nothing to change; pass --url, --user, --password-entry or --smb-version");
    }

    let path = absolute(&args.path)?;
    ctx.store
        .update(ctx.admin()?, |entries| Ok(catalog::edit(entries, &path, changes)?))
        .with_context(|| format!("Failed to edit {}", path.display()))?;

    ctx.note(format!("Updated {}", path.display()));
    Ok(())
}
