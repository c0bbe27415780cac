//! Export and import commands - move entries between store files.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use netmount_core::{EncryptedStore, ImportPolicy, catalog};
use secrecy::SecretString;
use tracing::instrument;

use super::Context;
use crate::auth::{prompt_new_password, prompt_password};

#[derive(ClapArgs, Clone)]
pub struct ExportArgs {
    /// Destination store file
    pub file: PathBuf,

    /// Seal the export under its own password instead of the admin one
    #[arg(long, value_name = "PASSWORD")]
    pub file_password: Option<String>,

    /// Prompt for the export's own password
    #[arg(long, conflicts_with = "file_password")]
    pub ask_file_password: bool,
}

#[derive(ClapArgs, Clone)]
pub struct ImportArgs {
    /// Source store file
    pub file: PathBuf,

    /// Overwrite entries that already exist with the same URL and path
    #[arg(long)]
    pub replace: bool,

    /// Password of the source file, if it differs from the admin one
    #[arg(long, value_name = "PASSWORD")]
    pub file_password: Option<String>,

    /// Prompt for the source file's password
    #[arg(long, conflicts_with = "file_password")]
    pub ask_file_password: bool,
}

#[instrument(level = "info", name = "cmd::export", skip_all, fields(file = %args.file.display()))]
pub fn export(ctx: &Context, args: &ExportArgs) -> Result<()> {
    let admin = ctx.admin()?;
    let dest_password: SecretString = match (&args.file_password, args.ask_file_password) {
        (Some(password), _) => SecretString::from(password.clone()),
        (None, true) => prompt_new_password("Password for the exported file: ")?,
        (None, false) => admin.clone(),
    };

    let count = ctx
        .store
        .export_to(admin, &args.file, &dest_password)
        .with_context(|| format!("Failed to export to {}", args.file.display()))?;
    ctx.note(format!("Exported {count} entries to {}", args.file.display()));
    Ok(())
}

#[instrument(level = "info", name = "cmd::import", skip_all, fields(file = %args.file.display()))]
pub fn import(ctx: &Context, args: &ImportArgs) -> Result<()> {
    let admin = ctx.admin()?;
    let source_password: SecretString = match (&args.file_password, args.ask_file_password) {
        (Some(password), _) => SecretString::from(password.clone()),
        (None, true) => prompt_password("Password of the imported file: ")?,
        (None, false) => admin.clone(),
    };

    let imported = EncryptedStore::import_from(&args.file, &source_password)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let policy = if args.replace {
        ImportPolicy::Replace
    } else {
        ImportPolicy::Skip
    };
    let summary = ctx
        .store
        .update(admin, |entries| Ok(catalog::merge_import(entries, imported, policy)))?;

    ctx.note(format!(
        "Imported {}: {} added, {} replaced, {} skipped",
        args.file.display(),
        summary.added,
        summary.replaced,
        summary.skipped
    ));
    Ok(())
}
