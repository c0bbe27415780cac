//! Add command - declare a new mount.

use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args as ClapArgs;
use netmount_core::{NewMount, RemoteUrl, catalog};
use secrecy::ExposeSecret;
use tracing::instrument;

use super::Context;
use crate::auth::prompt_password;

#[derive(ClapArgs, Clone)]
pub struct Args {
    /// Remote location: smb://host/share, ftp://host[:port]/dir or sftp://host[:port]/dir
    pub url: String,

    /// Mount point name under the mount root (letters and digits), or an absolute path
    pub name: String,

    /// Remote user name
    #[arg(long)]
    pub user: Option<String>,

    /// Remote password (prompted on a terminal when omitted)
    #[arg(long, value_name = "PASSWORD")]
    pub password_entry: Option<String>,

    /// SMB protocol version, e.g. 3.0
    #[arg(long)]
    pub smb_version: Option<String>,
}

#[instrument(level = "info", name = "cmd::add", skip_all, fields(url = %args.url))]
pub fn execute(ctx: &Context, args: &Args) -> Result<()> {
    let path = if args.name.starts_with('/') {
        PathBuf::from(&args.name)
    } else {
        catalog::mount_point(&ctx.config.mount_root()?, &args.name)?
    };

    let user = args.user.clone().unwrap_or_default();
    let password = match &args.password_entry {
        Some(password) => password.clone(),
        None if !user.is_empty() && std::io::stdin().is_terminal() => {
            let host = args
                .url
                .parse::<RemoteUrl>()
                .map(|u| u.host().to_string())
                .unwrap_or_default();
            prompt_password(&format!("Password for {user}@{host}: "))?
                .expose_secret()
                .to_string()
        }
        None => String::new(),
    };

    let new = NewMount::new(&args.url, &path)
        .user(user)
        .password(password)
        .smb_version(args.smb_version.clone());

    let admin = ctx.admin()?;
    let index = ctx
        .store
        .update(admin, |entries| Ok(catalog::add(entries, new)?))
        .with_context(|| format!("Failed to add {}", args.url))?;

    ctx.note(format!("Added #{} {} -> {}", index + 1, args.url, path.display()));
    Ok(())
}
