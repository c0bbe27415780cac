#![deny(unsafe_code)]

mod auth;
mod commands;
mod config;
mod exit_code;

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use netmount_core::{CatalogError, StoreError};
use netmount_mount::{ExecError, KeyError};

use crate::auth::PasswordSource;
use crate::commands::{
    Context, add, automount, completions, daemon, edit, keys, list, login, mount, remove, reorder,
    status, transfer, unmount,
};
use crate::config::Config;

/// Declarative SMB, FTP and SFTP mounts kept in an encrypted store
#[derive(Parser)]
#[command(name = "netmount")]
#[command(author, version)]
#[command(propagate_version = true)]
#[command(after_help = "EXAMPLES:
    # Declare a share and let the daemon mount it when the host is reachable
    netmount add smb://nas/media media --user me
    netmount automount ~/mnt/media on
    netmount daemon start

    # Scripted use (password from a secret manager)
    secret-tool lookup netmount admin | netmount --password-stdin status --json
")]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Encrypted store file
    #[arg(long, env = "NETMOUNT_STORE", global = true)]
    store: Option<PathBuf>,

    /// Admin password (insecure, prefer --password-stdin)
    #[arg(long, global = true)]
    password: Option<String>,

    /// Read the admin password from stdin (single line)
    #[arg(long, conflicts_with = "password", global = true)]
    password_stdin: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show entries in order with their last known status
    List(list::Args),

    /// Declare a new mount under the mount root
    Add(add::Args),

    /// Change an entry's URL or credentials
    Edit(edit::Args),

    /// Unmount if needed and delete an entry
    Remove(remove::Args),

    /// Move an entry to another position
    Move(reorder::Args),

    /// Turn automount on or off for an entry
    Automount(automount::Args),

    /// Mount one entry now
    Mount(mount::Args),

    /// Unmount one entry now (also turns automount off)
    Unmount(unmount::Args),

    /// Probe every entry: mounted, reachable, mountable
    Status(status::Args),

    /// Write all entries to another store file
    Export(transfer::ExportArgs),

    /// Merge entries from another store file
    Import(transfer::ImportArgs),

    /// SFTP key pair management
    #[command(subcommand)]
    Keys(keys::Command),

    /// Mount automount entries once, then start the daemon
    Login(login::Args),

    /// Reconciliation daemon
    #[command(subcommand)]
    Daemon(daemon::Command),

    /// Generate shell completions
    Completions(completions::Args),
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::from(exit_code::SUCCESS),
        Err(e) => {
            let code = categorize_error(&e);

            let args: Vec<String> = std::env::args().collect();
            let is_quiet = args.iter().any(|a| a == "-q" || a == "--quiet");
            if !is_quiet {
                eprintln!("Error: {e:#}");
            }

            ExitCode::from(code)
        }
    }
}

fn run() -> Result<()> {
    // Scrub the handed-over password before anything can spawn a child.
    let handoff = netmount_mount::daemon::take_handoff_password();
    let cli = Cli::parse();

    let long_running = matches!(
        cli.command,
        Commands::Login(_) | Commands::Daemon(daemon::Command::Run(_))
    );
    let log_file = match &cli.command {
        Commands::Daemon(daemon::Command::Run(args)) => args.log_file,
        _ => false,
    };
    if !cli.quiet {
        setup_tracing(cli.verbose, long_running, log_file)?;
    }

    let config = Config::load()?;
    let store_path = config.store_path(cli.store.as_deref())?;
    let password = PasswordSource {
        flag: cli.password.clone(),
        stdin: cli.password_stdin,
        handoff,
    };
    let ctx = Context::new(config, store_path, password, cli.quiet);

    match cli.command {
        Commands::List(args) => list::execute(&ctx, &args),
        Commands::Add(args) => add::execute(&ctx, &args),
        Commands::Edit(args) => edit::execute(&ctx, &args),
        Commands::Remove(args) => remove::execute(&ctx, &args),
        Commands::Move(args) => reorder::execute(&ctx, &args),
        Commands::Automount(args) => automount::execute(&ctx, &args),
        Commands::Mount(args) => mount::execute(&ctx, &args),
        Commands::Unmount(args) => unmount::execute(&ctx, &args),
        Commands::Status(args) => status::execute(&ctx, &args),
        Commands::Export(args) => transfer::export(&ctx, &args),
        Commands::Import(args) => transfer::import(&ctx, &args),
        Commands::Keys(cmd) => keys::execute(&ctx, &cmd),
        Commands::Login(args) => login::execute(&ctx, &args),
        Commands::Daemon(cmd) => daemon::execute(&ctx, &cmd),
        Commands::Completions(args) => completions::execute(&args),
    }
}

/// Set up tracing: stderr for interactive commands, optionally a daily file
/// for the daemon.
fn setup_tracing(verbose: u8, long_running: bool, log_file: bool) -> Result<()> {
    use tracing_subscriber::{Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 if long_running => "info",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| level.into());

    let stderr_layer = fmt::layer().with_writer(io::stderr).with_filter(filter());

    if !log_file {
        tracing_subscriber::registry().with(stderr_layer).init();
        return Ok(());
    }

    let writer = commands::daemon::log_file_writer()?;
    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(filter());
    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Map an error chain to an exit code by downcasting to the library error
/// types.
fn categorize_error(e: &anyhow::Error) -> u8 {
    for cause in e.chain() {
        if let Some(store_err) = cause.downcast_ref::<StoreError>() {
            match store_err {
                StoreError::Authentication => return exit_code::AUTH_FAILED,
                StoreError::Serialization(_) | StoreError::Crypto(_) => {
                    return exit_code::STORE_INVALID;
                }
                StoreError::Catalog(CatalogError::NotFound(_)) => return exit_code::NOT_FOUND,
                StoreError::Catalog(_) => return exit_code::USAGE_ERROR,
                StoreError::LockTimeout { .. } | StoreError::Io { .. } => {}
            }
        }

        if let Some(catalog_err) = cause.downcast_ref::<CatalogError>() {
            return match catalog_err {
                CatalogError::NotFound(_) => exit_code::NOT_FOUND,
                _ => exit_code::USAGE_ERROR,
            };
        }

        if cause.downcast_ref::<ExecError>().is_some() || cause.downcast_ref::<KeyError>().is_some()
        {
            return exit_code::MOUNT_FAILED;
        }

        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            match io_err.kind() {
                io::ErrorKind::PermissionDenied => return exit_code::PERMISSION_DENIED,
                io::ErrorKind::NotFound => return exit_code::NOT_FOUND,
                io::ErrorKind::Interrupted => return exit_code::CANCELLED,
                _ => {}
            }
        }
    }

    let msg = format!("{e:#}").to_lowercase();
    if msg.contains("cancelled") || msg.contains("interrupted") {
        exit_code::CANCELLED
    } else {
        exit_code::GENERAL_ERROR
    }
}
