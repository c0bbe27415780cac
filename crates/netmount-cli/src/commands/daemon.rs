//! Daemon command - run, start, stop and inspect the reconciliation loop.

use std::fmt::Write as _;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result, bail};
use clap::{Args as ClapArgs, Subcommand};
use netmount_core::StoreError;
use netmount_mount::{
    ConfirmationGate, ConfirmationResponse, DaemonExit, ResponderEnd, process, run_daemon, signal,
    spawn_detached,
};
use tracing::{info, instrument, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

use super::Context;
use crate::auth::prompt_password;
use crate::config;

/// Name the daemon process is found by.
const PROGRAM: &str = env!("CARGO_BIN_NAME");

/// How long a tick waits for a terminal answer before moving on.
const TERMINAL_WAIT: Duration = Duration::from_millis(200);

const STOP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Subcommand, Clone)]
pub enum Command {
    /// Run the loop in the foreground
    Run(RunArgs),

    /// Start the loop in the background
    Start,

    /// Stop running daemons
    Stop,

    /// Show whether a daemon is running
    Status,
}

#[derive(ClapArgs, Clone)]
pub struct RunArgs {
    /// Seconds between ticks (e.g. "5s", "1m")
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,

    /// Approve every batch without asking
    #[arg(long)]
    pub assume_yes: bool,

    /// Decline every batch without asking
    #[arg(long, conflicts_with = "assume_yes")]
    pub assume_no: bool,

    /// Also log to a daily rotated file in the data directory
    #[arg(long)]
    pub log_file: bool,
}

pub fn execute(ctx: &Context, cmd: &Command) -> Result<()> {
    match cmd {
        Command::Run(args) => run(ctx, args),
        Command::Start => start(ctx),
        Command::Stop => stop(ctx),
        Command::Status => {
            status();
            Ok(())
        }
    }
}

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Writer for the daemon log file.
///
/// Files rotate daily under the data directory. The flushing guard lives
/// for the rest of the process.
pub fn log_file_writer() -> Result<NonBlocking> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};

    let log_dir = config::log_dir()?;
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory: {}", log_dir.display()))?;

    let appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "daemon.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Ok(writer)
}

#[instrument(level = "info", name = "cmd::daemon::run", skip_all)]
fn run(ctx: &Context, args: &RunArgs) -> Result<()> {
    let mut options = ctx.config.daemon;
    if let Some(interval) = args.interval {
        options.interval = interval;
    }

    let interactive = io::stdin().is_terminal();
    let gate = if args.assume_yes {
        ConfirmationGate::auto(true)
    } else if args.assume_no {
        ConfirmationGate::auto(false)
    } else if interactive {
        let (gate, end) = ConfirmationGate::new(TERMINAL_WAIT);
        spawn_terminal_responder(end)?;
        gate
    } else {
        // Nobody to ask.
        ConfirmationGate::auto(true)
    };

    signal::install_signal_handler().context("Failed to install signal handler")?;
    let mut reconciler = ctx.reconciler(gate)?;

    let exit = run_daemon(&mut reconciler, &options, || {
        if !interactive {
            return None;
        }
        match prompt_password("Store password changed, admin password: ") {
            Ok(password) => Some(password),
            Err(e) => {
                warn!(error = %e, "Could not read password");
                None
            }
        }
    });

    match exit {
        DaemonExit::Shutdown => Ok(()),
        DaemonExit::AuthFailed => Err(anyhow::Error::new(StoreError::Authentication)
            .context("Daemon stopped: the store no longer accepts the admin password")),
    }
}

/// Serve confirmation requests from the terminal.
fn spawn_terminal_responder(end: ResponderEnd) -> Result<()> {
    thread::Builder::new()
        .name("netmount-confirm".into())
        .spawn(move || {
            for request in end.requests.iter() {
                let mut prompt = format!(
                    "About to {} {} mount(s):\n",
                    request.kind,
                    request.paths.len()
                );
                for path in &request.paths {
                    let _ = writeln!(prompt, "  {}", path.display());
                }
                prompt.push_str("Proceed? [y/N] ");

                let approved = ask(&prompt).unwrap_or(false);
                let response = ConfirmationResponse {
                    id: request.id,
                    approved,
                };
                if end.responses.send(response).is_err() {
                    break;
                }
            }
        })
        .context("Failed to start the confirmation thread")?;
    Ok(())
}

fn ask(prompt: &str) -> io::Result<bool> {
    let mut stderr = io::stderr();
    stderr.write_all(prompt.as_bytes())?;
    stderr.flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}

#[instrument(level = "info", name = "cmd::daemon::start", skip_all)]
fn start(ctx: &Context) -> Result<()> {
    let running = process::find_daemons(PROGRAM);
    if !running.is_empty() {
        bail!("A daemon is already running (PID {running:?})");
    }

    let admin = ctx.admin()?;
    if ctx.store.path().exists() && !ctx.store.verify_password(admin)? {
        return Err(anyhow::Error::new(StoreError::Authentication)
            .context("Refusing to start the daemon"));
    }

    let pid = spawn_background(ctx, admin)?;
    ctx.note(format!("Daemon started (PID {pid})"));
    Ok(())
}

/// Spawn `netmount daemon run` detached, handing over the admin password.
pub fn spawn_background(ctx: &Context, admin: &secrecy::SecretString) -> Result<u32> {
    let exe: PathBuf = std::env::current_exe().context("Failed to locate the netmount binary")?;
    let mut command = std::process::Command::new(exe);
    command
        .arg("--store")
        .arg(ctx.store.path())
        .args(["daemon", "run", "--log-file"]);
    let pid = spawn_detached(&mut command, admin).context("Failed to spawn the daemon")?;
    info!(pid, "Background daemon spawned");
    Ok(pid)
}

fn stop(ctx: &Context) -> Result<()> {
    let running = process::find_daemons(PROGRAM);
    if running.is_empty() {
        ctx.note("No daemon running");
        return Ok(());
    }

    for &pid in &running {
        process::stop(pid).with_context(|| format!("Failed to signal PID {pid}"))?;
    }

    let deadline = Instant::now() + STOP_TIMEOUT;
    while Instant::now() < deadline {
        if running.iter().all(|&pid| !process::is_alive(pid)) {
            ctx.note(format!("Stopped {} daemon(s)", running.len()));
            return Ok(());
        }
        thread::sleep(Duration::from_millis(100));
    }

    let left: Vec<u32> = running
        .into_iter()
        .filter(|&pid| process::is_alive(pid))
        .collect();
    bail!("Daemon did not stop in time (PID {left:?})")
}

fn status() {
    let running = process::find_daemons(PROGRAM);
    if running.is_empty() {
        println!("not running");
    } else {
        for pid in &running {
            println!("running (PID {pid})");
        }
    }
}
