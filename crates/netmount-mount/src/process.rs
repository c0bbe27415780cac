//! Finding and stopping a running reconciliation daemon.
//!
//! There is no pid file. A daemon is any process whose argv starts with a
//! program named like ours and later contains `daemon run`.

use std::fs;
use std::path::Path;

use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info};

/// Arguments that mark the foreground daemon loop.
pub const DAEMON_ARGS: [&str; 2] = ["daemon", "run"];

/// Whether `argv` is a daemon invocation of `program`.
pub fn matches_daemon(argv: &[String], program: &str) -> bool {
    let Some(first) = argv.first() else {
        return false;
    };
    let name = Path::new(first)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    name == program
        && argv[1..]
            .windows(DAEMON_ARGS.len())
            .any(|w| *w == DAEMON_ARGS)
}

fn read_cmdline(proc_dir: &Path) -> Option<Vec<String>> {
    let raw = fs::read(proc_dir.join("cmdline")).ok()?;
    if raw.is_empty() {
        return None;
    }
    Some(
        raw.split(|b| *b == 0)
            .filter(|part| !part.is_empty())
            .map(|part| String::from_utf8_lossy(part).into_owned())
            .collect(),
    )
}

/// Pids of running daemons for `program`, excluding this process.
pub fn find_daemons(program: &str) -> Vec<u32> {
    let own = std::process::id();
    let Ok(dir) = fs::read_dir("/proc") else {
        return Vec::new();
    };

    let mut pids: Vec<u32> = dir
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let pid: u32 = entry.file_name().to_str()?.parse().ok()?;
            if pid == own {
                return None;
            }
            let argv = read_cmdline(&entry.path())?;
            matches_daemon(&argv, program).then_some(pid)
        })
        .collect();
    pids.sort_unstable();
    debug!(program, ?pids, "Daemon scan");
    pids
}

/// Whether `pid` still exists.
pub fn is_alive(pid: u32) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    kill(Pid::from_raw(raw), None).is_ok()
}

/// Ask `pid` to stop with SIGTERM.
pub fn stop(pid: u32) -> std::io::Result<()> {
    let raw = i32::try_from(pid).map_err(std::io::Error::other)?;
    kill(Pid::from_raw(raw), Signal::SIGTERM).map_err(std::io::Error::from)?;
    info!(pid, "Sent SIGTERM to daemon");
    Ok(())
}
