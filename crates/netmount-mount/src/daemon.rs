//! Running the reconciler as a long-lived daemon.
//!
//! [`run_daemon`] is the foreground loop. [`spawn_detached`] starts that
//! loop as a separate session leader, handing it the admin password through
//! a child-scoped environment variable.

use std::process::{Command, Stdio};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::reconcile::Reconciler;
use crate::signal::wait_for_shutdown_timeout;

/// Environment variable carrying the admin password to a spawned daemon.
pub const ADMIN_PASSWORD_ENV: &str = "NETMOUNT_ADMIN_PASSWORD";

/// Loop timing and failure tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonOptions {
    /// Pause between the end of one tick and the start of the next
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Consecutive authentication failures tolerated without a new password
    pub max_auth_failures: u32,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_auth_failures: 1,
        }
    }
}

/// Why [`run_daemon`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    /// A termination signal (or an explicit request) arrived
    Shutdown,
    /// The store kept refusing the admin password
    AuthFailed,
}

/// Tick until shutdown.
///
/// When the store rejects the admin password, `reauthenticate` is asked for
/// a new one. It returns `None` when nobody can answer (no terminal), in
/// which case the loop gives up after `max_auth_failures` failures in a row.
pub fn run_daemon<F>(
    reconciler: &mut Reconciler,
    options: &DaemonOptions,
    mut reauthenticate: F,
) -> DaemonExit
where
    F: FnMut() -> Option<SecretString>,
{
    info!(interval = ?options.interval, store = %reconciler.store().path().display(), "Daemon started");
    let mut auth_failures = 0u32;

    loop {
        match reconciler.tick() {
            Ok(report) => {
                auth_failures = 0;
                debug!(
                    batch = ?report.batch,
                    network = ?report.network,
                    succeeded = report.succeeded(),
                    aborted = report.aborted,
                    "Tick finished"
                );
            }
            Err(e) if e.is_authentication() => {
                auth_failures += 1;
                error!(failures = auth_failures, "Store rejected the admin password");
                match reauthenticate() {
                    Some(password) => reconciler.set_credential(password),
                    None if auth_failures >= options.max_auth_failures => {
                        error!("No way to re-authenticate, stopping");
                        return DaemonExit::AuthFailed;
                    }
                    None => {}
                }
            }
            Err(e) => warn!(error = %e, "Tick failed, retrying after the interval"),
        }

        if wait_for_shutdown_timeout(options.interval) {
            info!("Daemon stopping");
            return DaemonExit::Shutdown;
        }
    }
}

/// Start `command` in a new session with null stdio and return its pid.
///
/// `admin` is placed in [`ADMIN_PASSWORD_ENV`] for the child only.
pub fn spawn_detached(command: &mut Command, admin: &SecretString) -> std::io::Result<u32> {
    use std::os::unix::process::CommandExt;

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .env(ADMIN_PASSWORD_ENV, admin.expose_secret());

    // setsid makes the child leader of a fresh session and process group,
    // detaching it from our terminal.
    unsafe {
        command.pre_exec(|| {
            nix::unistd::setsid()
                .map(|_| ())
                .map_err(std::io::Error::from)
        });
    }

    let child = command.spawn()?;
    info!(pid = child.id(), "Daemon spawned");
    Ok(child.id())
}

/// Take the admin password handed over by [`spawn_detached`], removing it
/// from this process's environment.
pub fn take_handoff_password() -> Option<SecretString> {
    let value = std::env::var(ADMIN_PASSWORD_ENV).ok()?;
    // Single-threaded at this point of startup.
    unsafe { std::env::remove_var(ADMIN_PASSWORD_ENV) };
    Some(SecretString::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_toml_like_json() {
        let options: DaemonOptions =
            serde_json::from_str(r#"{"interval": "2s"}"#).unwrap();
        assert_eq!(options.interval, Duration::from_secs(2));
        assert_eq!(options.max_auth_failures, 1);
    }

    #[test]
    fn test_spawn_detached_passes_password() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("env");
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(format!("printf %s \"${ADMIN_PASSWORD_ENV}\" > {}", out.display()));
        let pid = spawn_detached(&mut cmd, &SecretString::from("s3cret")).unwrap();
        assert!(pid > 0);

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if std::fs::read_to_string(&out).is_ok_and(|s| s == "s3cret") {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        panic!("detached child did not receive the password");
    }
}
