//! Running mount commands and classifying their failures.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use netmount_core::{KnownStatus, MountSpec};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::command::{CommandContext, MountCommand, NotActionable, mount_command, unmount_command};

/// Per-entry failure of a mount or unmount.
#[derive(Error, Debug)]
pub enum ExecError {
    /// Remote side rejected the credentials.
    #[error("authentication rejected: {stderr}")]
    Auth {
        /// Captured standard error
        stderr: String,
    },

    /// Host, share or path could not be reached.
    #[error("connection failed: {stderr}")]
    Connection {
        /// Captured standard error
        stderr: String,
    },

    /// Any other non-zero exit.
    #[error("command failed (exit code {code:?}): {stderr}")]
    Generic {
        /// Exit code, `None` if killed by a signal
        code: Option<i32>,
        /// Captured standard error
        stderr: String,
    },

    /// The entry lacks fields needed to build a command.
    #[error("not actionable: {0}")]
    NotActionable(#[from] NotActionable),

    /// The mount point directory could not be created.
    #[error("cannot create mount point {}: {source}", .path.display())]
    MountPoint {
        /// Mount point
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// The program could not be started at all.
    #[error("failed to run {program}: {source}")]
    Spawn {
        /// Program name
        program: String,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

impl ExecError {
    /// Short category label for logs.
    pub fn category(&self) -> &'static str {
        match self {
            ExecError::Auth { .. } => "auth",
            ExecError::Connection { .. } => "connection",
            ExecError::Generic { .. } => "generic",
            ExecError::NotActionable(_) => "not-actionable",
            ExecError::MountPoint { .. } => "mount-point",
            ExecError::Spawn { .. } => "spawn",
        }
    }
}

/// Map a failed command's exit code and stderr to an [`ExecError`].
///
/// First match wins: credential rejections, then connectivity, then generic.
pub fn classify_failure(code: Option<i32>, stderr: &str) -> ExecError {
    let stderr = stderr.trim().to_string();
    if ["530", "Access denied", "Permission denied"]
        .iter()
        .any(|needle| stderr.contains(needle))
    {
        ExecError::Auth { stderr }
    } else if ["No such file or directory", "Connection refused"]
        .iter()
        .any(|needle| stderr.contains(needle))
    {
        ExecError::Connection { stderr }
    } else {
        ExecError::Generic { code, stderr }
    }
}

/// Result of one external command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if killed by a signal
    pub code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Successful output with no text.
    pub fn ok() -> Self {
        Self {
            code: Some(0),
            ..Self::default()
        }
    }

    /// Failed output with the given stderr.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Exit code zero.
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can run a [`MountCommand`] to completion.
pub trait CommandRunner: Send {
    /// Run `cmd`, blocking until it exits.
    ///
    /// `admin` is written to a privilege helper's stdin when `cmd.privileged`.
    fn run(&self, cmd: &MountCommand, admin: Option<&SecretString>) -> io::Result<CommandOutput>;
}

/// Program that elevates privileged commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrivilegeHelper {
    /// Helper executable
    pub helper: String,
    /// Arguments placed before the wrapped command
    pub helper_args: Vec<String>,
}

impl Default for PrivilegeHelper {
    fn default() -> Self {
        Self {
            helper: "sudo".to_string(),
            helper_args: vec!["-S".to_string()],
        }
    }
}

/// Runs commands as real child processes.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    privilege: PrivilegeHelper,
}

impl SystemRunner {
    /// Create a runner using `privilege` for privileged commands.
    pub fn new(privilege: PrivilegeHelper) -> Self {
        Self { privilege }
    }

    fn build(&self, cmd: &MountCommand, elevate: bool) -> Command {
        let mut command = if elevate {
            let mut c = Command::new(&self.privilege.helper);
            c.args(&self.privilege.helper_args).arg(&cmd.program);
            c
        } else {
            Command::new(&cmd.program)
        };
        command.args(&cmd.args);
        for (key, value) in &cmd.env {
            command.env(key, value.expose());
        }
        command
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &MountCommand, admin: Option<&SecretString>) -> io::Result<CommandOutput> {
        let elevate = cmd.privileged && !nix::unistd::geteuid().is_root();

        let mut input = Vec::new();
        if elevate && let Some(password) = admin {
            input.extend_from_slice(password.expose_secret().as_bytes());
            input.push(b'\n');
        }
        if let Some(data) = &cmd.stdin {
            input.extend_from_slice(data.expose().as_bytes());
        }

        let mut command = self.build(cmd, elevate);
        command
            .stdin(if input.is_empty() { Stdio::null() } else { Stdio::piped() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(command = %cmd, elevate, "Running");
        let mut child = command.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits early closes the pipe; its exit status says why.
            if let Err(e) = stdin.write_all(&input) {
                debug!(error = %e, "Child closed stdin early");
            }
        }
        input.fill(0);

        let output = child.wait_with_output()?;
        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Builds, runs and interprets mount/unmount commands for entries.
pub struct Executor {
    runner: Box<dyn CommandRunner>,
    context: CommandContext,
}

impl Executor {
    /// Create an executor.
    pub fn new(runner: Box<dyn CommandRunner>, context: CommandContext) -> Self {
        Self { runner, context }
    }

    /// Identity and key location used for commands.
    pub fn context(&self) -> &CommandContext {
        &self.context
    }

    /// The underlying runner.
    pub fn runner(&self) -> &dyn CommandRunner {
        self.runner.as_ref()
    }

    /// Whether a mount command can be built for `spec`.
    pub fn check_mountable(&self, spec: &MountSpec) -> Result<(), NotActionable> {
        mount_command(spec, &self.context).map(|_| ())
    }

    /// Mount `spec`, creating its mount point first.
    ///
    /// On success `last_known_status` becomes `mounted`.
    pub fn mount(&self, spec: &mut MountSpec, admin: &SecretString) -> Result<(), ExecError> {
        let cmd = mount_command(spec, &self.context)?;

        std::fs::create_dir_all(&spec.path).map_err(|source| ExecError::MountPoint {
            path: spec.path.clone(),
            source,
        })?;

        self.execute(&cmd, spec, admin, "mount")?;
        spec.last_known_status = KnownStatus::Mounted;
        Ok(())
    }

    /// Unmount `spec` and remove its (now empty) mount point.
    ///
    /// On success `last_known_status` becomes `unmounted`. Failure to remove
    /// the directory is only logged.
    pub fn unmount(&self, spec: &mut MountSpec, admin: &SecretString) -> Result<(), ExecError> {
        let cmd = unmount_command(spec);
        self.execute(&cmd, spec, admin, "unmount")?;
        spec.last_known_status = KnownStatus::Unmounted;

        if let Err(e) = std::fs::remove_dir(&spec.path) {
            warn!(path = %spec.path.display(), error = %e, "Could not remove mount point");
        }
        Ok(())
    }

    fn execute(
        &self,
        cmd: &MountCommand,
        spec: &MountSpec,
        admin: &SecretString,
        action: &'static str,
    ) -> Result<(), ExecError> {
        let protocol = spec.url.scheme();
        let output = self
            .runner
            .run(cmd, Some(admin))
            .map_err(|source| ExecError::Spawn {
                program: cmd.program.clone(),
                source,
            });

        let result = match output {
            Ok(out) if out.success() => Ok(()),
            Ok(out) => Err(classify_failure(out.code, &out.stderr)),
            Err(e) => Err(e),
        };

        match &result {
            Ok(()) => info!(
                path = %spec.path.display(),
                protocol,
                action,
                outcome = "ok",
                "{action} succeeded"
            ),
            Err(e) => error!(
                path = %spec.path.display(),
                protocol,
                host = spec.url.host(),
                action,
                kind = e.category(),
                error = %e,
                "{action} failed"
            ),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_order() {
        assert!(matches!(
            classify_failure(Some(32), "mount error(13): Permission denied"),
            ExecError::Auth { .. }
        ));
        assert!(matches!(
            classify_failure(Some(1), "Error connecting to ftp: Access denied: 530"),
            ExecError::Auth { .. }
        ));
        // Auth wins over connection when both match.
        assert!(matches!(
            classify_failure(Some(1), "530 Login incorrect; Connection refused"),
            ExecError::Auth { .. }
        ));
        assert!(matches!(
            classify_failure(Some(32), "mount error(2): No such file or directory"),
            ExecError::Connection { .. }
        ));
        match classify_failure(Some(5), "something odd\n") {
            ExecError::Generic { code, stderr } => {
                assert_eq!(code, Some(5));
                assert_eq!(stderr, "something odd");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_system_runner_captures_stderr() {
        let runner = SystemRunner::default();
        let cmd = MountCommand::new("sh").arg("-c").arg("echo oops >&2; exit 3");
        let out = runner.run(&cmd, None).unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stderr.trim(), "oops");
    }

    #[test]
    fn test_system_runner_feeds_stdin_and_env() {
        let runner = SystemRunner::default();
        let cmd = MountCommand::new("sh")
            .arg("-c")
            .arg("read line; echo \"$line-$NM_TEST\"")
            .env("NM_TEST", "scoped".into())
            .stdin("hello\n".into());
        let out = runner.run(&cmd, None).unwrap();
        assert!(out.success());
        assert_eq!(out.stdout.trim(), "hello-scoped");
        assert!(std::env::var("NM_TEST").is_err());
    }

    #[test]
    fn test_privileged_goes_through_helper() {
        if nix::unistd::geteuid().is_root() {
            return;
        }
        // `env` stands in for sudo: it runs the wrapped command; stdin carries the password.
        let runner = SystemRunner::new(PrivilegeHelper {
            helper: "env".into(),
            helper_args: vec![],
        });
        let cmd = MountCommand::new("sh")
            .arg("-c")
            .arg("read pw; echo \"got:$pw\"")
            .privileged();
        let admin = SecretString::from("s3cret".to_string());
        let out = runner.run(&cmd, Some(&admin)).unwrap();
        assert_eq!(out.stdout.trim(), "got:s3cret");
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let runner = SystemRunner::default();
        let cmd = MountCommand::new("/nonexistent/netmount-test-binary");
        assert!(runner.run(&cmd, None).is_err());
    }
}
