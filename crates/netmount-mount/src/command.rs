//! Protocol-specific mount and unmount command descriptors.
//!
//! | Protocol | Mount | Unmount |
//! |---|---|---|
//! | smb  | `mount -t cifs //host/share path -o username=U,password=P,uid=,gid=[,vers=V][,port=N]` | `umount path` |
//! | ftp  | `curlftpfs host[:port][/dir] path -o user=U:P,uid=,gid=` | `fusermount -u path` |
//! | sftp | `sshfs user@host:dir path -p port -o IdentityFile=key,uid=,gid=,StrictHostKeyChecking=no` | `fusermount -u path` |
//!
//! SMB commands need root and are flagged `privileged`; the runner routes
//! them through the configured helper (`sudo -S`).

use std::fmt;
use std::path::{Path, PathBuf};

use netmount_core::{Credential, MountSpec, Protocol, RemoteUrl};
use thiserror::Error;

use crate::keys::key_path;

/// Why no mount command can be built for an entry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotActionable {
    /// Stored URL does not parse.
    #[error("URL '{0}' is not valid")]
    InvalidUrl(String),
    /// URL has no host.
    #[error("no host in URL")]
    MissingHost,
    /// SMB URL names no share.
    #[error("no share in SMB URL")]
    MissingShare,
    /// No user name configured.
    #[error("no user name")]
    MissingUser,
    /// No password configured.
    #[error("no password")]
    MissingPassword,
    /// SFTP key pair has not been provisioned.
    #[error("no SSH key at {}", .0.display())]
    MissingKey(PathBuf),
    /// Key provisioning was attempted and failed.
    #[error("SSH key provisioning failed for this entry")]
    KeyInvalid,
}

/// Local identity and key location used when building commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandContext {
    /// Owner uid for the mounted files
    pub uid: u32,
    /// Owner gid for the mounted files
    pub gid: u32,
    /// Directory holding provisioned SFTP keys
    pub key_dir: PathBuf,
}

impl CommandContext {
    /// Context for the invoking user.
    pub fn current(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
            key_dir: key_dir.into(),
        }
    }
}

/// A fully built external command.
#[derive(Clone, PartialEq, Eq)]
pub struct MountCommand {
    /// Executable name or path
    pub program: String,
    /// Arguments, passed as argv (never through a shell)
    pub args: Vec<String>,
    /// Needs the privilege helper
    pub privileged: bool,
    /// Extra environment, scoped to the child
    pub env: Vec<(String, Credential)>,
    /// Data written to the child's stdin after any helper password
    pub stdin: Option<Credential>,
}

impl MountCommand {
    /// Start a command.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            privileged: false,
            env: Vec::new(),
            stdin: None,
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        let rendered = path.to_string_lossy().into_owned();
        self.arg(rendered)
    }

    /// Route through the privilege helper.
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    /// Set a child-scoped environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: Credential) -> Self {
        self.env.push((key.into(), value));
        self
    }

    /// Feed `data` on stdin.
    #[must_use]
    pub fn stdin(mut self, data: Credential) -> Self {
        self.stdin = Some(data);
        self
    }

    /// Command line with credential option values masked.
    pub fn redacted(&self) -> String {
        let mut out = self.program.clone();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&redact_options(arg));
        }
        out
    }
}

impl fmt::Display for MountCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for MountCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountCommand")
            .field("command", &self.redacted())
            .field("privileged", &self.privileged)
            .field("env", &self.env.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

const SECRET_OPTIONS: &[&str] = &["password=", "user=", "username="];

fn redact_options(arg: &str) -> String {
    if !SECRET_OPTIONS.iter().any(|key| arg.contains(key)) {
        return arg.to_string();
    }
    arg.split(',')
        .map(|item| match SECRET_OPTIONS.iter().find(|key| item.starts_with(*key)) {
            Some(key) => format!("{key}***"),
            None => item.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Host as it appears inside `user@host:path` or `host:port` arguments.
fn bracketed(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

/// Build the mount command for `spec`.
pub fn mount_command(spec: &MountSpec, ctx: &CommandContext) -> Result<MountCommand, NotActionable> {
    let url = &spec.url;
    if !url.is_invalid() && url.host().is_empty() {
        return Err(NotActionable::MissingHost);
    }

    match url {
        RemoteUrl::Smb(ep) => {
            if ep.path.trim_matches('/').is_empty() {
                return Err(NotActionable::MissingShare);
            }
            require_user_and_password(spec)?;

            let mut options = format!(
                "username={},password={},uid={},gid={}",
                spec.user,
                spec.password.expose(),
                ctx.uid,
                ctx.gid
            );
            if let Some(version) = &spec.smb_version {
                options.push_str(&format!(",vers={version}"));
            }
            if let Some(port) = ep.port {
                options.push_str(&format!(",port={port}"));
            }

            Ok(MountCommand::new("mount")
                .arg("-t")
                .arg("cifs")
                .arg(url.unc())
                .path_arg(&spec.path)
                .arg("-o")
                .arg(options)
                .privileged())
        }
        RemoteUrl::Ftp(_) => {
            require_user_and_password(spec)?;
            Ok(MountCommand::new("curlftpfs")
                .arg(url.ftp_target())
                .path_arg(&spec.path)
                .arg("-o")
                .arg(format!(
                    "user={}:{},uid={},gid={}",
                    spec.user,
                    spec.password.expose(),
                    ctx.uid,
                    ctx.gid
                )))
        }
        RemoteUrl::Sftp(ep) => {
            if spec.user.is_empty() {
                return Err(NotActionable::MissingUser);
            }
            if spec.sshkeyvalid == Some(false) {
                return Err(NotActionable::KeyInvalid);
            }
            let port = ep.port_or_default(Protocol::Sftp);
            let key = key_path(&ctx.key_dir, &ep.host, port);
            if !key.is_file() {
                return Err(NotActionable::MissingKey(key));
            }

            Ok(MountCommand::new("sshfs")
                .arg(format!("{}@{}:{}", spec.user, bracketed(&ep.host), ep.path))
                .path_arg(&spec.path)
                .arg("-p")
                .arg(port.to_string())
                .arg("-o")
                .arg(format!(
                    "IdentityFile={},uid={},gid={},StrictHostKeyChecking=no",
                    key.display(),
                    ctx.uid,
                    ctx.gid
                )))
        }
        RemoteUrl::Invalid(raw) => Err(NotActionable::InvalidUrl(raw.clone())),
    }
}

fn require_user_and_password(spec: &MountSpec) -> Result<(), NotActionable> {
    if spec.user.is_empty() {
        return Err(NotActionable::MissingUser);
    }
    if spec.password.is_empty() {
        return Err(NotActionable::MissingPassword);
    }
    Ok(())
}

/// Build the unmount command for `spec`. Needs no credentials.
pub fn unmount_command(spec: &MountSpec) -> MountCommand {
    match spec.protocol() {
        Some(Protocol::Smb) | None => MountCommand::new("umount").path_arg(&spec.path).privileged(),
        Some(Protocol::Ftp | Protocol::Sftp) => MountCommand::new("fusermount")
            .arg("-u")
            .path_arg(&spec.path),
    }
}
