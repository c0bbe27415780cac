//! SFTP key provisioning.
//!
//! SFTP entries authenticate with a per-`(host, port)` RSA key pair kept in
//! the key directory as `id_rsa_{host}_{port}`. Provisioning generates the
//! pair, installs the public half on the server using the entry's password
//! once, and checks that key-only login works.

use std::io;
use std::path::{Path, PathBuf};

use netmount_core::{Credential, MountSpec, Protocol, RemoteUrl};
use thiserror::Error;
use tracing::info;

use crate::command::MountCommand;
use crate::executor::{CommandOutput, CommandRunner};

/// Errors from [`provision_key`].
#[derive(Error, Debug)]
pub enum KeyError {
    /// Only SFTP entries use key pairs.
    #[error("{0} is not an SFTP entry")]
    NotSftp(String),

    /// Installing the key needs the account password once.
    #[error("a password is required to install the key")]
    MissingPassword,

    /// `ssh-keygen` failed.
    #[error("key generation failed: {0}")]
    Generate(String),

    /// Copying the public key to the server failed.
    #[error("installing the public key failed: {0}")]
    Install(String),

    /// Key-only login was refused after installation.
    #[error("key login check failed: {0}")]
    Verify(String),

    /// Local file problem.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File or directory
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },
}

/// Location of the private key for `host:port`.
pub fn key_path(key_dir: &Path, host: &str, port: u16) -> PathBuf {
    let safe_host: String = host
        .chars()
        .map(|c| if c == ':' || c == '/' { '_' } else { c })
        .collect();
    key_dir.join(format!("id_rsa_{safe_host}_{port}"))
}

/// Location of the public half of `key`.
pub fn public_key_path(key: &Path) -> PathBuf {
    let mut name = key.as_os_str().to_os_string();
    name.push(".pub");
    PathBuf::from(name)
}

fn check(
    runner: &dyn CommandRunner,
    cmd: &MountCommand,
    wrap: fn(String) -> KeyError,
) -> Result<CommandOutput, KeyError> {
    let output = runner
        .run(cmd, None)
        .map_err(|e| wrap(format!("{}: {e}", cmd.program)))?;
    if output.success() {
        Ok(output)
    } else {
        Err(wrap(output.stderr.trim().to_string()))
    }
}

/// Generate (if needed), install and verify the key pair for an SFTP entry.
///
/// Returns the private key path. The caller records the outcome in the
/// entry's `sshkeyvalid` field.
pub fn provision_key(
    runner: &dyn CommandRunner,
    spec: &MountSpec,
    key_dir: &Path,
) -> Result<PathBuf, KeyError> {
    let RemoteUrl::Sftp(ep) = &spec.url else {
        return Err(KeyError::NotSftp(spec.url.to_string()));
    };
    if spec.password.is_empty() {
        return Err(KeyError::MissingPassword);
    }
    let port_number = ep.port_or_default(Protocol::Sftp);
    let port = port_number.to_string();
    let key = key_path(key_dir, &ep.host, port_number);
    let login = format!("{}@{}", spec.user, ep.host);

    create_private_dir(key_dir)?;

    if !key.is_file() {
        let keygen = MountCommand::new("ssh-keygen")
            .args(["-q", "-t", "rsa", "-b", "4096", "-N", "", "-C"])
            .arg(format!("netmount@{}", ep.host))
            .arg("-f")
            .path_arg(&key);
        check(runner, &keygen, KeyError::Generate)?;
        info!(key = %key.display(), "Generated SSH key pair");
    }

    let public_path = public_key_path(&key);
    let public = std::fs::read_to_string(&public_path).map_err(|source| KeyError::Io {
        path: public_path.clone(),
        source,
    })?;

    let install = MountCommand::new("sshpass")
        .args(["-e", "ssh", "-p"])
        .arg(port.clone())
        .args(["-o", "StrictHostKeyChecking=no", "-o", "PubkeyAuthentication=no"])
        .arg(login.clone())
        .arg("umask 077; mkdir -p ~/.ssh && cat >> ~/.ssh/authorized_keys")
        .env("SSHPASS", spec.password.clone())
        .stdin(Credential::new(public));
    check(runner, &install, KeyError::Install)?;

    let verify = MountCommand::new("ssh")
        .arg("-i")
        .path_arg(&key)
        .arg("-p")
        .arg(port)
        .args([
            "-o",
            "BatchMode=yes",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "ConnectTimeout=10",
        ])
        .arg(login)
        .arg("true");
    check(runner, &verify, KeyError::Verify)?;

    info!(host = %ep.host, port = port_number, "SSH key installed and verified");
    Ok(key)
}

fn create_private_dir(dir: &Path) -> Result<(), KeyError> {
    use std::os::unix::fs::{DirBuilderExt, PermissionsExt};

    let io_err = |source| KeyError::Io {
        path: dir.to_path_buf(),
        source,
    };
    std::fs::DirBuilder::new()
        .recursive(true)
        .mode(0o700)
        .create(dir)
        .map_err(io_err)?;
    std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700)).map_err(io_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingRunner;
    use tempfile::TempDir;

    fn sftp_entry() -> MountSpec {
        let mut spec = MountSpec::new("/m/box", "sftp://box:2222/home/u".parse().unwrap());
        spec.user = "u".into();
        spec.password = Credential::new("pw");
        spec
    }

    #[test]
    fn test_key_path() {
        assert_eq!(
            key_path(Path::new("/k"), "box", 22),
            Path::new("/k/id_rsa_box_22")
        );
        assert_eq!(
            key_path(Path::new("/k"), "fe80::1", 22),
            Path::new("/k/id_rsa_fe80__1_22")
        );
    }

    #[test]
    fn test_public_key_path_keeps_dotted_host() {
        let key = key_path(Path::new("/k"), "box.example.org", 22);
        assert_eq!(public_key_path(&key), Path::new("/k/id_rsa_box.example.org_22.pub"));
    }

    #[test]
    fn test_provision_runs_install_and_verify() {
        let keys = TempDir::new().unwrap();
        let key = key_path(keys.path(), "box", 2222);
        std::fs::write(&key, "private").unwrap();
        std::fs::write(public_key_path(&key), "ssh-rsa AAA netmount@box\n").unwrap();

        let runner = RecordingRunner::new();
        let path = provision_key(&runner, &sftp_entry(), keys.path()).unwrap();
        assert_eq!(path, key);

        let calls = runner.calls();
        assert_eq!(calls.len(), 2, "existing key is not regenerated");
        assert_eq!(calls[0].program, "sshpass");
        assert_eq!(calls[0].env[0].0, "SSHPASS");
        assert_eq!(calls[0].env[0].1.expose(), "pw");
        assert!(calls[0].stdin.as_ref().unwrap().expose().starts_with("ssh-rsa"));
        assert_eq!(calls[1].program, "ssh");
        assert!(calls[1].args.contains(&"BatchMode=yes".to_string()));
    }

    #[test]
    fn test_install_failure_is_reported() {
        let keys = TempDir::new().unwrap();
        let key = key_path(keys.path(), "box", 2222);
        std::fs::write(&key, "private").unwrap();
        std::fs::write(public_key_path(&key), "ssh-rsa AAA").unwrap();

        let runner = RecordingRunner::new();
        runner.respond_to("sshpass", CommandOutput::failed(5, "Permission denied, please try again."));
        let err = provision_key(&runner, &sftp_entry(), keys.path()).unwrap_err();
        assert!(matches!(err, KeyError::Install(msg) if msg.contains("Permission denied")));
    }

    #[test]
    fn test_rejects_non_sftp_and_missing_password() {
        let keys = TempDir::new().unwrap();
        let runner = RecordingRunner::new();
        let smb = MountSpec::new("/m/s", "smb://h/s".parse().unwrap());
        assert!(matches!(
            provision_key(&runner, &smb, keys.path()),
            Err(KeyError::NotSftp(_))
        ));

        let mut entry = sftp_entry();
        entry.password = Credential::default();
        assert!(matches!(
            provision_key(&runner, &entry, keys.path()),
            Err(KeyError::MissingPassword)
        ));
        assert!(runner.calls().is_empty());
    }
}
