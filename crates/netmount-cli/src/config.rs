//! Configuration file support.
//!
//! Read from `$NETMOUNT_CONFIG_DIR/config.toml`, falling back to
//! `~/.config/netmount/config.toml`. Every field is optional.
//!
//! # Example configuration
//!
//! ```toml
//! [paths]
//! store = "~/.local/share/netmount/mounts.secure"
//! mount_root = "~/mnt"
//! key_dir = "~/.ssh/netmount_keys"
//!
//! [daemon]
//! interval = "5s"
//! max_auth_failures = 1
//!
//! [probe]
//! attempts = 2
//! attempt_timeout = "500ms"
//! budget = "1s"
//!
//! [privilege]
//! helper = "sudo"
//! helper_args = ["-S"]
//!
//! [bookmarks]
//! hook = "/usr/local/bin/netmount-bookmarks"
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use netmount_mount::{DaemonOptions, PrivilegeHelper, ProbeConfig};
use serde::{Deserialize, Serialize};

/// Overrides the configuration directory (used by tests).
pub const CONFIG_DIR_ENV: &str = "NETMOUNT_CONFIG_DIR";

/// Main configuration structure
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// File locations
    pub paths: Paths,
    /// Reconciliation loop settings
    pub daemon: DaemonOptions,
    /// Reachability check timing
    pub probe: ProbeConfig,
    /// Helper used for root-only commands
    pub privilege: PrivilegeHelper,
    /// Desktop bookmark hook
    pub bookmarks: Bookmarks,
}

/// File locations; `~` is expanded.
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Paths {
    /// Encrypted store
    pub store: Option<PathBuf>,
    /// Directory new mount points are created under
    pub mount_root: Option<PathBuf>,
    /// Directory holding SFTP key pairs
    pub key_dir: Option<PathBuf>,
}

/// Bookmark collaborator settings
#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Bookmarks {
    /// Program run as `hook replace|clean` with the mounted places on stdin
    pub hook: Option<PathBuf>,
}

impl Config {
    /// Load the configuration file, or defaults if there is none.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load_from(&path)
    }

    /// Parse a specific configuration file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Store location: `--store`/`NETMOUNT_STORE`, then the file, then the
    /// data directory default.
    pub fn store_path(&self, cli: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = cli {
            return Ok(expand_tilde(path));
        }
        if let Some(path) = &self.paths.store {
            return Ok(expand_tilde(path));
        }
        netmount_core::default_store_path()
            .ok_or_else(|| anyhow::anyhow!("Could not determine the data directory"))
    }

    /// Directory for new mount points, `~/mnt` by default.
    pub fn mount_root(&self) -> Result<PathBuf> {
        match &self.paths.mount_root {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(home_dir()?.join("mnt")),
        }
    }

    /// Directory for SFTP key pairs, `~/.ssh/netmount_keys` by default.
    pub fn key_dir(&self) -> Result<PathBuf> {
        match &self.paths.key_dir {
            Some(path) => Ok(expand_tilde(path)),
            None => Ok(home_dir()?.join(".ssh").join("netmount_keys")),
        }
    }
}

/// Path of the configuration file.
pub fn config_path() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV) {
        return Ok(PathBuf::from(dir).join("config.toml"));
    }
    let base_dirs = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(base_dirs.config_dir().join("netmount").join("config.toml"))
}

/// Directory for daemon log files.
pub fn log_dir() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("org", "netmount", "netmount")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    Ok(dirs.data_dir().join("logs"))
}

fn home_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match home_dir() {
            Ok(home) => home.join(rest),
            Err(_) => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.paths.store.is_none());
        assert_eq!(config.daemon.interval, Duration::from_secs(5));
        assert_eq!(config.daemon.max_auth_failures, 1);
        assert_eq!(config.privilege.helper, "sudo");
        assert!(config.bookmarks.hook.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [paths]
            store = "/srv/netmount/mounts.secure"
            mount_root = "/media/net"

            [daemon]
            interval = "30s"
            max_auth_failures = 3

            [probe]
            attempts = 4
            attempt_timeout = "250ms"

            [privilege]
            helper = "doas"
            helper_args = []

            [bookmarks]
            hook = "/usr/local/bin/netmount-bookmarks"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(
            config.store_path(None).unwrap(),
            PathBuf::from("/srv/netmount/mounts.secure")
        );
        assert_eq!(config.mount_root().unwrap(), PathBuf::from("/media/net"));
        assert_eq!(config.daemon.interval, Duration::from_secs(30));
        assert_eq!(config.daemon.max_auth_failures, 3);
        assert_eq!(config.probe.attempts, 4);
        assert_eq!(config.probe.attempt_timeout, Duration::from_millis(250));
        assert_eq!(config.probe.budget, ProbeConfig::default().budget);
        assert_eq!(config.privilege.helper, "doas");
        assert!(config.privilege.helper_args.is_empty());
        assert!(config.bookmarks.hook.is_some());
    }

    #[test]
    fn test_cli_store_wins() {
        let config: Config = toml::from_str("[paths]\nstore = \"/a\"").unwrap();
        assert_eq!(
            config.store_path(Some(Path::new("/b"))).unwrap(),
            PathBuf::from("/b")
        );
    }

    #[test]
    fn test_bad_duration_is_rejected() {
        assert!(toml::from_str::<Config>("[daemon]\ninterval = \"soon\"").is_err());
    }
}
