//! Mount specification model.
//!
//! The JSON shape of [`MountSpec`] is the on-disk schema inside the encrypted
//! store. Field names are fixed; new fields must be optional with defaults so
//! older stores keep loading.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use zeroize::Zeroize;

use crate::url::{Protocol, RemoteUrl};

/// Last externally confirmed mount state of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnownStatus {
    /// Never observed (new or legacy entry)
    #[default]
    Unknown,
    /// Last action left it mounted
    Mounted,
    /// Last action left it unmounted
    Unmounted,
}

impl fmt::Display for KnownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KnownStatus::Unknown => "unknown",
            KnownStatus::Mounted => "mounted",
            KnownStatus::Unmounted => "unmounted",
        })
    }
}

/// A secret string that is wiped on drop and never printed.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a secret.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Borrow the secret for handing to a child process.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// True if no secret was set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Credential {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Credential(<empty>)")
        } else {
            f.write_str("Credential(<redacted>)")
        }
    }
}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// One declared remote mount.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MountSpec {
    /// Absolute local mount point, unique across the store
    pub path: PathBuf,

    /// Remote location, unique across the store
    pub url: RemoteUrl,

    /// Remote user name
    #[serde(default)]
    pub user: String,

    /// Remote password (unused for SFTP, which authenticates with a key pair)
    #[serde(default)]
    pub password: Credential,

    /// SMB protocol version hint (`vers=` option)
    #[serde(
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub smb_version: Option<String>,

    /// Whether unattended reconciliation may mount this entry
    #[serde(default)]
    pub automount: bool,

    /// Last externally confirmed state
    #[serde(default)]
    pub last_known_status: KnownStatus,

    /// Position in processing and display order
    #[serde(default = "unordered")]
    pub order: u32,

    /// Outcome of SFTP key provisioning, if it was attempted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sshkeyvalid: Option<bool>,
}

/// Sentinel for entries written before ordering existed; they sort last.
pub(crate) const UNORDERED: u32 = u32::MAX;

fn unordered() -> u32 {
    UNORDERED
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }))
}

impl MountSpec {
    /// Create an entry with default policy (no automount, unknown status).
    pub fn new(path: impl Into<PathBuf>, url: RemoteUrl) -> Self {
        Self {
            path: path.into(),
            url,
            user: String::new(),
            password: Credential::default(),
            smb_version: None,
            automount: false,
            last_known_status: KnownStatus::Unknown,
            order: 0,
            sshkeyvalid: None,
        }
    }

    /// Protocol of the remote side, `None` for an invalid URL.
    pub fn protocol(&self) -> Option<Protocol> {
        self.url.protocol()
    }

    /// Display title: the last component of the mount point.
    pub fn title(&self) -> String {
        title_for(&self.path)
    }
}

/// Title used for a mount point in listings and bookmarks.
pub fn title_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MountSpec {
        let mut spec = MountSpec::new("/home/u/mnt/share1", "smb://host/share1".parse().unwrap());
        spec.user = "u".into();
        spec.password = Credential::new("p");
        spec
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["url"], "smb://host/share1");
        assert_eq!(json["path"], "/home/u/mnt/share1");
        assert_eq!(json["password"], "p");
        assert_eq!(json["last_known_status"], "unknown");
        assert!(json.get("smb_version").is_none());
        assert!(json.get("sshkeyvalid").is_none());
    }

    #[test]
    fn test_legacy_entry_defaults() {
        let json = r#"{"url":"ftp://h/pub","path":"/mnt/pub","smb_version":""}"#;
        let spec: MountSpec = serde_json::from_str(json).unwrap();
        assert_eq!(spec.smb_version, None);
        assert!(!spec.automount);
        assert_eq!(spec.last_known_status, KnownStatus::Unknown);
        assert_eq!(spec.order, UNORDERED);
        assert!(spec.password.is_empty());
    }

    #[test]
    fn test_invalid_url_rejected() {
        let json = r#"{"url":"nfs://h/x","path":"/mnt/x"}"#;
        assert!(serde_json::from_str::<MountSpec>(json).is_err());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("password: Credential(\"p\")"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_title() {
        assert_eq!(sample().title(), "share1");
    }
}
