//! Protocol-tagged remote locations.
//!
//! Mount entries carry their remote side as a URL string on disk
//! (`smb://nas/share`, `ftp://host:2121/pub`, `sftp://box/home/me`).
//! In memory that string is parsed once into [`RemoteUrl`], so call sites
//! match on the protocol and read structured fields instead of slicing
//! the string again.
//!
//! Stored URLs that no longer parse are kept verbatim as
//! [`RemoteUrl::Invalid`] so one bad entry never makes the store unreadable.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a remote URL.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    /// The URL has no `scheme://` prefix.
    #[error("URL '{0}' is missing a scheme (expected smb://, ftp:// or sftp://)")]
    MissingScheme(String),

    /// The scheme is not one we can mount.
    #[error("Unsupported protocol '{0}' (expected smb, ftp or sftp)")]
    UnsupportedScheme(String),

    /// Nothing between `scheme://` and the first `/`.
    #[error("URL '{0}' has no host")]
    MissingHost(String),

    /// The port after `host:` is not a valid TCP port.
    #[error("URL '{url}' has an invalid port '{port}'")]
    InvalidPort {
        /// The full URL as given
        url: String,
        /// The unparseable port text
        port: String,
    },
}

/// Remote filesystem protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// SMB/CIFS, mounted with `mount -t cifs`
    Smb,
    /// FTP, mounted with `curlftpfs`
    Ftp,
    /// SFTP, mounted with `sshfs`
    Sftp,
}

impl Protocol {
    /// URL scheme for this protocol.
    pub fn scheme(self) -> &'static str {
        match self {
            Protocol::Smb => "smb",
            Protocol::Ftp => "ftp",
            Protocol::Sftp => "sftp",
        }
    }

    /// Well-known TCP port, used when the URL has no explicit port.
    pub fn default_port(self) -> u16 {
        match self {
            Protocol::Smb => 445,
            Protocol::Ftp => 21,
            Protocol::Sftp => 22,
        }
    }

    fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "smb" => Some(Protocol::Smb),
            "ftp" => Some(Protocol::Ftp),
            "sftp" => Some(Protocol::Sftp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Host, optional port and remote path of a remote location.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    /// Host name or IP address (IPv6 without brackets)
    pub host: String,
    /// Explicit port, if the URL carried one
    pub port: Option<u16>,
    /// Remote path including its leading `/`, or empty
    pub path: String,
}

impl Endpoint {
    /// Explicit port if given, otherwise the default for `protocol`.
    pub fn port_or_default(&self, protocol: Protocol) -> u16 {
        self.port.unwrap_or_else(|| protocol.default_port())
    }
}

/// A parsed remote location, tagged by protocol.
///
/// Serializes as the plain URL string. Deserializing never fails: text that
/// does not parse becomes [`RemoteUrl::Invalid`] and is written back as is.
/// Parsing with [`str::parse`] stays strict.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RemoteUrl {
    /// `smb://host[:port]/share[/sub]`
    Smb(Endpoint),
    /// `ftp://host[:port][/path]`
    Ftp(Endpoint),
    /// `sftp://host[:port][/path]`
    Sftp(Endpoint),
    /// Stored text that is not a usable URL
    Invalid(String),
}

impl RemoteUrl {
    /// Protocol of this URL, `None` when it is invalid.
    pub fn protocol(&self) -> Option<Protocol> {
        match self {
            RemoteUrl::Smb(_) => Some(Protocol::Smb),
            RemoteUrl::Ftp(_) => Some(Protocol::Ftp),
            RemoteUrl::Sftp(_) => Some(Protocol::Sftp),
            RemoteUrl::Invalid(_) => None,
        }
    }

    /// Scheme for logs and listings; `invalid` for unparseable text.
    pub fn scheme(&self) -> &'static str {
        self.protocol().map_or("invalid", Protocol::scheme)
    }

    /// Whether the stored text failed to parse.
    pub fn is_invalid(&self) -> bool {
        matches!(self, RemoteUrl::Invalid(_))
    }

    /// Host, port and path.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        match self {
            RemoteUrl::Smb(ep) | RemoteUrl::Ftp(ep) | RemoteUrl::Sftp(ep) => Some(ep),
            RemoteUrl::Invalid(_) => None,
        }
    }

    /// Host name or address, empty when invalid.
    pub fn host(&self) -> &str {
        self.endpoint().map_or("", |ep| ep.host.as_str())
    }

    /// Explicit port if given, otherwise the protocol default.
    pub fn effective_port(&self) -> Option<u16> {
        let protocol = self.protocol()?;
        self.endpoint().map(|ep| ep.port_or_default(protocol))
    }

    /// Remote path (with leading `/`), possibly empty.
    pub fn remote_path(&self) -> &str {
        self.endpoint().map_or("", |ep| ep.path.as_str())
    }

    /// UNC-style source for `mount -t cifs`: `//host/share`.
    pub fn unc(&self) -> String {
        format!("//{}{}", self.host(), self.remote_path())
    }

    /// Source argument for `curlftpfs`: `host[:port][/path]` with spaces escaped.
    pub fn ftp_target(&self) -> String {
        let Some(ep) = self.endpoint() else {
            return String::new();
        };
        let mut target = display_host(&ep.host);
        if let Some(port) = ep.port {
            target.push_str(&format!(":{port}"));
        }
        target.push_str(&ep.path.replace(' ', "%20"));
        target
    }
}

fn display_host(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_string()
    }
}

impl FromStr for RemoteUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| UrlError::MissingScheme(raw.to_string()))?;
        let protocol = Protocol::from_scheme(scheme)
            .ok_or_else(|| UrlError::UnsupportedScheme(scheme.to_string()))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], rest[idx..].to_string()),
            None => (rest, String::new()),
        };

        let (host, port_text) = split_authority(authority);
        if host.is_empty() {
            return Err(UrlError::MissingHost(raw.to_string()));
        }

        let port = match port_text {
            Some(text) => Some(text.parse::<u16>().map_err(|_| UrlError::InvalidPort {
                url: raw.to_string(),
                port: text.to_string(),
            })?),
            None => None,
        };

        let endpoint = Endpoint {
            host: host.to_string(),
            port,
            path,
        };

        Ok(match protocol {
            Protocol::Smb => RemoteUrl::Smb(endpoint),
            Protocol::Ftp => RemoteUrl::Ftp(endpoint),
            Protocol::Sftp => RemoteUrl::Sftp(endpoint),
        })
    }
}

/// Split `host[:port]` or `[v6addr][:port]`.
fn split_authority(authority: &str) -> (&str, Option<&str>) {
    if let Some(bracketed) = authority.strip_prefix('[') {
        if let Some((host, after)) = bracketed.split_once(']') {
            return (host, after.strip_prefix(':'));
        }
        return (bracketed, None);
    }
    match authority.split_once(':') {
        Some((host, port)) => (host, Some(port)),
        None => (authority, None),
    }
}

impl fmt::Display for RemoteUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ep = match self {
            RemoteUrl::Smb(ep) | RemoteUrl::Ftp(ep) | RemoteUrl::Sftp(ep) => ep,
            RemoteUrl::Invalid(raw) => return f.write_str(raw),
        };
        write!(f, "{}://{}", self.scheme(), display_host(&ep.host))?;
        if let Some(port) = ep.port {
            write!(f, ":{port}")?;
        }
        f.write_str(&ep.path)
    }
}

impl From<String> for RemoteUrl {
    fn from(value: String) -> Self {
        value.parse().unwrap_or(RemoteUrl::Invalid(value))
    }
}

impl From<RemoteUrl> for String {
    fn from(url: RemoteUrl) -> Self {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_smb_share() {
        let url: RemoteUrl = "smb://host/share1".parse().unwrap();
        assert_eq!(url.protocol(), Some(Protocol::Smb));
        assert_eq!(url.host(), "host");
        assert_eq!(url.effective_port(), Some(445));
        assert_eq!(url.remote_path(), "/share1");
        assert_eq!(url.unc(), "//host/share1");
    }

    #[test]
    fn test_explicit_port_overrides_default() {
        let url: RemoteUrl = "sftp://box:2222/home/me".parse().unwrap();
        assert_eq!(url.effective_port(), Some(2222));
        assert_eq!(url.endpoint().unwrap().port, Some(2222));
        assert_eq!(url.remote_path(), "/home/me");
    }

    #[test]
    fn test_ftp_without_path() {
        let url: RemoteUrl = "ftp://files.example.org".parse().unwrap();
        assert_eq!(url.effective_port(), Some(21));
        assert_eq!(url.remote_path(), "");
        assert_eq!(url.ftp_target(), "files.example.org");
    }

    #[test]
    fn test_ftp_target_escapes_spaces() {
        let url: RemoteUrl = "ftp://nas:2121/my files".parse().unwrap();
        assert_eq!(url.ftp_target(), "nas:2121/my%20files");
    }

    #[test]
    fn test_ipv6_host() {
        let url: RemoteUrl = "sftp://[fe80::1]:22/srv".parse().unwrap();
        assert_eq!(url.host(), "fe80::1");
        assert_eq!(url.to_string(), "sftp://[fe80::1]:22/srv");
    }

    #[test]
    fn test_display_roundtrip() {
        for raw in ["smb://host/share1", "ftp://h:2121/pub", "sftp://box/home/me"] {
            let url: RemoteUrl = raw.parse().unwrap();
            assert_eq!(url.to_string(), raw);
        }
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let url: RemoteUrl = "SMB://host/share".parse().unwrap();
        assert_eq!(url.protocol(), Some(Protocol::Smb));
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(matches!("host/share".parse::<RemoteUrl>(), Err(UrlError::MissingScheme(_))));
        assert!(matches!("nfs://host/x".parse::<RemoteUrl>(), Err(UrlError::UnsupportedScheme(_))));
        assert!(matches!("smb:///share".parse::<RemoteUrl>(), Err(UrlError::MissingHost(_))));
        assert!(matches!(
            "ftp://host:99999/x".parse::<RemoteUrl>(),
            Err(UrlError::InvalidPort { .. })
        ));
    }

    #[test]
    fn test_stored_text_that_does_not_parse_is_kept() {
        let url: RemoteUrl = serde_json::from_str(r#""smb://:445/b""#).unwrap();
        assert!(url.is_invalid());
        assert_eq!(url.protocol(), None);
        assert_eq!(url.scheme(), "invalid");
        assert_eq!(url.host(), "");
        assert_eq!(url.effective_port(), None);
        assert_eq!(serde_json::to_string(&url).unwrap(), r#""smb://:445/b""#);
    }

    #[test]
    fn test_stored_valid_url_deserializes_parsed() {
        let url: RemoteUrl = serde_json::from_str(r#""ftp://h:2121/pub""#).unwrap();
        assert_eq!(url.protocol(), Some(Protocol::Ftp));
        assert_eq!(url.effective_port(), Some(2121));
    }
}
