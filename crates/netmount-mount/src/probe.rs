//! Read-only observation of mount state, host reachability and local network.
//!
//! None of these checks ever fail: an unreadable mount table means "not
//! mounted", and every socket or DNS problem means "unreachable".

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use netmount_core::RemoteUrl;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::mount_table::MountTable;

/// Observations the reconciler needs about the outside world.
pub trait Probe: Send {
    /// Whether `path` is currently a mount point.
    fn is_mounted(&self, path: &Path) -> bool;

    /// Whether the host of `url` accepts TCP connections on its effective port.
    fn is_host_reachable(&self, url: &RemoteUrl) -> bool;

    /// Whether any non-loopback interface is up with an address.
    fn is_network_up(&self) -> bool;
}

/// Timing of reachability checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Connection attempts per check
    pub attempts: u32,

    /// Timeout of a single connection attempt
    #[serde(with = "humantime_serde")]
    pub attempt_timeout: Duration,

    /// Upper bound on one whole check, DNS included
    #[serde(with = "humantime_serde")]
    pub budget: Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            attempts: 2,
            attempt_timeout: Duration::from_millis(500),
            budget: Duration::from_secs(1),
        }
    }
}

/// Probe backed by `/proc/mounts`, TCP connects and `getifaddrs`.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    config: ProbeConfig,
}

impl SystemProbe {
    /// Create a probe with the given timing.
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }

    fn resolve(&self, host: &str, port: u16, deadline: Instant) -> Vec<SocketAddr> {
        let target = (host.to_string(), port);
        let (tx, rx) = mpsc::channel();

        // getaddrinfo has no timeout of its own.
        std::thread::spawn(move || {
            let addrs: Vec<SocketAddr> = target
                .to_socket_addrs()
                .map(Iterator::collect)
                .unwrap_or_default();
            let _ = tx.send(addrs);
        });

        let remaining = deadline.saturating_duration_since(Instant::now());
        rx.recv_timeout(remaining).unwrap_or_default()
    }
}

impl Probe for SystemProbe {
    fn is_mounted(&self, path: &Path) -> bool {
        match MountTable::read() {
            Ok(table) => table.contains(path),
            Err(e) => {
                debug!(error = %e, "Mount table unreadable, treating as not mounted");
                false
            }
        }
    }

    fn is_host_reachable(&self, url: &RemoteUrl) -> bool {
        let start = Instant::now();
        let deadline = start + self.config.budget;
        let Some(port) = url.effective_port() else {
            trace!(url = %url, "Invalid URL, treating host as unreachable");
            return false;
        };

        let addrs = self.resolve(url.host(), port, deadline);
        if addrs.is_empty() {
            trace!(host = url.host(), "Host did not resolve within budget");
            return false;
        }

        for attempt in 1..=self.config.attempts.max(1) {
            for addr in &addrs {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    trace!(host = url.host(), port, attempt, "Reachability budget exhausted");
                    return false;
                }
                let timeout = self.config.attempt_timeout.min(remaining);
                if TcpStream::connect_timeout(addr, timeout).is_ok() {
                    trace!(host = url.host(), port, attempt, elapsed = ?start.elapsed(), "Host reachable");
                    return true;
                }
            }
        }
        trace!(host = url.host(), port, "Host unreachable");
        false
    }

    fn is_network_up(&self) -> bool {
        interfaces_up()
    }
}

#[cfg(target_os = "linux")]
fn interfaces_up() -> bool {
    use nix::net::if_::InterfaceFlags;

    let Ok(addrs) = nix::ifaddrs::getifaddrs() else {
        return false;
    };
    addrs
        .filter(|ifa| {
            ifa.flags.contains(InterfaceFlags::IFF_UP)
                && !ifa.flags.contains(InterfaceFlags::IFF_LOOPBACK)
        })
        .any(|ifa| {
            ifa.address.as_ref().is_some_and(|addr| {
                addr.as_sockaddr_in().is_some() || addr.as_sockaddr_in6().is_some()
            })
        })
}

#[cfg(not(target_os = "linux"))]
fn interfaces_up() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn fast() -> SystemProbe {
        SystemProbe::new(ProbeConfig {
            attempts: 2,
            attempt_timeout: Duration::from_millis(200),
            budget: Duration::from_millis(500),
        })
    }

    #[test]
    fn test_listening_port_is_reachable() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let url: RemoteUrl = format!("ftp://127.0.0.1:{port}/x").parse().unwrap();
        assert!(fast().is_host_reachable(&url));
    }

    #[test]
    fn test_closed_port_is_unreachable() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let url: RemoteUrl = format!("ftp://127.0.0.1:{port}/x").parse().unwrap();
        assert!(!fast().is_host_reachable(&url));
    }

    #[test]
    fn test_unresolvable_host_within_budget() {
        let url: RemoteUrl = "smb://no-such-host.invalid/share".parse().unwrap();
        let start = Instant::now();
        assert!(!fast().is_host_reachable(&url));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_url_is_unreachable() {
        let url = RemoteUrl::Invalid("smb://:445/b".into());
        assert!(!fast().is_host_reachable(&url));
    }

    #[test]
    fn test_root_is_mounted() {
        assert!(SystemProbe::default().is_mounted(Path::new("/")));
        assert!(!SystemProbe::default().is_mounted(Path::new("/definitely/not/a/mount")));
    }

    #[test]
    fn test_config_from_toml_like_json() {
        let config: ProbeConfig = serde_json::from_str(r#"{"attempt_timeout":"250ms"}"#).unwrap();
        assert_eq!(config.attempt_timeout, Duration::from_millis(250));
        assert_eq!(config.attempts, 2);
    }
}
