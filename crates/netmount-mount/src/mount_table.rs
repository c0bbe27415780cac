//! OS mount table access.
//!
//! On Linux the table is `/proc/mounts`:
//! `{source} {mountpoint} {fstype} {options} {dump} {pass}`, with spaces and
//! other special characters in paths written as octal escapes (`\040`).

use std::io;
use std::path::{Component, Path, PathBuf};

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountRecord {
    /// Device or remote source (`//nas/share`, `user@host:/dir`, `curlftpfs#...`)
    pub source: String,
    /// Mount point
    pub mountpoint: PathBuf,
    /// Filesystem type (`cifs`, `fuse.sshfs`, `fuse.curlftpfs`, ...)
    pub fstype: String,
}

impl MountRecord {
    /// Whether the filesystem type is one netmount itself creates.
    pub fn is_network_mount(&self) -> bool {
        let fstype = self.fstype.to_ascii_lowercase();
        matches!(fstype.as_str(), "cifs" | "smb3" | "fuse.sshfs" | "fuse.curlftpfs")
            || (fstype.starts_with("fuse") && self.source.starts_with("curlftpfs#"))
    }
}

/// Snapshot of the mount table.
#[derive(Debug, Clone, Default)]
pub struct MountTable {
    records: Vec<MountRecord>,
}

/// Path of the kernel's mount table.
pub const PROC_MOUNTS: &str = "/proc/mounts";

impl MountTable {
    /// Read the live table.
    pub fn read() -> io::Result<Self> {
        Self::read_from(Path::new(PROC_MOUNTS))
    }

    /// Read a table in `/proc/mounts` format from `path`.
    pub fn read_from(path: &Path) -> io::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    /// Parse table text, skipping malformed lines.
    pub fn parse(contents: &str) -> Self {
        let records = contents.lines().filter_map(parse_line).collect();
        Self { records }
    }

    /// All records in table order.
    pub fn records(&self) -> &[MountRecord] {
        &self.records
    }

    /// Record mounted at `path`, comparing normalized paths.
    ///
    /// When several mounts are stacked on one path the last (topmost) wins.
    pub fn find(&self, path: &Path) -> Option<&MountRecord> {
        let wanted = normalize(path);
        self.records
            .iter()
            .rev()
            .find(|r| normalize(&r.mountpoint) == wanted)
    }

    /// Whether anything is mounted at `path`.
    pub fn contains(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }
}

fn parse_line(line: &str) -> Option<MountRecord> {
    let mut parts = line.split_whitespace();
    let source = parts.next()?;
    let mountpoint = parts.next()?;
    let fstype = parts.next()?;

    Some(MountRecord {
        source: unescape_mount_path(source),
        mountpoint: PathBuf::from(unescape_mount_path(mountpoint)),
        fstype: fstype.to_string(),
    })
}

/// Lexically normalize a path: drop `.`, resolve `..`, strip trailing slashes.
///
/// Symlinks are not followed; a hung network mount would block `canonicalize`.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Decode the octal escapes `/proc/mounts` uses for whitespace and backslash.
fn unescape_mount_path(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_triplet(&bytes[i + 1..i + 4]) {
            let code = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, b| acc * 8 + u32::from(b - b'0'));
            if let Ok(byte) = u8::try_from(code) {
                out.push(byte);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn is_octal_triplet(bytes: &[u8]) -> bool {
    bytes.len() == 3 && bytes.iter().all(|b| (b'0'..=b'7').contains(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
//nas/media /home/u/mnt/media cifs rw,relatime,vers=3.0 0 0
u@box:/srv /home/u/mnt/my\\040box fuse.sshfs rw,nosuid,nodev 0 0
curlftpfs#ftp://files/ /home/u/mnt/pub fuse rw,nosuid,nodev 0 0
garbage
";

    #[test]
    fn test_parse_skips_malformed() {
        let table = MountTable::parse(SAMPLE);
        assert_eq!(table.records().len(), 4);
    }

    #[test]
    fn test_unescaped_space_in_mountpoint() {
        let table = MountTable::parse(SAMPLE);
        assert!(table.contains(Path::new("/home/u/mnt/my box")));
        assert_eq!(unescape_mount_path("/a\\040b\\134c"), "/a b\\c");
        assert_eq!(unescape_mount_path("/plain\\9"), "/plain\\9");
        assert_eq!(unescape_mount_path("/trail\\04"), "/trail\\04");
    }

    #[test]
    fn test_contains_normalizes() {
        let table = MountTable::parse(SAMPLE);
        assert!(table.contains(Path::new("/home/u/mnt/media/")));
        assert!(table.contains(Path::new("/home/u/./mnt/x/../media")));
        assert!(!table.contains(Path::new("/home/u/mnt")));
    }

    #[test]
    fn test_network_mount_detection() {
        let table = MountTable::parse(SAMPLE);
        let kinds: Vec<bool> = table.records().iter().map(MountRecord::is_network_mount).collect();
        assert_eq!(kinds, vec![false, true, true, true]);
    }

    #[test]
    fn test_read_live_table() {
        // Present on every Linux host the daemon supports.
        if Path::new(PROC_MOUNTS).exists() {
            let table = MountTable::read().unwrap();
            assert!(table.contains(Path::new("/")));
        }
    }

    proptest::proptest! {
        #[test]
        fn prop_parse_never_panics(contents in "\\PC*") {
            let _ = MountTable::parse(&contents);
        }

        #[test]
        fn prop_normalize_is_idempotent(parts in proptest::collection::vec("[a-z.]{1,3}", 0..6)) {
            let path = PathBuf::from(format!("/{}", parts.join("/")));
            let once = normalize(&path);
            proptest::prop_assert_eq!(normalize(&once), once);
        }
    }
}
