//! Lock-protected encrypted store of mount specifications.
//!
//! The store file lives at `~/.local/share/netmount/mounts.secure` by default
//! and holds the sealed JSON array of [`MountSpec`].
//!
//! # Concurrency Safety
//!
//! The editor, the login automounter and the daemon are independent
//! processes. Every operation here takes an advisory exclusive lock on the
//! sibling `<store>.lock` file for its whole duration, so a read-modify-write
//! through [`EncryptedStore::update`] can never interleave with another
//! process's write.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fs2::FileExt;
use secrecy::SecretString;
use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use crate::catalog;
use crate::crypto::{StoreKey, derive_key};
use crate::error::StoreError;
use crate::model::MountSpec;

/// How long to wait for another process to release the store lock.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default store location under the user's data directory.
pub fn default_store_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "netmount", "netmount")
        .map(|dirs| dirs.data_dir().join("mounts.secure"))
}

/// Handle to an encrypted store file.
///
/// Holds no decrypted state; every call reads or writes the file under the
/// lock and the caller supplies the administrator password each time.
#[derive(Debug, Clone)]
pub struct EncryptedStore {
    path: PathBuf,
    lock_path: PathBuf,
}

/// Exclusive lock held for the lifetime of the guard.
struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), error = %e, "Failed to release store lock");
        }
    }
}

impl EncryptedStore {
    /// Create a handle for the store at `path`. Nothing is touched on disk yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "store".into());
        lock_name.push(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    /// Path of the ciphertext file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the sibling lock file.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Load all entries, sorted by `order`.
    ///
    /// A missing or empty file is bootstrapped with an encrypted empty list.
    /// A wrong password or corrupted file yields [`StoreError::Authentication`]
    /// and no data.
    pub fn load(&self, password: &SecretString) -> Result<Vec<MountSpec>, StoreError> {
        let key = derive_key(password);
        let _lock = self.acquire()?;
        self.load_locked(&key)
    }

    /// Replace the stored list with `entries`.
    pub fn save(&self, password: &SecretString, entries: &[MountSpec]) -> Result<(), StoreError> {
        let key = derive_key(password);
        let _lock = self.acquire()?;
        self.save_locked(&key, entries)
    }

    /// Load, mutate and save under a single lock acquisition.
    ///
    /// If `f` returns an error the file is left untouched and the error is
    /// passed through.
    ///
    /// # Example
    ///
    /// ```ignore
    /// store.update(&admin, |entries| {
    ///     catalog::set_automount(entries, path, true)?;
    ///     Ok(())
    /// })?;
    /// ```
    pub fn update<F, R>(&self, password: &SecretString, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&mut Vec<MountSpec>) -> Result<R, StoreError>,
    {
        let key = derive_key(password);
        let _lock = self.acquire()?;
        let mut entries = self.load_locked(&key)?;
        let result = f(&mut entries)?;
        catalog::renumber(&mut entries);
        self.save_locked(&key, &entries)?;
        Ok(result)
    }

    /// Check whether `password` opens this store.
    ///
    /// Bootstraps a missing store, so the first password ever given becomes
    /// the store password.
    pub fn verify_password(&self, password: &SecretString) -> Result<bool, StoreError> {
        match self.load(password) {
            Ok(_) => Ok(true),
            Err(StoreError::Authentication) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Write this store's entries into a new store at `dest`, sealed under
    /// `dest_password`. Returns the number of entries written.
    pub fn export_to(
        &self,
        password: &SecretString,
        dest: &Path,
        dest_password: &SecretString,
    ) -> Result<usize, StoreError> {
        let entries = self.load(password)?;
        EncryptedStore::new(dest).save(dest_password, &entries)?;
        info!(dest = %dest.display(), count = entries.len(), "Exported mount entries");
        Ok(entries.len())
    }

    /// Read the entries of an existing store at `source`.
    ///
    /// Unlike [`load`](Self::load) this never bootstraps: a missing source
    /// file is an I/O error.
    pub fn import_from(
        source: &Path,
        password: &SecretString,
    ) -> Result<Vec<MountSpec>, StoreError> {
        if !source.is_file() {
            return Err(StoreError::io(
                source,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no store file at this path"),
            ));
        }
        EncryptedStore::new(source).load(password)
    }

    fn acquire(&self) -> Result<LockGuard, StoreError> {
        if let Some(dir) = self.lock_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .map_err(|e| StoreError::io(&self.lock_path, e))?;

        let start = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => break,
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        return Err(StoreError::LockTimeout {
                            path: self.lock_path.clone(),
                        });
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(StoreError::io(&self.lock_path, e)),
            }
        }

        trace!(lock = %self.lock_path.display(), waited = ?start.elapsed(), "Store lock acquired");
        Ok(LockGuard {
            file,
            path: self.lock_path.clone(),
        })
    }

    fn load_locked(&self, key: &StoreKey) -> Result<Vec<MountSpec>, StoreError> {
        let sealed = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        if sealed.is_empty() {
            debug!(path = %self.path.display(), "Bootstrapping empty store");
            self.save_locked(key, &[])?;
            return Ok(Vec::new());
        }

        let plaintext = key.open(&sealed)?;
        let mut entries: Vec<MountSpec> = serde_json::from_slice(&plaintext)?;
        entries.sort_by_key(|e| e.order);
        catalog::renumber(&mut entries);
        Ok(entries)
    }

    fn save_locked(&self, key: &StoreKey, entries: &[MountSpec]) -> Result<(), StoreError> {
        let plaintext = zeroize::Zeroizing::new(serde_json::to_vec(entries)?);
        let sealed = key.seal(&plaintext)?;

        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StoreError::io(&dir, e))?;
        tmp.write_all(&sealed)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StoreError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), count = entries.len(), "Store saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::KnownStatus;
    use tempfile::TempDir;

    fn pw(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn entry(path: &str, url: &str, order: u32) -> MountSpec {
        let mut spec = MountSpec::new(path, url.parse().unwrap());
        spec.order = order;
        spec
    }

    #[test]
    fn test_lock_path_is_sibling() {
        let store = EncryptedStore::new("/var/tmp/x/mounts.secure");
        assert_eq!(store.lock_path(), Path::new("/var/tmp/x/mounts.secure.lock"));
    }

    #[test]
    fn test_load_sorts_and_renumbers() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::new(dir.path().join("s"));
        let admin = pw("pw");
        store
            .save(
                &admin,
                &[
                    entry("/m/b", "ftp://b/x", 7),
                    entry("/m/a", "ftp://a/x", 3),
                ],
            )
            .unwrap();

        let loaded = store.load(&admin).unwrap();
        assert_eq!(loaded[0].path, Path::new("/m/a"));
        assert_eq!(loaded[0].order, 0);
        assert_eq!(loaded[1].order, 1);
    }

    #[test]
    fn test_update_error_leaves_file_untouched() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::new(dir.path().join("s"));
        let admin = pw("pw");
        store.save(&admin, &[entry("/m/a", "ftp://a/x", 0)]).unwrap();
        let before = fs::read(store.path()).unwrap();

        let result: Result<(), _> = store.update(&admin, |entries| {
            entries[0].last_known_status = KnownStatus::Mounted;
            Err(StoreError::Authentication)
        });
        assert!(result.is_err());
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_lock_timeout_when_held() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::new(dir.path().join("s"));
        let _held = store.acquire().unwrap();

        // A second handle opens its own descriptor, so flock contends.
        let other = EncryptedStore::new(dir.path().join("s"));
        let start = Instant::now();
        let err = other.acquire().err().unwrap();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
        assert!(start.elapsed() >= LOCK_TIMEOUT);
    }

    #[test]
    fn test_verify_password() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::new(dir.path().join("s"));
        assert!(store.verify_password(&pw("first")).unwrap());
        assert!(store.verify_password(&pw("first")).unwrap());
        assert!(!store.verify_password(&pw("second")).unwrap());
    }

    #[test]
    fn test_export_and_import() {
        let dir = TempDir::new().unwrap();
        let store = EncryptedStore::new(dir.path().join("s"));
        store.save(&pw("a"), &[entry("/m/a", "smb://h/a", 0)]).unwrap();

        let backup = dir.path().join("backup.secure");
        assert_eq!(store.export_to(&pw("a"), &backup, &pw("b")).unwrap(), 1);

        let imported = EncryptedStore::import_from(&backup, &pw("b")).unwrap();
        assert_eq!(imported.len(), 1);
        assert!(matches!(
            EncryptedStore::import_from(&backup, &pw("a")),
            Err(StoreError::Authentication)
        ));
        assert!(matches!(
            EncryptedStore::import_from(&dir.path().join("missing"), &pw("b")),
            Err(StoreError::Io { .. })
        ));
    }
}
