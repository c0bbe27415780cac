//! Editing operations over the entry list.
//!
//! These functions mutate an in-memory `Vec<MountSpec>` and are meant to run
//! inside [`EncryptedStore::update`](crate::EncryptedStore::update), so a
//! rejected edit never reaches the file. Every operation keeps `path` and
//! `url` unique and `order` contiguous.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{Credential, KnownStatus, MountSpec};
use crate::url::{RemoteUrl, UrlError};

/// Rejected catalog edits.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Another entry already mounts at this path.
    #[error("An entry for mount point {} already exists", .0.display())]
    DuplicatePath(PathBuf),

    /// Another entry already uses this URL.
    #[error("An entry for {0} already exists")]
    DuplicateUrl(String),

    /// The URL does not parse.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] UrlError),

    /// Mount-point names must be plain alphanumeric words.
    #[error("Invalid mount name '{0}': use letters and digits only")]
    InvalidMountName(String),

    /// No entry has this mount point.
    #[error("No entry for mount point {}", .0.display())]
    NotFound(PathBuf),

    /// Target position is past the end of the list.
    #[error("Position {index} is out of range (there are {len} entries)")]
    IndexOutOfRange {
        /// Requested position
        index: usize,
        /// Current number of entries
        len: usize,
    },
}

/// Builder for a new entry.
#[derive(Debug, Clone)]
pub struct NewMount {
    url: String,
    path: PathBuf,
    user: String,
    password: Credential,
    smb_version: Option<String>,
}

impl NewMount {
    /// Start a new entry for `url` mounted at the absolute `path`.
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            user: String::new(),
            password: Credential::default(),
            smb_version: None,
        }
    }

    /// Remote user name.
    #[must_use]
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Remote password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Credential::new(password);
        self
    }

    /// SMB protocol version hint; empty means none.
    #[must_use]
    pub fn smb_version(mut self, version: Option<String>) -> Self {
        self.smb_version = version.filter(|v| !v.trim().is_empty());
        self
    }
}

/// Field replacements for [`edit`]. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct EntryChanges {
    /// New remote URL
    pub url: Option<String>,
    /// New user name
    pub user: Option<String>,
    /// New password
    pub password: Option<Credential>,
    /// New SMB version; `Some(None)` clears it
    pub smb_version: Option<Option<String>>,
}

/// How [`merge_import`] treats an imported entry whose `(url, path)` already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportPolicy {
    /// Keep the existing entry
    #[default]
    Skip,
    /// Overwrite credentials and settings with the imported ones
    Replace,
}

/// Outcome counts of an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Entries appended
    pub added: usize,
    /// Existing entries overwritten
    pub replaced: usize,
    /// Entries ignored (duplicate, or colliding on only one of path/url)
    pub skipped: usize,
}

/// Build the mount point `root/name`, rejecting anything but a plain word.
pub fn mount_point(root: &Path, name: &str) -> Result<PathBuf, CatalogError> {
    if name.is_empty() || !name.chars().all(char::is_alphanumeric) {
        return Err(CatalogError::InvalidMountName(name.to_string()));
    }
    Ok(root.join(name))
}

/// Find an entry by mount point.
pub fn find<'a>(entries: &'a [MountSpec], path: &Path) -> Option<&'a MountSpec> {
    entries.iter().find(|e| e.path == path)
}

fn position(entries: &[MountSpec], path: &Path) -> Result<usize, CatalogError> {
    entries
        .iter()
        .position(|e| e.path == path)
        .ok_or_else(|| CatalogError::NotFound(path.to_path_buf()))
}

/// Reassign `order` as `0..n` following the current list order.
pub fn renumber(entries: &mut [MountSpec]) {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.order = u32::try_from(index).unwrap_or(u32::MAX);
    }
}

fn check_unique(
    entries: &[MountSpec],
    skip: Option<usize>,
    path: &Path,
    url: &RemoteUrl,
) -> Result<(), CatalogError> {
    for (i, e) in entries.iter().enumerate() {
        if Some(i) == skip {
            continue;
        }
        if e.path == path {
            return Err(CatalogError::DuplicatePath(path.to_path_buf()));
        }
        if e.url == *url {
            return Err(CatalogError::DuplicateUrl(url.to_string()));
        }
    }
    Ok(())
}

/// Append a new entry. Returns its position.
pub fn add(entries: &mut Vec<MountSpec>, new: NewMount) -> Result<usize, CatalogError> {
    if !new.path.is_absolute() {
        return Err(CatalogError::InvalidMountName(new.path.display().to_string()));
    }
    let url: RemoteUrl = new.url.parse()?;
    check_unique(entries, None, &new.path, &url)?;

    let mut spec = MountSpec::new(new.path, url);
    spec.user = new.user;
    spec.password = new.password;
    spec.smb_version = new.smb_version;
    spec.order = entries
        .iter()
        .map(|e| e.order)
        .max()
        .map_or(0, |max| max.saturating_add(1));

    tracing::debug!(path = %spec.path.display(), url = %spec.url, "Catalog add");
    entries.push(spec);
    renumber(entries);
    Ok(entries.len() - 1)
}

/// Apply `changes` to the entry at `path`.
pub fn edit(
    entries: &mut [MountSpec],
    path: &Path,
    changes: EntryChanges,
) -> Result<(), CatalogError> {
    let index = position(entries, path)?;

    if let Some(raw) = &changes.url {
        let url: RemoteUrl = raw.parse()?;
        check_unique(entries, Some(index), path, &url)?;
        let entry = &mut entries[index];
        if entry.url != url {
            // Provisioned keys belong to the old host/port.
            entry.sshkeyvalid = None;
            entry.url = url;
        }
    }

    let entry = &mut entries[index];
    if let Some(user) = changes.user {
        entry.user = user;
    }
    if let Some(password) = changes.password {
        entry.password = password;
    }
    if let Some(version) = changes.smb_version {
        entry.smb_version = version.filter(|v| !v.trim().is_empty());
    }
    Ok(())
}

/// Delete the entry at `path` and close the gap in `order`.
pub fn remove(entries: &mut Vec<MountSpec>, path: &Path) -> Result<MountSpec, CatalogError> {
    let index = position(entries, path)?;
    let removed = entries.remove(index);
    renumber(entries);
    Ok(removed)
}

/// Move the entry at `path` to position `new_index`.
pub fn move_to(
    entries: &mut Vec<MountSpec>,
    path: &Path,
    new_index: usize,
) -> Result<(), CatalogError> {
    if new_index >= entries.len() {
        return Err(CatalogError::IndexOutOfRange {
            index: new_index,
            len: entries.len(),
        });
    }
    let index = position(entries, path)?;
    let entry = entries.remove(index);
    entries.insert(new_index, entry);
    renumber(entries);
    Ok(())
}

/// Enable or disable automount for the entry at `path`.
pub fn set_automount(
    entries: &mut [MountSpec],
    path: &Path,
    enabled: bool,
) -> Result<(), CatalogError> {
    let index = position(entries, path)?;
    entries[index].automount = enabled;
    Ok(())
}

/// Record an observed status for the entry at `path`, if it still exists.
///
/// Returns false when the entry was removed in the meantime.
pub fn set_status(entries: &mut [MountSpec], path: &Path, status: KnownStatus) -> bool {
    match entries.iter_mut().find(|e| e.path == path) {
        Some(entry) => {
            entry.last_known_status = status;
            true
        }
        None => false,
    }
}

/// Merge entries read from another store.
///
/// Entries are matched on `(url, path)`. Unmatched entries are appended with
/// status reset to unknown; an entry that collides on only one of the two
/// keys is skipped to keep both unique.
pub fn merge_import(
    entries: &mut Vec<MountSpec>,
    imported: Vec<MountSpec>,
    policy: ImportPolicy,
) -> ImportSummary {
    let mut summary = ImportSummary::default();

    for mut incoming in imported {
        let existing = entries
            .iter()
            .position(|e| e.url == incoming.url && e.path == incoming.path);

        match existing {
            Some(index) => match policy {
                ImportPolicy::Skip => summary.skipped += 1,
                ImportPolicy::Replace => {
                    let current = &mut entries[index];
                    incoming.order = current.order;
                    incoming.last_known_status = current.last_known_status;
                    *current = incoming;
                    summary.replaced += 1;
                }
            },
            None => {
                if check_unique(entries, None, &incoming.path, &incoming.url).is_err() {
                    tracing::warn!(
                        path = %incoming.path.display(),
                        url = %incoming.url,
                        "Skipping imported entry that conflicts with an existing one"
                    );
                    summary.skipped += 1;
                    continue;
                }
                incoming.last_known_status = KnownStatus::Unknown;
                entries.push(incoming);
                summary.added += 1;
            }
        }
    }

    renumber(entries);
    summary
}
