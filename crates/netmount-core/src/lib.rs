//! Core data model and encrypted store for netmount.
//!
//! netmount keeps a declarative list of remote filesystem mounts (SMB/CIFS,
//! FTP, SFTP) in a single password-encrypted file. This crate owns that file
//! and everything needed to read and edit it safely.
//!
//! # Components
//!
//! - [`MountSpec`] - One declared remote mount, with credentials and policy
//! - [`RemoteUrl`] - Protocol-tagged remote location (`smb://`, `ftp://`, `sftp://`)
//! - [`crypto`] - Password-derived key and authenticated sealing of the store
//! - [`EncryptedStore`] - Lock-protected load/save/update of the entry list
//! - [`catalog`] - Editing operations (add, edit, remove, reorder, import)
//!
//! # Concurrency
//!
//! The editor, the login automounter and the reconciliation daemon are
//! separate processes. The store's advisory file lock is the only thing they
//! share: every read-modify-write happens inside a single lock acquisition
//! (see [`EncryptedStore::update`]).
//!
//! # Example
//!
//! ```no_run
//! use netmount_core::{catalog, EncryptedStore, NewMount};
//! use secrecy::SecretString;
//!
//! let store = EncryptedStore::new("/tmp/mounts.secure");
//! let admin = SecretString::from("correct horse");
//!
//! store.update(&admin, |entries| {
//!     let new = NewMount::new("smb://nas/media", "/home/me/mnt/media").user("me").password("pw");
//!     catalog::add(entries, new)?;
//!     Ok(())
//! })?;
//! # Ok::<(), netmount_core::StoreError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod crypto;
mod error;
mod model;
mod store;
mod url;

pub use catalog::{CatalogError, EntryChanges, ImportPolicy, ImportSummary, NewMount};
pub use crypto::{CryptoError, StoreKey, derive_key};
pub use error::StoreError;
pub use model::{Credential, KnownStatus, MountSpec};
pub use store::{EncryptedStore, LOCK_TIMEOUT, default_store_path};
pub use url::{Endpoint, Protocol, RemoteUrl, UrlError};
