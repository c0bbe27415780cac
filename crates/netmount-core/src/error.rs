use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::crypto::CryptoError;

/// Errors from loading, saving or updating the encrypted store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Wrong password or corrupted/tampered file.
    #[error("Authentication failed: wrong password or corrupted store")]
    Authentication,

    /// Filesystem error on the store, its lock file or a transfer file.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Decrypted payload is not a valid entry list.
    #[error("Store contents are not a valid mount list: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Another process held the store lock for too long.
    #[error("Timed out waiting for the store lock at {}", path.display())]
    LockTimeout {
        /// The lock file
        path: PathBuf,
    },

    /// An editing operation was rejected; nothing was written.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Encryption failed while saving.
    #[error("Encryption failed: {0}")]
    Crypto(CryptoError),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for wrong-password / tampered-file failures.
    pub fn is_authentication(&self) -> bool {
        matches!(self, StoreError::Authentication)
    }
}

impl From<CryptoError> for StoreError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Authentication => StoreError::Authentication,
            other => StoreError::Crypto(other),
        }
    }
}
