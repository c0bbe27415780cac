//! Process exit codes.
//!
//! Stable values for scripts and for the login hook that starts the daemon.

/// Successful execution
pub const SUCCESS: u8 = 0;

/// General/unspecified error
pub const GENERAL_ERROR: u8 = 1;

/// Bad arguments or an invalid edit (duplicate path, bad URL, ...)
pub const USAGE_ERROR: u8 = 2;

/// The store rejected the admin password
pub const AUTH_FAILED: u8 = 3;

/// Store unreadable after decryption, or otherwise unusable
pub const STORE_INVALID: u8 = 4;

/// Permission denied on a local file
pub const PERMISSION_DENIED: u8 = 5;

/// A mount, unmount or key setup command failed
pub const MOUNT_FAILED: u8 = 6;

/// No entry at the given path, or a missing file
pub const NOT_FOUND: u8 = 7;

/// Operation cancelled or interrupted
pub const CANCELLED: u8 = 8;
