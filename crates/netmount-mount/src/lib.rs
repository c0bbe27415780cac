//! Observation, execution and reconciliation of netmount entries.
//!
//! This crate turns the declarative list kept by `netmount-core` into actual
//! mounts. It is split along the seams a reconciliation tick crosses:
//!
//! # Components
//!
//! - [`Probe`] / [`SystemProbe`] - Is the path mounted, is the host reachable, is the network up
//! - [`MountTable`] - Parsed `/proc/mounts`
//! - [`mount_command`] / [`unmount_command`] - Per-protocol command descriptors
//! - [`Executor`] / [`CommandRunner`] - Run descriptors and classify failures
//! - [`keys`] - SFTP key pair provisioning
//! - [`NetworkGuard`] - Suppresses unmount decisions around network flaps
//! - [`ConfirmationGate`] - Per-batch approval over a channel
//! - [`Reconciler`] - One tick: load, classify, confirm, execute, persist
//! - [`run_daemon`] - The timed loop around [`Reconciler::tick`]
//! - [`BookmarkSink`] - Receives the mounted-place list after changes
//!
//! Everything touching the system sits behind a trait so [`testing`] fakes
//! can drive the reconciler deterministically.
//!
//! # Example
//!
//! ```no_run
//! use netmount_core::EncryptedStore;
//! use netmount_mount::{
//!     CommandContext, ConfirmationGate, Executor, NoopBookmarks, PrivilegeHelper, ProbeConfig,
//!     Reconciler, SystemProbe, SystemRunner,
//! };
//! use secrecy::SecretString;
//!
//! let executor = Executor::new(
//!     Box::new(SystemRunner::new(PrivilegeHelper::default())),
//!     CommandContext::current("/home/me/.ssh/netmount_keys"),
//! );
//! let mut reconciler = Reconciler::new(
//!     EncryptedStore::new("/home/me/.local/share/netmount/mounts.secure"),
//!     SecretString::from("admin password"),
//!     Box::new(SystemProbe::new(ProbeConfig::default())),
//!     executor,
//!     ConfirmationGate::auto(true),
//!     Box::new(NoopBookmarks),
//! );
//! let report = reconciler.tick()?;
//! println!("{} entries changed", report.succeeded());
//! # Ok::<(), netmount_mount::ReconcileError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bookmarks;
mod command;
pub mod daemon;
mod executor;
mod gate;
pub mod keys;
mod mount_table;
mod network;
mod probe;
pub mod process;
mod reconcile;
pub mod signal;
pub mod testing;

pub use bookmarks::{BookmarkSink, HookBookmarks, MountedPlace, NoopBookmarks};
pub use command::{CommandContext, MountCommand, NotActionable, mount_command, unmount_command};
pub use daemon::{DaemonExit, DaemonOptions, run_daemon, spawn_detached};
pub use executor::{
    CommandOutput, CommandRunner, ExecError, Executor, PrivilegeHelper, SystemRunner,
    classify_failure,
};
pub use gate::{
    BatchKind, ConfirmationGate, ConfirmationResponse, GateDecision, PendingConfirmation,
    ResponderEnd, spawn_auto_responder,
};
pub use keys::{KeyError, provision_key};
pub use mount_table::{MountRecord, MountTable, normalize};
pub use network::{NetworkGuard, NetworkState};
pub use probe::{Probe, ProbeConfig, SystemProbe};
pub use reconcile::{EntryOutcome, Observation, ReconcileError, Reconciler, TickReport, classify};
