//! The reconciliation tick.
//!
//! One tick loads the store, observes every entry, classifies it, passes
//! each non-empty batch through the confirmation gate (unmounts first),
//! executes the first one cleared to run and persists the resulting
//! statuses. Ticks never overlap; the caller drives them.
//!
//! Classification per entry:
//!
//! - **unmount** when the host is unreachable, the path is mounted and the
//!   last known status is `mounted` (and the network guard allows it)
//! - **mount** when a mount command can be built, the host is reachable,
//!   the path is not mounted, `automount` is on and the last known status is
//!   `unmounted`
//!
//! Unmount batches take priority and stop at the first failure; mount
//! batches carry on past failures.

use std::path::{Path, PathBuf};

use netmount_core::{EncryptedStore, KnownStatus, MountSpec, StoreError, catalog};
use secrecy::SecretString;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::bookmarks::{BookmarkSink, MountedPlace, refresh};
use crate::executor::{ExecError, Executor};
use crate::gate::{BatchKind, ConfirmationGate, GateDecision};
use crate::network::{NetworkGuard, NetworkState};
use crate::probe::Probe;

/// Errors that abort a whole tick.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// The store could not be read or written.
    #[error("store unavailable: {0}")]
    Store(#[from] StoreError),
}

impl ReconcileError {
    /// Wrong admin password or tampered store.
    pub fn is_authentication(&self) -> bool {
        match self {
            ReconcileError::Store(e) => e.is_authentication(),
        }
    }
}

/// What was seen about one entry this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Observation {
    /// Path is in the mount table
    pub mounted: bool,
    /// Host answered on its port
    pub reachable: bool,
    /// A mount command can be built
    pub mount_actionable: bool,
}

/// Decide which batch, if any, `spec` belongs to.
pub fn classify(
    spec: &MountSpec,
    seen: Observation,
    allow_destructive: bool,
) -> Option<BatchKind> {
    if allow_destructive
        && !seen.reachable
        && seen.mounted
        && spec.last_known_status == KnownStatus::Mounted
    {
        return Some(BatchKind::Unmount);
    }
    if seen.mount_actionable
        && seen.reachable
        && !seen.mounted
        && spec.automount
        && spec.last_known_status == KnownStatus::Unmounted
    {
        return Some(BatchKind::Mount);
    }
    None
}

/// Result of one executed entry.
#[derive(Debug)]
pub struct EntryOutcome {
    /// Mount point
    pub path: PathBuf,
    /// Action attempted
    pub kind: BatchKind,
    /// `Ok` or the classified failure
    pub result: Result<(), ExecError>,
}

/// Summary of a tick.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Network guard state used for this tick
    pub network: NetworkState,
    /// Batch considered, if any
    pub batch: Option<BatchKind>,
    /// Gate verdict for that batch
    pub decision: Option<GateDecision>,
    /// Per-entry results, in execution order
    pub outcomes: Vec<EntryOutcome>,
    /// An unmount failure stopped the batch early
    pub aborted: bool,
    /// New statuses were written to the store
    pub saved: bool,
}

impl TickReport {
    fn new(network: NetworkState) -> Self {
        Self {
            network,
            ..Self::default()
        }
    }

    /// Number of entries whose action succeeded.
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }
}

/// Owns everything a tick needs: store handle, credential, probe, executor,
/// gate, network guard and bookmark sink.
pub struct Reconciler {
    store: EncryptedStore,
    admin: SecretString,
    probe: Box<dyn Probe>,
    executor: Executor,
    gate: ConfirmationGate,
    guard: NetworkGuard,
    bookmarks: Box<dyn BookmarkSink>,
}

impl Reconciler {
    /// Assemble a reconciler.
    pub fn new(
        store: EncryptedStore,
        admin: SecretString,
        probe: Box<dyn Probe>,
        executor: Executor,
        gate: ConfirmationGate,
        bookmarks: Box<dyn BookmarkSink>,
    ) -> Self {
        Self {
            store,
            admin,
            probe,
            executor,
            gate,
            guard: NetworkGuard::new(),
            bookmarks,
        }
    }

    /// Replace the admin credential (after re-authentication).
    pub fn set_credential(&mut self, admin: SecretString) {
        self.admin = admin;
    }

    /// Store this reconciler works on.
    pub fn store(&self) -> &EncryptedStore {
        &self.store
    }

    fn observe(&self, spec: &MountSpec, network: NetworkState) -> Observation {
        let mount_actionable = match self.executor.check_mountable(spec) {
            Ok(()) => true,
            Err(reason) => {
                debug!(path = %spec.path.display(), %reason, "Entry not mountable");
                false
            }
        };

        if network.is_down() {
            return Observation {
                mounted: true,
                reachable: false,
                mount_actionable,
            };
        }

        let mounted = self.probe.is_mounted(&spec.path);
        // Reachability only matters for the two classification rules.
        let relevant = if mounted {
            spec.last_known_status == KnownStatus::Mounted
        } else {
            mount_actionable && spec.automount && spec.last_known_status == KnownStatus::Unmounted
        };
        let reachable = relevant && self.probe.is_host_reachable(&spec.url);

        debug!(
            path = %spec.path.display(),
            protocol = spec.url.scheme(),
            host = spec.url.host(),
            mounted,
            reachable,
            status = %spec.last_known_status,
            "Observed"
        );
        Observation {
            mounted,
            reachable,
            mount_actionable,
        }
    }

    /// Run one reconciliation tick.
    pub fn tick(&mut self) -> Result<TickReport, ReconcileError> {
        let network = self.guard.observe(self.probe.is_network_up());
        let mut report = TickReport::new(network);

        let entries = self.store.load(&self.admin)?;

        let mut to_unmount = Vec::new();
        let mut to_mount = Vec::new();
        for spec in &entries {
            let seen = self.observe(spec, network);
            match classify(spec, seen, network.allows_destructive()) {
                Some(BatchKind::Unmount) => to_unmount.push(spec.path.clone()),
                Some(BatchKind::Mount) => to_mount.push(spec.path.clone()),
                None => {}
            }
        }

        self.gate.poll_responses();
        self.gate.observe(BatchKind::Unmount, &to_unmount);
        self.gate.observe(BatchKind::Mount, &to_mount);

        if to_unmount.is_empty() && to_mount.is_empty() {
            info!(network = ?network, entries = entries.len(), "No action");
            return Ok(report);
        }

        // Unmounts first. A batch waiting on or declined at the gate does not
        // hold back the other kind.
        for (kind, batch) in [
            (BatchKind::Unmount, &to_unmount),
            (BatchKind::Mount, &to_mount),
        ] {
            let Some(approved) = self.consider(kind, batch, &mut report) else {
                continue;
            };
            info!(%kind, count = approved.len(), "Executing batch");
            let changes = self.execute(kind, &approved, &entries, &mut report);
            self.persist(&changes, &mut report)?;
            break;
        }
        Ok(report)
    }

    /// Ask the gate about one kind's batch; `Some` holds the paths to execute.
    ///
    /// The report keeps the highest-priority decision unless a later batch
    /// actually runs.
    fn consider(
        &mut self,
        kind: BatchKind,
        batch: &[PathBuf],
        report: &mut TickReport,
    ) -> Option<Vec<PathBuf>> {
        if batch.is_empty() {
            return None;
        }

        let decision = self.gate.decide(kind, batch);
        let runs = matches!(&decision, GateDecision::Proceed(paths) if !paths.is_empty());
        if report.batch.is_none() || runs {
            report.batch = Some(kind);
            report.decision = Some(decision.clone());
        }

        match decision {
            GateDecision::Proceed(approved) if approved.is_empty() => {
                info!(%kind, "Approved batch no longer applies");
                None
            }
            GateDecision::Proceed(approved) => Some(approved),
            GateDecision::Wait => {
                info!(%kind, "Awaiting confirmation");
                None
            }
            GateDecision::Suppressed => {
                debug!(%kind, "Declined batch unchanged, skipping");
                None
            }
        }
    }

    fn execute(
        &self,
        kind: BatchKind,
        paths: &[PathBuf],
        entries: &[MountSpec],
        report: &mut TickReport,
    ) -> Vec<(PathBuf, KnownStatus)> {
        let mut changes = Vec::new();
        for path in paths {
            let Some(original) = catalog::find(entries, path) else {
                continue;
            };
            let mut spec = original.clone();
            let result = match kind {
                BatchKind::Mount => self.executor.mount(&mut spec, &self.admin),
                BatchKind::Unmount => self.executor.unmount(&mut spec, &self.admin),
            };
            let failed = result.is_err();
            if !failed {
                changes.push((spec.path.clone(), spec.last_known_status));
            }
            report.outcomes.push(EntryOutcome {
                path: path.clone(),
                kind,
                result,
            });

            if failed && kind == BatchKind::Unmount {
                warn!(path = %path.display(), "Unmount failed, abandoning the rest of this batch");
                report.aborted = true;
                break;
            }
        }
        changes
    }

    fn persist(
        &self,
        changes: &[(PathBuf, KnownStatus)],
        report: &mut TickReport,
    ) -> Result<(), ReconcileError> {
        if changes.is_empty() {
            return Ok(());
        }

        let entries = self.store.update(&self.admin, |entries| {
            for (path, status) in changes {
                if !catalog::set_status(entries, path, *status) {
                    debug!(path = %path.display(), "Entry removed while acting on it");
                }
            }
            Ok(entries.clone())
        })?;
        report.saved = true;
        self.refresh_bookmarks(&entries);
        Ok(())
    }

    fn refresh_bookmarks(&self, entries: &[MountSpec]) {
        let mounted: Vec<MountedPlace> = entries
            .iter()
            .filter(|spec| spec.last_known_status == KnownStatus::Mounted)
            .map(MountedPlace::from)
            .collect();
        refresh(self.bookmarks.as_ref(), &mounted);
    }

    /// One-shot login automount.
    ///
    /// Mounts every `automount` entry that is not mounted and whose host is
    /// reachable, whatever its last known status. Does nothing while the
    /// local network is down. No confirmation is asked.
    pub fn automount_once(&mut self) -> Result<TickReport, ReconcileError> {
        let network = self.guard.observe(self.probe.is_network_up());
        let mut report = TickReport::new(network);
        if network.is_down() {
            info!("Network down, skipping login automount");
            return Ok(report);
        }

        let entries = self.store.load(&self.admin)?;
        let candidates: Vec<PathBuf> = entries
            .iter()
            .filter(|spec| spec.automount)
            .filter(|spec| !self.probe.is_mounted(&spec.path))
            .filter(|spec| match self.executor.check_mountable(spec) {
                Ok(()) => true,
                Err(reason) => {
                    info!(path = %spec.path.display(), %reason, "Skipping automount entry");
                    false
                }
            })
            .filter(|spec| {
                let reachable = self.probe.is_host_reachable(&spec.url);
                if !reachable {
                    info!(path = %spec.path.display(), host = spec.url.host(), "Host unreachable, not mounting");
                }
                reachable
            })
            .map(|spec| spec.path.clone())
            .collect();

        if candidates.is_empty() {
            info!("Nothing to automount");
            return Ok(report);
        }

        report.batch = Some(BatchKind::Mount);
        report.decision = Some(GateDecision::Proceed(candidates.clone()));
        let changes = self.execute(BatchKind::Mount, &candidates, &entries, &mut report);
        self.persist(&changes, &mut report)?;
        Ok(report)
    }

    /// Mount or unmount a single entry on request, recording the result.
    ///
    /// Unmounting by hand also turns `automount` off so the daemon does not
    /// mount it straight back.
    pub fn act_on(&mut self, path: &Path, kind: BatchKind) -> Result<EntryOutcome, ReconcileError> {
        let entries = self.store.load(&self.admin)?;
        let Some(original) = catalog::find(&entries, path) else {
            return Err(StoreError::Catalog(catalog::CatalogError::NotFound(path.to_path_buf())).into());
        };
        let mut spec = original.clone();
        let result = match kind {
            BatchKind::Mount => self.executor.mount(&mut spec, &self.admin),
            BatchKind::Unmount => self.executor.unmount(&mut spec, &self.admin),
        };

        let ok = result.is_ok();
        if ok || kind == BatchKind::Unmount {
            let status = spec.last_known_status;
            let entries = self.store.update(&self.admin, |entries| {
                if ok {
                    catalog::set_status(entries, path, status);
                }
                if kind == BatchKind::Unmount {
                    catalog::set_automount(entries, path, false)?;
                }
                Ok(entries.clone())
            })?;
            if ok {
                self.refresh_bookmarks(&entries);
            }
        }

        Ok(EntryOutcome {
            path: path.to_path_buf(),
            kind,
            result,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(automount: bool, status: KnownStatus) -> MountSpec {
        let mut spec = MountSpec::new("/m/a", "smb://h/a".parse().unwrap());
        spec.automount = automount;
        spec.last_known_status = status;
        spec
    }

    fn seen(mounted: bool, reachable: bool) -> Observation {
        Observation {
            mounted,
            reachable,
            mount_actionable: true,
        }
    }

    #[test]
    fn test_classify_mount() {
        let entry = spec(true, KnownStatus::Unmounted);
        assert_eq!(classify(&entry, seen(false, true), true), Some(BatchKind::Mount));
        // Mount candidates do not depend on the destructive guard.
        assert_eq!(classify(&entry, seen(false, true), false), Some(BatchKind::Mount));
    }

    #[test]
    fn test_classify_unmount() {
        let entry = spec(false, KnownStatus::Mounted);
        assert_eq!(classify(&entry, seen(true, false), true), Some(BatchKind::Unmount));
        assert_eq!(classify(&entry, seen(true, false), false), None);
    }

    #[test]
    fn test_automount_off_never_mounts() {
        for status in [KnownStatus::Unknown, KnownStatus::Mounted, KnownStatus::Unmounted] {
            for reachable in [true, false] {
                let entry = spec(false, status);
                assert_ne!(classify(&entry, seen(false, reachable), true), Some(BatchKind::Mount));
            }
        }
    }

    #[test]
    fn test_unknown_status_takes_no_action() {
        let entry = spec(true, KnownStatus::Unknown);
        assert_eq!(classify(&entry, seen(false, true), true), None);
        assert_eq!(classify(&entry, seen(true, false), true), None);
    }

    #[test]
    fn test_not_actionable_excluded_from_mount() {
        let entry = spec(true, KnownStatus::Unmounted);
        let observation = Observation {
            mount_actionable: false,
            ..seen(false, true)
        };
        assert_eq!(classify(&entry, observation, true), None);
    }
}
