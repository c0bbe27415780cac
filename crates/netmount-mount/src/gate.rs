//! Edge-triggered confirmation of mount and unmount batches.
//!
//! The gate asks once per batch composition. A request goes out as a
//! [`PendingConfirmation`] over a channel; whoever holds the other end (a
//! terminal prompt, an auto-responder, a desktop notifier) answers with a
//! [`ConfirmationResponse`]. The reconciler never blocks on the answer beyond
//! a short grace period: an unanswered batch is held as pending and later
//! ticks neither re-ask nor execute it.
//!
//! State per [`BatchKind`]:
//!
//! ```text
//! Idle --request--> Pending --approved--> Approved --next decide--> Idle
//!                      \
//!                       `--denied--> Suppressed{composition}
//! Suppressed --composition changes (incl. empty)--> Idle
//! ```

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Which kind of batch a confirmation covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchKind {
    /// Entries to mount
    Mount,
    /// Entries to unmount
    Unmount,
}

impl std::fmt::Display for BatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            BatchKind::Mount => "mount",
            BatchKind::Unmount => "unmount",
        })
    }
}

/// Request sent to the responder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    /// Correlates the response
    pub id: u64,
    /// Batch kind
    pub kind: BatchKind,
    /// Mount points in the batch, in processing order
    pub paths: Vec<PathBuf>,
}

/// Answer from the responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationResponse {
    /// Id of the request being answered
    pub id: u64,
    /// Whether the batch may run
    pub approved: bool,
}

/// What the reconciler should do with a batch this tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Execute these paths (approved and still classified)
    Proceed(Vec<PathBuf>),
    /// A confirmation is outstanding
    Wait,
    /// This exact batch was declined earlier
    Suppressed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum KindState {
    #[default]
    Idle,
    Pending {
        id: u64,
        paths: BTreeSet<PathBuf>,
    },
    Approved {
        paths: BTreeSet<PathBuf>,
    },
    Suppressed {
        composition: BTreeSet<PathBuf>,
    },
}

/// Responder side of the gate's channels.
#[derive(Debug)]
pub struct ResponderEnd {
    /// Incoming requests; closes when the gate is dropped
    pub requests: Receiver<PendingConfirmation>,
    /// Where to send answers
    pub responses: Sender<ConfirmationResponse>,
}

/// Per-kind confirmation state machine.
#[derive(Debug)]
pub struct ConfirmationGate {
    requests: Sender<PendingConfirmation>,
    responses: Receiver<ConfirmationResponse>,
    response_wait: Duration,
    next_id: u64,
    mount: KindState,
    unmount: KindState,
}

impl ConfirmationGate {
    /// Create a gate and the channel end a responder should serve.
    ///
    /// `response_wait` is how long [`decide`](Self::decide) waits for an
    /// answer to a fresh request before reporting [`GateDecision::Wait`].
    pub fn new(response_wait: Duration) -> (Self, ResponderEnd) {
        let (req_tx, req_rx) = crossbeam_channel::unbounded();
        let (resp_tx, resp_rx) = crossbeam_channel::unbounded();
        let gate = Self {
            requests: req_tx,
            responses: resp_rx,
            response_wait,
            next_id: 1,
            mount: KindState::Idle,
            unmount: KindState::Idle,
        };
        let end = ResponderEnd {
            requests: req_rx,
            responses: resp_tx,
        };
        (gate, end)
    }

    /// Gate answered by a background thread that always says `approve`.
    pub fn auto(approve: bool) -> Self {
        let (gate, end) = Self::new(Duration::from_millis(500));
        spawn_auto_responder(end, approve);
        gate
    }

    fn state(&self, kind: BatchKind) -> &KindState {
        match kind {
            BatchKind::Mount => &self.mount,
            BatchKind::Unmount => &self.unmount,
        }
    }

    fn state_mut(&mut self, kind: BatchKind) -> &mut KindState {
        match kind {
            BatchKind::Mount => &mut self.mount,
            BatchKind::Unmount => &mut self.unmount,
        }
    }

    /// Apply every response that has arrived so far.
    pub fn poll_responses(&mut self) {
        loop {
            match self.responses.try_recv() {
                Ok(response) => self.apply(response),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn apply(&mut self, response: ConfirmationResponse) {
        let kind = [BatchKind::Mount, BatchKind::Unmount].into_iter().find(
            |k| matches!(self.state(*k), KindState::Pending { id, .. } if *id == response.id),
        );
        let Some(kind) = kind else {
            debug!(id = response.id, "Ignoring response to unknown confirmation");
            return;
        };

        let state = self.state_mut(kind);
        let KindState::Pending { paths, .. } = std::mem::take(state) else {
            return;
        };
        *state = if response.approved {
            KindState::Approved { paths }
        } else {
            KindState::Suppressed { composition: paths }
        };
        info!(%kind, id = response.id, approved = response.approved, "Confirmation answered");
    }

    /// Record this tick's batch composition for `kind`.
    ///
    /// A suppressed kind becomes askable again once its composition changes.
    /// An approval lapses when nothing of that kind is left to do.
    pub fn observe(&mut self, kind: BatchKind, batch: &[PathBuf]) {
        let current: BTreeSet<PathBuf> = batch.iter().cloned().collect();
        let reset = match self.state(kind) {
            KindState::Suppressed { composition } => *composition != current,
            KindState::Approved { .. } => current.is_empty(),
            KindState::Idle | KindState::Pending { .. } => false,
        };
        if reset {
            debug!(%kind, "Batch changed since it was answered, gate reset");
            *self.state_mut(kind) = KindState::Idle;
        }
    }

    /// Whether `kind` has an unanswered request.
    pub fn is_pending(&self, kind: BatchKind) -> bool {
        matches!(self.state(kind), KindState::Pending { .. })
    }

    /// Whether `kind` was approved and has not executed yet.
    pub fn is_approved(&self, kind: BatchKind) -> bool {
        matches!(self.state(kind), KindState::Approved { .. })
    }

    /// Decide what to do with the non-empty `batch` of `kind`.
    pub fn decide(&mut self, kind: BatchKind, batch: &[PathBuf]) -> GateDecision {
        match self.state(kind).clone() {
            KindState::Approved { paths } => {
                *self.state_mut(kind) = KindState::Idle;
                let still_wanted: Vec<PathBuf> =
                    batch.iter().filter(|p| paths.contains(*p)).cloned().collect();
                GateDecision::Proceed(still_wanted)
            }
            KindState::Pending { .. } => GateDecision::Wait,
            KindState::Suppressed { .. } => GateDecision::Suppressed,
            KindState::Idle => self.request(kind, batch),
        }
    }

    fn request(&mut self, kind: BatchKind, batch: &[PathBuf]) -> GateDecision {
        let id = self.next_id;
        self.next_id += 1;
        let request = PendingConfirmation {
            id,
            kind,
            paths: batch.to_vec(),
        };

        if self.requests.send(request).is_err() {
            warn!(%kind, "No confirmation responder, declining batch");
            *self.state_mut(kind) = KindState::Suppressed {
                composition: batch.iter().cloned().collect(),
            };
            return GateDecision::Suppressed;
        }

        info!(%kind, id, count = batch.len(), "Confirmation requested");
        *self.state_mut(kind) = KindState::Pending {
            id,
            paths: batch.iter().cloned().collect(),
        };

        let deadline = Instant::now() + self.response_wait;
        while matches!(self.state(kind), KindState::Pending { .. }) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.responses.recv_timeout(remaining) {
                Ok(response) => self.apply(response),
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => break,
            }
        }

        match self.state(kind) {
            KindState::Approved { .. } => self.decide(kind, batch),
            KindState::Suppressed { .. } => GateDecision::Suppressed,
            KindState::Pending { .. } | KindState::Idle => GateDecision::Wait,
        }
    }
}

/// Answer every request with `approve` until the gate goes away.
pub fn spawn_auto_responder(end: ResponderEnd, approve: bool) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for request in &end.requests {
            debug!(kind = %request.kind, id = request.id, approve, "Auto-answering confirmation");
            let response = ConfirmationResponse {
                id: request.id,
                approved: approve,
            };
            if end.responses.send(response).is_err() {
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(|n| PathBuf::from(format!("/m/{n}"))).collect()
    }

    #[test]
    fn test_auto_approve_proceeds_same_tick() {
        let mut gate = ConfirmationGate::auto(true);
        let batch = paths(&["a", "b"]);
        gate.observe(BatchKind::Mount, &batch);
        assert_eq!(gate.decide(BatchKind::Mount, &batch), GateDecision::Proceed(batch.clone()));
        // Next identical batch asks again; approval is per batch, not sticky.
        assert_eq!(gate.decide(BatchKind::Mount, &batch), GateDecision::Proceed(batch));
    }

    #[test]
    fn test_denial_suppresses_until_composition_changes() {
        let (mut gate, end) = ConfirmationGate::new(Duration::ZERO);
        let batch = paths(&["a"]);
        let deny = |gate: &mut ConfirmationGate| {
            let request = end.requests.try_recv().unwrap();
            end.responses
                .send(ConfirmationResponse { id: request.id, approved: false })
                .unwrap();
            gate.poll_responses();
        };

        gate.observe(BatchKind::Unmount, &batch);
        assert_eq!(gate.decide(BatchKind::Unmount, &batch), GateDecision::Wait);
        deny(&mut gate);

        // Same batch on later ticks: no new prompt.
        for _ in 0..3 {
            gate.observe(BatchKind::Unmount, &batch);
            assert_eq!(gate.decide(BatchKind::Unmount, &batch), GateDecision::Suppressed);
        }
        assert!(end.requests.try_recv().is_err());

        // Composition grows: asked again.
        let bigger = paths(&["a", "b"]);
        gate.observe(BatchKind::Unmount, &bigger);
        assert_eq!(gate.decide(BatchKind::Unmount, &bigger), GateDecision::Wait);
        deny(&mut gate);

        // Becoming empty clears suppression, so the old batch is asked again.
        gate.observe(BatchKind::Unmount, &[]);
        gate.observe(BatchKind::Unmount, &bigger);
        assert_eq!(gate.decide(BatchKind::Unmount, &bigger), GateDecision::Wait);
        assert!(end.requests.try_recv().is_ok());
    }

    #[test]
    fn test_suppression_is_per_kind() {
        let mut gate = ConfirmationGate::auto(false);
        let batch = paths(&["a"]);
        gate.decide(BatchKind::Unmount, &batch);
        gate.observe(BatchKind::Mount, &batch);
        assert!(matches!(gate.state(BatchKind::Mount), KindState::Idle));
        assert!(matches!(gate.state(BatchKind::Unmount), KindState::Suppressed { .. }));
    }

    #[test]
    fn test_pending_is_not_reasked() {
        let (mut gate, end) = ConfirmationGate::new(Duration::ZERO);
        let batch = paths(&["a", "b"]);

        assert_eq!(gate.decide(BatchKind::Mount, &batch), GateDecision::Wait);
        assert!(gate.is_pending(BatchKind::Mount));
        assert!(!gate.is_pending(BatchKind::Unmount));
        assert_eq!(gate.decide(BatchKind::Mount, &batch), GateDecision::Wait);
        let request = end.requests.try_recv().unwrap();
        assert!(end.requests.try_recv().is_err(), "asked twice");

        end.responses
            .send(ConfirmationResponse { id: request.id, approved: true })
            .unwrap();
        gate.poll_responses();
        assert!(!gate.is_pending(BatchKind::Mount));
        assert!(gate.is_approved(BatchKind::Mount));
        assert!(!gate.is_approved(BatchKind::Unmount));

        // Only entries still classified run.
        let now = paths(&["b", "c"]);
        assert_eq!(gate.decide(BatchKind::Mount, &now), GateDecision::Proceed(paths(&["b"])));
        assert!(!gate.is_approved(BatchKind::Mount));
    }

    #[test]
    fn test_approval_lapses_when_batch_empties() {
        let (mut gate, end) = ConfirmationGate::new(Duration::ZERO);
        let batch = paths(&["a"]);
        gate.decide(BatchKind::Mount, &batch);
        let request = end.requests.try_recv().unwrap();
        end.responses
            .send(ConfirmationResponse { id: request.id, approved: true })
            .unwrap();
        gate.poll_responses();
        assert!(gate.is_approved(BatchKind::Mount));

        gate.observe(BatchKind::Mount, &[]);
        assert!(!gate.is_approved(BatchKind::Mount));

        // The next candidate is asked about afresh.
        assert_eq!(gate.decide(BatchKind::Mount, &batch), GateDecision::Wait);
        assert!(end.requests.try_recv().is_ok());
    }

    #[test]
    fn test_stale_response_ignored() {
        let (mut gate, end) = ConfirmationGate::new(Duration::ZERO);
        gate.decide(BatchKind::Unmount, &paths(&["a"]));
        end.responses
            .send(ConfirmationResponse { id: 999, approved: true })
            .unwrap();
        gate.poll_responses();
        assert!(gate.is_pending(BatchKind::Unmount));
    }

    #[test]
    fn test_missing_responder_declines() {
        let (mut gate, end) = ConfirmationGate::new(Duration::ZERO);
        drop(end);
        let batch = paths(&["a"]);
        assert_eq!(gate.decide(BatchKind::Unmount, &batch), GateDecision::Suppressed);
    }
}
