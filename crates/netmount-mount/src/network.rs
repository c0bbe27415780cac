//! Network-stability guard.
//!
//! Tracks local interface up/down across ticks so a brief flap does not
//! turn every mount into an unmount candidate.

use serde::Serialize;
use tracing::{info, warn};

/// Network condition as seen by the current tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkState {
    /// Up, and never seen down
    #[default]
    Stable,
    /// Down this tick
    Interrupted,
    /// Down last tick, up now
    JustRecovered,
    /// Up for at least one full tick since the last recovery
    RecoveredAfterPriorInterruption,
}

impl NetworkState {
    /// No usable local network: observations are forced conservative.
    pub fn is_down(self) -> bool {
        self == NetworkState::Interrupted
    }

    /// Whether unmount candidates may be computed this tick.
    pub fn allows_destructive(self) -> bool {
        matches!(
            self,
            NetworkState::Stable | NetworkState::RecoveredAfterPriorInterruption
        )
    }
}

/// Edge detector over successive `is_network_up` samples.
#[derive(Debug, Default)]
pub struct NetworkGuard {
    state: NetworkState,
}

impl NetworkGuard {
    /// Start in [`NetworkState::Stable`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state without sampling.
    pub fn state(&self) -> NetworkState {
        self.state
    }

    /// Feed this tick's sample and return the resulting state.
    pub fn observe(&mut self, up: bool) -> NetworkState {
        let next = match (self.state, up) {
            (_, false) => NetworkState::Interrupted,
            (NetworkState::Interrupted, true) => NetworkState::JustRecovered,
            (
                NetworkState::JustRecovered | NetworkState::RecoveredAfterPriorInterruption,
                true,
            ) => NetworkState::RecoveredAfterPriorInterruption,
            (NetworkState::Stable, true) => NetworkState::Stable,
        };

        if next != self.state {
            match next {
                NetworkState::Interrupted => warn!("Network down, deferring unmount decisions"),
                NetworkState::JustRecovered => {
                    info!("Network back, skipping unmount decisions for one tick");
                }
                NetworkState::RecoveredAfterPriorInterruption => {
                    info!("Network stable again, resuming normal reconciliation");
                }
                NetworkState::Stable => {}
            }
        }
        self.state = next;
        next
    }
}
