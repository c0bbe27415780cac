//! Recording fakes for driving the reconciler without touching the system.
//!
//! Each fake is a cheap handle over shared state, so a test can keep one
//! clone and hand another to the reconciler.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use netmount_core::RemoteUrl;
use parking_lot::Mutex;
use secrecy::SecretString;

use crate::bookmarks::{BookmarkSink, MountedPlace};
use crate::command::MountCommand;
use crate::executor::{CommandOutput, CommandRunner};
use crate::probe::Probe;

/// Runner that records every command and answers from a table.
///
/// Programs without a scripted answer succeed.
#[derive(Debug, Clone, Default)]
pub struct RecordingRunner {
    calls: Arc<Mutex<Vec<MountCommand>>>,
    admin_seen: Arc<Mutex<Vec<bool>>>,
    responses: Arc<Mutex<HashMap<String, CommandOutput>>>,
    path_responses: Arc<Mutex<HashMap<PathBuf, CommandOutput>>>,
}

impl RecordingRunner {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every later run of `program` with `output`.
    pub fn respond_to(&self, program: &str, output: CommandOutput) {
        self.responses.lock().insert(program.to_string(), output);
    }

    /// Answer every later command naming `path` with `output`.
    ///
    /// Takes precedence over per-program answers.
    pub fn respond_for_path(&self, path: impl Into<PathBuf>, output: CommandOutput) {
        self.path_responses.lock().insert(path.into(), output);
    }

    /// Commands run so far.
    pub fn calls(&self) -> Vec<MountCommand> {
        self.calls.lock().clone()
    }

    /// Whether each recorded command was handed an admin password.
    pub fn admin_supplied(&self) -> Vec<bool> {
        self.admin_seen.lock().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, cmd: &MountCommand, admin: Option<&SecretString>) -> io::Result<CommandOutput> {
        self.calls.lock().push(cmd.clone());
        self.admin_seen.lock().push(admin.is_some());
        let by_path = {
            let paths = self.path_responses.lock();
            cmd.args
                .iter()
                .find_map(|arg| paths.get(Path::new(arg)).cloned())
        };
        if let Some(output) = by_path {
            return Ok(output);
        }
        Ok(self
            .responses
            .lock()
            .get(&cmd.program)
            .cloned()
            .unwrap_or_else(CommandOutput::ok))
    }
}

#[derive(Debug)]
struct ProbeState {
    mounted: HashSet<PathBuf>,
    reachable: HashSet<String>,
    network_up: bool,
    reachability_checks: usize,
}

/// Probe whose answers are set by the test.
#[derive(Debug, Clone)]
pub struct FakeProbe {
    state: Arc<Mutex<ProbeState>>,
}

impl Default for FakeProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProbe {
    /// Network up, nothing mounted, nothing reachable.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProbeState {
                mounted: HashSet::new(),
                reachable: HashSet::new(),
                network_up: true,
                reachability_checks: 0,
            })),
        }
    }

    /// Mark `path` as mounted or not.
    pub fn set_mounted(&self, path: impl Into<PathBuf>, mounted: bool) {
        let path = path.into();
        let mut state = self.state.lock();
        if mounted {
            state.mounted.insert(path);
        } else {
            state.mounted.remove(&path);
        }
    }

    /// Mark `host` as reachable or not.
    pub fn set_reachable(&self, host: &str, reachable: bool) {
        let mut state = self.state.lock();
        if reachable {
            state.reachable.insert(host.to_string());
        } else {
            state.reachable.remove(host);
        }
    }

    /// Bring the local network up or down.
    pub fn set_network(&self, up: bool) {
        self.state.lock().network_up = up;
    }

    /// How many reachability checks were made.
    pub fn reachability_checks(&self) -> usize {
        self.state.lock().reachability_checks
    }
}

impl Probe for FakeProbe {
    fn is_mounted(&self, path: &Path) -> bool {
        self.state.lock().mounted.contains(path)
    }

    fn is_host_reachable(&self, url: &RemoteUrl) -> bool {
        let mut state = self.state.lock();
        state.reachability_checks += 1;
        state.reachable.contains(url.host())
    }

    fn is_network_up(&self) -> bool {
        self.state.lock().network_up
    }
}

/// Sink that remembers every call as `(action, places)`.
#[derive(Debug, Clone, Default)]
pub struct RecordingBookmarks {
    calls: Arc<Mutex<Vec<(String, Vec<MountedPlace>)>>>,
}

impl RecordingBookmarks {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls so far.
    pub fn calls(&self) -> Vec<(String, Vec<MountedPlace>)> {
        self.calls.lock().clone()
    }
}

impl BookmarkSink for RecordingBookmarks {
    fn replace(&self, mounted: &[MountedPlace]) -> io::Result<()> {
        self.calls.lock().push(("replace".into(), mounted.to_vec()));
        Ok(())
    }

    fn clean(&self, mounted: &[MountedPlace]) -> io::Result<()> {
        self.calls.lock().push(("clean".into(), mounted.to_vec()));
        Ok(())
    }
}
