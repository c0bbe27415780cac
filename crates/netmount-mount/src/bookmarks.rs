//! Desktop bookmark collaborator.
//!
//! After a state-changing batch the reconciler hands the full ordered list
//! of mounted places to a [`BookmarkSink`]. The sink owns whatever file or
//! service it updates; netmount only promises the list.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use netmount_core::MountSpec;
use serde::Serialize;
use tracing::{debug, warn};

/// A mounted path with its display title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountedPlace {
    /// Mount point
    pub path: PathBuf,
    /// Title shown in file managers
    pub title: String,
}

impl From<&MountSpec> for MountedPlace {
    fn from(spec: &MountSpec) -> Self {
        Self {
            path: spec.path.clone(),
            title: spec.title(),
        }
    }
}

/// Receiver of mounted-place lists.
pub trait BookmarkSink: Send {
    /// Add bookmarks for newly mounted places in `mounted`.
    fn replace(&self, mounted: &[MountedPlace]) -> io::Result<()>;

    /// Drop bookmarks for places no longer in `mounted`.
    fn clean(&self, mounted: &[MountedPlace]) -> io::Result<()>;
}

/// Sink that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBookmarks;

impl BookmarkSink for NoopBookmarks {
    fn replace(&self, mounted: &[MountedPlace]) -> io::Result<()> {
        debug!(count = mounted.len(), "Bookmark replace (no sink configured)");
        Ok(())
    }

    fn clean(&self, mounted: &[MountedPlace]) -> io::Result<()> {
        debug!(count = mounted.len(), "Bookmark clean (no sink configured)");
        Ok(())
    }
}

/// Sink that runs an external hook: `hook replace|clean` with a JSON array
/// of `{path, title}` on stdin.
#[derive(Debug, Clone)]
pub struct HookBookmarks {
    program: PathBuf,
}

impl HookBookmarks {
    /// Use `program` as the hook.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn invoke(&self, action: &str, mounted: &[MountedPlace]) -> io::Result<()> {
        let payload = serde_json::to_vec(mounted).map_err(io::Error::other)?;
        let mut child = Command::new(&self.program)
            .arg(action)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        if let Some(mut stdin) = child.stdin.take()
            && let Err(e) = stdin.write_all(&payload)
        {
            debug!(hook = %self.program.display(), error = %e, "Hook did not take its input");
        }
        let output = child.wait_with_output()?;
        if output.status.success() {
            Ok(())
        } else {
            Err(io::Error::other(format!(
                "bookmark hook {} {action} failed: {}",
                self.program.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

impl BookmarkSink for HookBookmarks {
    fn replace(&self, mounted: &[MountedPlace]) -> io::Result<()> {
        self.invoke("replace", mounted)
    }

    fn clean(&self, mounted: &[MountedPlace]) -> io::Result<()> {
        self.invoke("clean", mounted)
    }
}

/// Push `mounted` to the sink: add new places, then drop stale ones.
///
/// Failures are logged and otherwise ignored; bookmarks never affect mounts.
pub fn refresh(sink: &dyn BookmarkSink, mounted: &[MountedPlace]) {
    if let Err(e) = sink.replace(mounted) {
        warn!(error = %e, "Bookmark update failed");
    }
    if let Err(e) = sink.clean(mounted) {
        warn!(error = %e, "Bookmark cleanup failed");
    }
}
