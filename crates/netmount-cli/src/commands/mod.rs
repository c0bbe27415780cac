pub mod add;
pub mod automount;
pub mod completions;
pub mod daemon;
pub mod edit;
pub mod keys;
pub mod list;
pub mod login;
pub mod mount;
pub mod remove;
pub mod reorder;
pub mod status;
pub mod transfer;
pub mod unmount;

use std::cell::OnceCell;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context as _, Result};
use netmount_core::{EncryptedStore, MountSpec, catalog};
use netmount_mount::{
    BookmarkSink, CommandContext, ConfirmationGate, Executor, HookBookmarks, NoopBookmarks,
    Reconciler, SystemProbe, SystemRunner,
};
use secrecy::SecretString;

use crate::auth::PasswordSource;
use crate::config::Config;

/// Everything a command needs: configuration, the store and a lazily
/// resolved admin password.
pub struct Context {
    pub config: Config,
    pub store: EncryptedStore,
    pub quiet: bool,
    password_source: PasswordSource,
    password: OnceCell<SecretString>,
}

impl Context {
    pub fn new(config: Config, store_path: PathBuf, password: PasswordSource, quiet: bool) -> Self {
        Self {
            config,
            store: EncryptedStore::new(store_path),
            quiet,
            password_source: password,
            password: OnceCell::new(),
        }
    }

    /// The admin password, asked for at most once per invocation.
    pub fn admin(&self) -> Result<&SecretString> {
        if let Some(password) = self.password.get() {
            return Ok(password);
        }
        let first_use = !self.store.path().exists();
        let password = self.password_source.resolve(first_use)?;
        Ok(self.password.get_or_init(|| password))
    }

    /// Password source, for commands that re-prompt.
    pub fn password_source(&self) -> &PasswordSource {
        &self.password_source
    }

    /// Load every entry.
    pub fn entries(&self) -> Result<Vec<MountSpec>> {
        self.store
            .load(self.admin()?)
            .with_context(|| format!("Failed to open store {}", self.store.path().display()))
    }

    /// Load one entry by mount point.
    pub fn entry(&self, path: &Path) -> Result<MountSpec> {
        let path = absolute(path)?;
        let entries = self.entries()?;
        catalog::find(&entries, &path)
            .cloned()
            .ok_or_else(|| catalog::CatalogError::NotFound(path).into())
    }

    /// Executor wired to the real system.
    pub fn executor(&self) -> Result<Executor> {
        let runner = SystemRunner::new(self.config.privilege.clone());
        Ok(Executor::new(
            Box::new(runner),
            CommandContext::current(self.config.key_dir()?),
        ))
    }

    /// Probe using the configured timing.
    pub fn probe(&self) -> SystemProbe {
        SystemProbe::new(self.config.probe)
    }

    /// Configured bookmark sink.
    pub fn bookmarks(&self) -> Box<dyn BookmarkSink> {
        match &self.config.bookmarks.hook {
            Some(hook) => Box::new(HookBookmarks::new(hook)),
            None => Box::new(NoopBookmarks),
        }
    }

    /// A reconciler over this store.
    pub fn reconciler(&self, gate: ConfirmationGate) -> Result<Reconciler> {
        Ok(Reconciler::new(
            self.store.clone(),
            self.admin()?.clone(),
            Box::new(self.probe()),
            self.executor()?,
            gate,
            self.bookmarks(),
        ))
    }

    /// A reconciler for single-entry actions; it never asks for confirmation.
    pub fn manual_reconciler(&self) -> Result<Reconciler> {
        let (gate, _unanswered) = ConfirmationGate::new(Duration::ZERO);
        self.reconciler(gate)
    }

    /// Print a progress line unless `--quiet`.
    pub fn note(&self, message: impl std::fmt::Display) {
        if !self.quiet {
            eprintln!("{message}");
        }
    }
}

/// Resolve `path` against the current directory without touching the
/// filesystem (the path may be a hung mount).
pub fn absolute(path: &Path) -> Result<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("Failed to read the current directory")?
            .join(path)
    };
    Ok(netmount_mount::normalize(&joined))
}
