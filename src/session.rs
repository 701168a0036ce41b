//! Session-scoped filesystem locations.
//!
//! Every path getter is idempotent and creates the directory before
//! returning it. The session timestamp is captured once at construction and
//! shared by cloning, so all components agree on one workspace identity for
//! the lifetime of the process.

use std::fs;
use std::path::PathBuf;

use chrono::Local;

use crate::catalog::AssetType;
use crate::error::Result;

/// Immutable session identity: the managed data root plus a timestamp token
/// fixed at process start.
#[derive(Debug, Clone)]
pub struct SessionContext {
    data_root: PathBuf,
    timestamp: String,
}

impl SessionContext {
    /// Create a session rooted at `data_root`, stamped with the current
    /// local time.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            timestamp: Local::now().format("%Y-%m-%d-%H-%M-%S").to_string(),
        }
    }

    /// Create a session with a caller-chosen timestamp token.
    ///
    /// Intended for tests that need a deterministic workspace.
    pub fn with_timestamp(data_root: impl Into<PathBuf>, timestamp: impl Into<String>) -> Self {
        Self {
            data_root: data_root.into(),
            timestamp: timestamp.into(),
        }
    }

    /// The session timestamp token, e.g. `2026-08-23-14-07-31`.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    fn ensure(&self, path: PathBuf) -> Result<PathBuf> {
        fs::create_dir_all(&path)?;
        Ok(path)
    }

    /// The managed data root.
    pub fn data_dir(&self) -> Result<PathBuf> {
        self.ensure(self.data_root.clone())
    }

    /// Root holding one workspace per session.
    pub fn sessions_dir(&self) -> Result<PathBuf> {
        self.ensure(self.data_root.join("sessions"))
    }

    /// This session's workspace, the staging area for derived files.
    pub fn session_dir(&self) -> Result<PathBuf> {
        self.ensure(self.data_root.join("sessions").join(&self.timestamp))
    }

    /// Root of all log directories.
    pub fn log_root(&self) -> Result<PathBuf> {
        self.ensure(self.data_root.join("logs"))
    }

    /// This session's log directory.
    pub fn log_dir(&self) -> Result<PathBuf> {
        self.ensure(self.data_root.join("logs").join(&self.timestamp))
    }

    /// Canonical model root for an asset type.
    pub fn models_dir(&self, asset_type: AssetType) -> Result<PathBuf> {
        let path = match asset_type {
            AssetType::Primary => self.data_root.join("models"),
            AssetType::Vae => self.data_root.join("models").join("vae"),
        };
        self.ensure(path)
    }

    /// Directory holding backend binaries.
    pub fn bin_dir(&self) -> Result<PathBuf> {
        self.ensure(self.data_root.join("bin"))
    }

    /// Managed cache root, used to redirect downstream library caches.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        self.ensure(self.data_root.join("cache"))
    }
}
