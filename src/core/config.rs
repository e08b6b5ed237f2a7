//! Filesystem configuration
//!
//! Geometry and startup policy are fixed when a store is formatted. They can
//! be given programmatically through [`SlotFsBuilder`] or loaded from a TOML
//! file:
//!
//! ```toml
//! store_path = "filesys.db"
//! total_size = 1048576
//! max_files = 64
//! reformat = "refuse"
//! ```

use crate::core::error::{Result, SlotFsError};
use crate::core::io::{FileStore, MemoryStore};
use crate::core::layout::{Geometry, DEFAULT_MAX_FILES, DEFAULT_TOTAL_SIZE};
use crate::core::slotfs::SlotFs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default backing store file name
pub const DEFAULT_STORE_PATH: &str = "filesys.db";

/// What to do when an existing store fails validation at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReformatPolicy {
    /// Log a warning and reformat, discarding the old contents
    #[default]
    Reformat,
    /// Return the validation error and leave the store untouched
    Refuse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FsConfig {
    /// Host path of the backing store file
    pub store_path: PathBuf,

    /// Total store size in bytes
    pub total_size: u64,

    /// File table capacity
    pub max_files: usize,

    /// Startup validation policy
    pub reformat: ReformatPolicy,
}

impl Default for FsConfig {
    fn default() -> Self {
        FsConfig {
            store_path: PathBuf::from(DEFAULT_STORE_PATH),
            total_size: DEFAULT_TOTAL_SIZE,
            max_files: DEFAULT_MAX_FILES,
            reformat: ReformatPolicy::default(),
        }
    }
}

impl FsConfig {
    /// Validated store geometry
    pub fn geometry(&self) -> Result<Geometry> {
        Geometry::new(self.total_size, self.max_files)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: FsConfig = toml::from_str(s).map_err(|e| SlotFsError::Config(e.to_string()))?;
        config.geometry()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SlotFsError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        Self::from_toml_str(&text)
    }
}

/// Builder for opening or creating a filesystem
///
/// # Examples
///
/// ```rust,no_run
/// use slotfs::{ReformatPolicy, SlotFsBuilder};
///
/// # fn main() -> slotfs::Result<()> {
/// let mut fs = SlotFsBuilder::new()
///     .path("/var/lib/slotfs/filesys.db")
///     .reformat_policy(ReformatPolicy::Refuse)
///     .build()?;
///
/// let handle = fs.create("/notes.txt", 0o644)?;
/// fs.write(handle, 0, b"hello")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct SlotFsBuilder {
    config: FsConfig,
}

impl SlotFsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn config(mut self, config: FsConfig) -> Self {
        self.config = config;
        self
    }

    pub fn path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.store_path = path.into();
        self
    }

    pub fn total_size(mut self, total_size: u64) -> Self {
        self.config.total_size = total_size;
        self
    }

    pub fn max_files(mut self, max_files: usize) -> Self {
        self.config.max_files = max_files;
        self
    }

    pub fn reformat_policy(mut self, policy: ReformatPolicy) -> Self {
        self.config.reformat = policy;
        self
    }

    /// Open the configured store file, formatting it if missing or invalid
    pub fn build(self) -> Result<SlotFs<FileStore>> {
        SlotFs::from_config(&self.config)
    }

    /// Create a freshly formatted in-memory filesystem
    pub fn build_in_memory(self) -> Result<SlotFs<MemoryStore>> {
        let geometry = self.config.geometry()?;
        SlotFs::format(MemoryStore::new(geometry.total_size()), geometry)
    }
}
