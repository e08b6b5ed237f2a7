//! Operation dispatcher
//!
//! [`SlotFs`] owns the backing store and its metadata mirror and implements
//! every filesystem operation on top of the name resolver
//! ([`FileTable::resolve`](crate::core::catalog::FileTable::resolve)) and the
//! static region allocator ([`Geometry::region_of`]). Operations take
//! `&mut self`; share an instance across threads through
//! [`SharedSlotFs`](crate::core::vfs::SharedSlotFs).

use crate::core::catalog::{is_root, normalize, validate_name, FileEntry};
use crate::core::config::{FsConfig, ReformatPolicy};
use crate::core::error::{Result, SlotFsError};
use crate::core::header::Superblock;
use crate::core::io::{BackingStore, FileStore};
use crate::core::layout::Geometry;
use crate::core::metadata::{now_secs, Metadata};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Permission bits given to files created through `open(O_CREAT)`
pub const DEFAULT_FILE_PERMS: u32 = 0o644;

/// Permission bits reported for the root directory
pub const ROOT_DIR_PERMS: u32 = 0o755;

/// Opaque file handle; the slot index of the open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Handle(pub u64);

impl Handle {
    pub fn from_slot(slot: usize) -> Self {
        Handle(slot as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    RegularFile,
    Directory,
}

/// Attributes reported by `getattr`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttr {
    pub kind: FileKind,
    pub size: u64,
    pub perms: u32,
    /// Unix seconds
    pub mtime: u32,
    pub nlink: u32,
}

impl FileAttr {
    fn root() -> Self {
        FileAttr {
            kind: FileKind::Directory,
            size: 0,
            perms: ROOT_DIR_PERMS,
            mtime: 0,
            nlink: 2,
        }
    }

    fn of(entry: &FileEntry) -> Self {
        FileAttr {
            kind: FileKind::RegularFile,
            size: entry.size as u64,
            perms: entry.perms,
            mtime: entry.mtime,
            nlink: 1,
        }
    }
}

/// One name in a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    pub kind: FileKind,
    /// Slot of a regular file; `None` for `.` and `..`
    pub handle: Option<Handle>,
}

/// Summary of store usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsStats {
    pub file_count: u32,
    pub max_files: usize,
    pub last_alloc: u32,
    pub total_size: u64,
    pub data_offset: u64,
    pub region_capacity: u64,
    /// Sum of logical file sizes
    pub bytes_used: u64,
}

/// Engine context: backing store plus its metadata mirror
pub struct SlotFs<S: BackingStore = FileStore> {
    store: S,
    meta: Metadata,
}

impl SlotFs<FileStore> {
    /// Open the store file named by `config`.
    ///
    /// A missing file is created and formatted. An existing file that fails
    /// validation is handled according to `config.reformat`.
    pub fn from_config(config: &FsConfig) -> Result<Self> {
        let geometry = config.geometry()?;
        let path = &config.store_path;

        if !path.exists() {
            info!(path = %path.display(), "Filesystem not found, creating new filesystem");
            let store = FileStore::create(path, geometry.total_size())?;
            return Self::format(store, geometry);
        }

        let store = FileStore::open(path)?;
        let fs = Self::load_or_format(store, geometry, config.reformat)?;
        info!(
            path = %path.display(),
            file_count = fs.meta.superblock().file_count,
            last_alloc = fs.meta.superblock().last_alloc,
            "Opened filesystem"
        );
        Ok(fs)
    }
}

impl<S: BackingStore> SlotFs<S> {
    /// Format `store` unconditionally
    pub fn format(mut store: S, geometry: Geometry) -> Result<Self> {
        let meta = Metadata::format(&mut store, geometry)?;
        info!(
            total_size = geometry.total_size(),
            max_files = geometry.max_files(),
            "Created empty filesystem"
        );
        Ok(SlotFs { store, meta })
    }

    /// Load `store`, applying `policy` when validation fails
    pub fn load_or_format(mut store: S, geometry: Geometry, policy: ReformatPolicy) -> Result<Self> {
        match Metadata::load(&mut store, geometry) {
            Ok(meta) => Ok(SlotFs { store, meta }),
            Err(e) if e.is_validation_failure() => match policy {
                ReformatPolicy::Reformat => {
                    warn!(reason = %e, "Filesystem failed validation, reformatting");
                    Self::format(store, geometry)
                }
                ReformatPolicy::Refuse => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.meta.geometry()
    }

    pub fn superblock(&self) -> &Superblock {
        self.meta.superblock()
    }

    /// Borrow the underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Tear down the engine, returning its store
    pub fn into_store(self) -> S {
        self.store
    }

    pub fn stats(&self) -> FsStats {
        let geometry = self.geometry();
        let superblock = self.meta.superblock();
        FsStats {
            file_count: superblock.file_count,
            max_files: geometry.max_files(),
            last_alloc: superblock.last_alloc,
            total_size: geometry.total_size(),
            data_offset: geometry.data_offset(),
            region_capacity: geometry.region_capacity(),
            bytes_used: self
                .meta
                .table()
                .iter_used()
                .map(|(_, e)| e.size as u64)
                .sum(),
        }
    }

    fn slot_of(&self, handle: Handle) -> Result<usize> {
        let slot = usize::try_from(handle.0).map_err(|_| SlotFsError::BadHandle(handle.0))?;
        match self.meta.table().get(slot) {
            Some(_) => Ok(slot),
            None => Err(SlotFsError::BadHandle(handle.0)),
        }
    }

    fn entry_mut(&mut self, slot: usize) -> Result<&mut FileEntry> {
        self.meta
            .table_mut()
            .get_mut(slot)
            .ok_or(SlotFsError::BadHandle(slot as u64))
    }

    /// Attributes of a path; the root is always a directory
    pub fn getattr(&self, path: &str) -> Result<FileAttr> {
        if is_root(path) {
            return Ok(FileAttr::root());
        }
        let slot = self.meta.table().resolve(path)?;
        self.attr_of_slot(slot)
    }

    /// Resolve a path to its handle and attributes in one step
    pub fn lookup(&self, path: &str) -> Result<(Handle, FileAttr)> {
        let slot = self.meta.table().resolve(path)?;
        Ok((Handle::from_slot(slot), self.attr_of_slot(slot)?))
    }

    /// Attributes of the file behind an open handle
    pub fn attr_of(&self, handle: Handle) -> Result<FileAttr> {
        let slot = self.slot_of(handle)?;
        self.attr_of_slot(slot)
    }

    fn attr_of_slot(&self, slot: usize) -> Result<FileAttr> {
        self.meta
            .table()
            .get(slot)
            .map(FileAttr::of)
            .ok_or(SlotFsError::BadHandle(slot as u64))
    }

    /// Stored name of the file behind an open handle
    pub fn name_of(&self, handle: Handle) -> Result<&str> {
        let slot = self.slot_of(handle)?;
        Ok(self.meta.table().get(slot).map(|e| e.name()).unwrap_or(""))
    }

    /// List the root directory: `.`, `..`, then files in slot order
    pub fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        if !is_root(path) {
            return Err(SlotFsError::NotADirectory(path.to_string()));
        }

        let mut entries = vec![
            DirEntry {
                name: ".".to_string(),
                kind: FileKind::Directory,
                handle: None,
            },
            DirEntry {
                name: "..".to_string(),
                kind: FileKind::Directory,
                handle: None,
            },
        ];
        entries.extend(self.meta.table().iter_used().map(|(slot, e)| DirEntry {
            name: e.name().to_string(),
            kind: FileKind::RegularFile,
            handle: Some(Handle::from_slot(slot)),
        }));

        Ok(entries)
    }

    /// Open a path, honouring `O_CREAT` and `O_TRUNC` in `flags`
    pub fn open(&mut self, path: &str, flags: i32) -> Result<Handle> {
        let slot = match self.meta.table().resolve(path) {
            Ok(slot) => slot,
            Err(SlotFsError::NotFound(_)) if flags & libc::O_CREAT != 0 => {
                return self.create(path, DEFAULT_FILE_PERMS);
            }
            Err(e) => return Err(e),
        };

        if flags & libc::O_TRUNC != 0 {
            let checkpoint = self.meta.checkpoint(slot);
            let entry = self.entry_mut(slot)?;
            entry.size = 0;
            entry.mtime = now_secs();
            self.meta.commit_or_restore(&mut self.store, checkpoint)?;
            info!(path, slot, "Truncated file on open");
        }

        Ok(Handle::from_slot(slot))
    }

    /// Create a file, or return the handle of an existing one with that name
    pub fn create(&mut self, path: &str, perms: u32) -> Result<Handle> {
        if let Ok(slot) = self.meta.table().resolve(path) {
            return Ok(Handle::from_slot(slot));
        }

        let name = normalize(path);
        validate_name(name)?;

        let slot = self.meta.table().allocate_slot()?;
        let start = self.geometry().region_of(slot) as u32;
        let checkpoint = self.meta.checkpoint(slot);
        self.meta
            .table_mut()
            .insert(slot, name, start, perms, now_secs());
        self.meta.superblock_mut().file_count += 1;
        self.meta.commit_or_restore(&mut self.store, checkpoint)?;

        info!(path, slot, perms = %format!("{:o}", perms), "Created file");
        Ok(Handle::from_slot(slot))
    }

    /// Read from `offset` into `buf`, clamped to the file's logical size.
    ///
    /// Returns the number of bytes read; zero at or past end of file.
    pub fn read(&mut self, handle: Handle, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let slot = self.slot_of(handle)?;
        let size = self.meta.table().get(slot).map(|e| e.size as u64).unwrap_or(0);

        if offset >= size {
            return Ok(0);
        }

        let len = (buf.len() as u64).min(size - offset) as usize;
        let position = self.geometry().region_of(slot) + offset;
        self.store.read_at(position, &mut buf[..len])?;

        debug!(slot, offset, len, "read");
        Ok(len)
    }

    /// Write `data` at `offset`, extending the logical size if needed.
    ///
    /// A write that does not fit entirely inside the slot's region is
    /// rejected without touching the store.
    pub fn write(&mut self, handle: Handle, offset: u64, data: &[u8]) -> Result<usize> {
        let slot = self.slot_of(handle)?;
        let end = self.geometry().check_range(offset, data.len() as u64)?;

        let position = self.geometry().region_of(slot) + offset;
        let written = self.store.write_at(position, data)?;
        if written != data.len() {
            return Err(SlotFsError::ShortWrite {
                expected: data.len(),
                written,
            });
        }

        let checkpoint = self.meta.checkpoint(slot);
        let entry = self.entry_mut(slot)?;
        if end > entry.size as u64 {
            entry.size = end as u32;
        }
        entry.mtime = now_secs();
        self.meta.commit_or_restore(&mut self.store, checkpoint)?;

        debug!(slot, offset, len = written, "write");
        Ok(written)
    }

    /// Remove a file. Its region is released but not erased.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let slot = self.meta.table().resolve(path)?;

        let checkpoint = self.meta.checkpoint(slot);
        self.meta.table_mut().clear(slot);
        let superblock = self.meta.superblock_mut();
        superblock.file_count = superblock.file_count.saturating_sub(1);
        self.meta.commit_or_restore(&mut self.store, checkpoint)?;

        info!(path, slot, "Removed file");
        Ok(())
    }

    /// Set a file's logical size. Growing does not zero the exposed bytes.
    pub fn truncate(&mut self, path: &str, new_size: u64) -> Result<()> {
        let slot = self.meta.table().resolve(path)?;
        self.geometry().check_range(0, new_size)?;

        let checkpoint = self.meta.checkpoint(slot);
        let entry = self.entry_mut(slot)?;
        entry.size = new_size as u32;
        entry.mtime = now_secs();
        self.meta.commit_or_restore(&mut self.store, checkpoint)?;

        debug!(path, slot, new_size, "truncate");
        Ok(())
    }

    /// Closing a handle has no effect on the engine
    pub fn release(&self, _handle: Handle) -> Result<()> {
        Ok(())
    }

    /// Persist metadata and make the store durable
    pub fn flush(&mut self) -> Result<()> {
        self.meta.sync(&mut self.store)?;
        self.store.sync_all()
    }
}
