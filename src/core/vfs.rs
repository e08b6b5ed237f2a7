//! Host runtime callback contract
//!
//! [`FsOps`] is the fixed set of calls a host runtime (a FUSE session, a test
//! harness) makes into the engine. [`SharedSlotFs`] implements it over one
//! [`SlotFs`] guarded by a single exclusive lock, held for the whole of each
//! call so that no two operations interleave their read-modify-persist steps.

use crate::core::error::Result;
use crate::core::io::{BackingStore, FileStore};
use crate::core::slotfs::{DirEntry, FileAttr, FsStats, Handle, SlotFs};
use parking_lot::{Mutex, MutexGuard};

/// Filesystem callbacks, one per host request
pub trait FsOps: Send + Sync {
    fn getattr(&self, path: &str) -> Result<FileAttr>;

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>>;

    /// `flags` are POSIX open flags; `O_CREAT` and `O_TRUNC` are honoured
    fn open(&self, path: &str, flags: i32) -> Result<Handle>;

    fn create(&self, path: &str, perms: u32) -> Result<Handle>;

    /// Read up to `size` bytes; the returned buffer's length is the byte count
    fn read(&self, handle: Handle, offset: u64, size: u32) -> Result<Vec<u8>>;

    fn write(&self, handle: Handle, offset: u64, data: &[u8]) -> Result<usize>;

    fn truncate(&self, path: &str, new_size: u64) -> Result<()>;

    fn unlink(&self, path: &str) -> Result<()>;

    fn release(&self, handle: Handle) -> Result<()>;
}

/// Thread-safe wrapper around a [`SlotFs`]
pub struct SharedSlotFs<S: BackingStore = FileStore> {
    inner: Mutex<SlotFs<S>>,
}

impl<S: BackingStore> SharedSlotFs<S> {
    pub fn new(fs: SlotFs<S>) -> Self {
        SharedSlotFs {
            inner: Mutex::new(fs),
        }
    }

    /// Exclusive access for multi-step work outside the callback contract
    pub fn lock(&self) -> MutexGuard<'_, SlotFs<S>> {
        self.inner.lock()
    }

    pub fn into_inner(self) -> SlotFs<S> {
        self.inner.into_inner()
    }

    pub fn stats(&self) -> FsStats {
        self.inner.lock().stats()
    }

    pub fn lookup(&self, path: &str) -> Result<(Handle, FileAttr)> {
        self.inner.lock().lookup(path)
    }

    pub fn attr_of(&self, handle: Handle) -> Result<FileAttr> {
        self.inner.lock().attr_of(handle)
    }

    pub fn name_of(&self, handle: Handle) -> Result<String> {
        self.inner.lock().name_of(handle).map(str::to_string)
    }

    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }
}

impl<S: BackingStore + Send> FsOps for SharedSlotFs<S> {
    fn getattr(&self, path: &str) -> Result<FileAttr> {
        self.inner.lock().getattr(path)
    }

    fn readdir(&self, path: &str) -> Result<Vec<DirEntry>> {
        self.inner.lock().readdir(path)
    }

    fn open(&self, path: &str, flags: i32) -> Result<Handle> {
        self.inner.lock().open(path, flags)
    }

    fn create(&self, path: &str, perms: u32) -> Result<Handle> {
        self.inner.lock().create(path, perms)
    }

    fn read(&self, handle: Handle, offset: u64, size: u32) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; size as usize];
        let n = self.inner.lock().read(handle, offset, &mut buf)?;
        buf.truncate(n);
        Ok(buf)
    }

    fn write(&self, handle: Handle, offset: u64, data: &[u8]) -> Result<usize> {
        self.inner.lock().write(handle, offset, data)
    }

    fn truncate(&self, path: &str, new_size: u64) -> Result<()> {
        self.inner.lock().truncate(path, new_size)
    }

    fn unlink(&self, path: &str) -> Result<()> {
        self.inner.lock().unlink(path)
    }

    fn release(&self, handle: Handle) -> Result<()> {
        self.inner.lock().release(handle)
    }
}
