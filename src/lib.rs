//! # slotfs - Fixed-Slot Single-File Filesystem Engine
//!
//! `slotfs` is the storage engine behind a flat userspace filesystem. All
//! metadata and file contents live in one fixed-size backing store:
//!
//! - **Fixed file table** of `max_files` slots (64 by default)
//! - **Static regions**: slot `n` owns one equal-sized byte range, so a file
//!   can never grow past `region_capacity`
//! - **Write-through metadata**: the superblock and file table are rewritten
//!   after every mutation
//! - **Single flat root directory**
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slotfs::{SlotFsBuilder, Result};
//!
//! # fn main() -> Result<()> {
//! // Opens filesys.db, formatting it if it is missing or invalid
//! let mut fs = SlotFsBuilder::new().path("filesys.db").build()?;
//!
//! let handle = fs.create("/test.txt", 0o644)?;
//! fs.write(handle, 0, b"Hello")?;
//!
//! let mut buf = [0u8; 10];
//! let n = fs.read(handle, 0, &mut buf)?;
//! assert_eq!(&buf[..n], b"Hello");
//! # Ok(())
//! # }
//! ```
//!
//! ## Sharing Between Threads
//!
//! Host runtimes call in from several threads. Wrap the engine in
//! [`SharedSlotFs`], which serializes every callback of the [`FsOps`]
//! contract behind one lock:
//!
//! ```rust,no_run
//! use slotfs::{FsOps, SharedSlotFs, SlotFsBuilder};
//! use std::sync::Arc;
//!
//! # fn main() -> slotfs::Result<()> {
//! let fs = Arc::new(SharedSlotFs::new(SlotFsBuilder::new().build()?));
//! let h = fs.create("/log.txt", 0o644)?;
//! fs.write(h, 0, b"shared")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ Superblock (16 bytes)                       │
//! │  - magic 0xDEADBEEF, version 1              │
//! │  - last_alloc, file_count                   │
//! ├─────────────────────────────────────────────┤
//! │ File table (max_files × 49 bytes)           │
//! │  - used, name[32], start, size, perms, mtime│
//! ├─────────────────────────────────────────────┤
//! │ Data regions (max_files × region_capacity)  │
//! └─────────────────────────────────────────────┘
//! ```

pub mod core;

pub use crate::core::{
    catalog::{FileEntry, FileTable, MAX_NAME_BYTES, NAME_LEN},
    config::{FsConfig, ReformatPolicy, SlotFsBuilder, DEFAULT_STORE_PATH},
    error::{Result, SlotFsError},
    header::{Superblock, MAGIC, VERSION},
    io::{BackingStore, FileStore, MemoryStore},
    layout::{Geometry, DEFAULT_MAX_FILES, DEFAULT_TOTAL_SIZE},
    slotfs::{DirEntry, FileAttr, FileKind, FsStats, Handle, SlotFs},
    vfs::{FsOps, SharedSlotFs},
};

#[cfg(feature = "fuse")]
pub use crate::core::fuse::{mount, MountOptions, SlotFuse};
