//! FUSE adapter
//!
//! Translates the inode-based requests of a `fuser` session into the
//! path/handle callbacks of [`FsOps`]. Inode 1 is the root directory and the
//! file in slot `n` is inode `n + 2`. The FUSE file handle is the engine
//! handle, so read/write/release never re-resolve names.

use crate::core::error::{Result, SlotFsError};
use crate::core::io::BackingStore;
use crate::core::slotfs::{FileAttr, FileKind, Handle};
use crate::core::vfs::{FsOps, SharedSlotFs};
use fuser::{
    FileType, Filesystem, KernelConfig, MountOption, ReplyAttr, ReplyCreate, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use std::ffi::OsStr;
use std::os::raw::c_int;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, trace, warn};

/// Attributes change on every write, so the kernel may only cache them briefly
const ATTR_TTL: Duration = Duration::from_secs(1);

const ROOT_INO: u64 = 1;
const FIRST_FILE_INO: u64 = 2;
const BLOCK_SIZE: u32 = 512;

#[derive(Debug, Clone, Default)]
pub struct MountOptions {
    pub allow_other: bool,
    pub auto_unmount: bool,
}

fn ino_of(handle: Handle) -> u64 {
    handle.0 + FIRST_FILE_INO
}

fn handle_of(ino: u64) -> Option<Handle> {
    ino.checked_sub(FIRST_FILE_INO).map(Handle)
}

fn to_fuser_file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::RegularFile => FileType::RegularFile,
        FileKind::Directory => FileType::Directory,
    }
}

fn to_file_attr(ino: u64, attr: &FileAttr, req: &Request<'_>) -> fuser::FileAttr {
    let mtime = UNIX_EPOCH + Duration::from_secs(attr.mtime as u64);
    fuser::FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: to_fuser_file_type(attr.kind),
        perm: (attr.perms & 0o7777) as u16,
        nlink: attr.nlink,
        uid: req.uid(),
        gid: req.gid(),
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Kernel offsets are signed; a negative one is a bad request.
fn kernel_offset(offset: i64) -> std::result::Result<u64, c_int> {
    u64::try_from(offset).map_err(|_| libc::EINVAL)
}

/// Log a failed request and pick the errno for the reply.
///
/// ENOENT is routine (the kernel probes for names) and stays at trace level.
fn log_and_errno(op: &'static str, ino: u64, error: &SlotFsError) -> c_int {
    let errno = error.to_errno();
    if errno == libc::ENOENT {
        trace!(op, ino, errno, error = %error, "FUSE op returned ENOENT");
    } else {
        warn!(op, ino, errno, error = %error, "FUSE op failed");
    }
    errno
}

/// `fuser::Filesystem` over a shared slot filesystem
pub struct SlotFuse<S: BackingStore + Send + 'static> {
    fs: Arc<SharedSlotFs<S>>,
}

impl<S: BackingStore + Send + 'static> SlotFuse<S> {
    pub fn new(fs: Arc<SharedSlotFs<S>>) -> Self {
        SlotFuse { fs }
    }

    fn path_of(&self, ino: u64) -> Result<String> {
        if ino == ROOT_INO {
            return Ok("/".to_string());
        }
        handle_of(ino)
            .and_then(|h| self.fs.name_of(h).ok())
            .map(|name| format!("/{}", name))
            .ok_or_else(|| SlotFsError::NotFound(format!("inode {}", ino)))
    }

    fn attr_of_ino(&self, ino: u64) -> Result<FileAttr> {
        if ino == ROOT_INO {
            return self.fs.getattr("/");
        }
        handle_of(ino)
            .and_then(|h| self.fs.attr_of(h).ok())
            .ok_or_else(|| SlotFsError::NotFound(format!("inode {}", ino)))
    }

    /// Create a file and read its attributes without releasing the lock
    /// in between, so a concurrent unlink cannot slip into the gap.
    fn create_with_attr(&self, path: &str, perms: u32) -> Result<(Handle, FileAttr)> {
        let mut fs = self.fs.lock();
        let handle = fs.create(path, perms)?;
        Ok((handle, fs.attr_of(handle)?))
    }

    fn child_path(parent: u64, name: &OsStr) -> Result<String> {
        let name = name
            .to_str()
            .ok_or_else(|| SlotFsError::InvalidName(name.to_string_lossy().into_owned()))?;
        if parent != ROOT_INO {
            return Err(SlotFsError::NotFound(name.to_string()));
        }
        Ok(format!("/{}", name))
    }
}

impl<S: BackingStore + Send + 'static> Filesystem for SlotFuse<S> {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> std::result::Result<(), c_int> {
        let stats = self.fs.stats();
        info!(
            file_count = stats.file_count,
            last_alloc = stats.last_alloc,
            "slotfs mounted"
        );
        Ok(())
    }

    fn destroy(&mut self) {
        if let Err(e) = self.fs.flush() {
            warn!(error = %e, "Failed to flush backing store on unmount");
        }
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        match Self::child_path(parent, name).and_then(|path| self.fs.lookup(&path)) {
            Ok((handle, attr)) => {
                let ino = ino_of(handle);
                reply.entry(&ATTR_TTL, &to_file_attr(ino, &attr, req), 0)
            }
            Err(e) => reply.error(log_and_errno("lookup", parent, &e)),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.attr_of_ino(ino) {
            Ok(attr) => reply.attr(&ATTR_TTL, &to_file_attr(ino, &attr, req)),
            Err(e) => reply.error(log_and_errno("getattr", ino, &e)),
        }
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        _atime: Option<TimeOrNow>,
        _mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let result = match size {
            Some(size) => self
                .path_of(ino)
                .and_then(|path| self.fs.truncate(&path, size)),
            None => Ok(()),
        };

        match result.and_then(|()| self.attr_of_ino(ino)) {
            Ok(attr) => reply.attr(&ATTR_TTL, &to_file_attr(ino, &attr, req)),
            Err(e) => reply.error(log_and_errno("setattr", ino, &e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        match self.path_of(ino).and_then(|path| self.fs.open(&path, flags)) {
            Ok(handle) => reply.opened(handle.0, 0),
            Err(e) => reply.error(log_and_errno("open", ino, &e)),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let perms = mode & !umask & 0o7777;
        let result =
            Self::child_path(parent, name).and_then(|path| self.create_with_attr(&path, perms));

        match result {
            Ok((handle, attr)) => {
                let ino = ino_of(handle);
                reply.created(&ATTR_TTL, &to_file_attr(ino, &attr, req), 0, handle.0, 0)
            }
            Err(e) => reply.error(log_and_errno("create", parent, &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let offset = match kernel_offset(offset) {
            Ok(offset) => offset,
            Err(errno) => {
                warn!(op = "read", ino, offset, "Negative offset");
                reply.error(errno);
                return;
            }
        };
        match self.fs.read(Handle(fh), offset, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(log_and_errno("read", ino, &e)),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let offset = match kernel_offset(offset) {
            Ok(offset) => offset,
            Err(errno) => {
                warn!(op = "write", ino, offset, "Negative offset");
                reply.error(errno);
                return;
            }
        };
        match self.fs.write(Handle(fh), offset, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(log_and_errno("write", ino, &e)),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let entries = match self.path_of(ino).and_then(|path| self.fs.readdir(&path)) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(log_and_errno("readdir", ino, &e));
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (i, entry) in entries.iter().enumerate().skip(skip) {
            let entry_ino = entry.handle.map(ino_of).unwrap_or(ROOT_INO);
            let full = reply.add(
                entry_ino,
                (i + 1) as i64,
                to_fuser_file_type(entry.kind),
                &entry.name,
            );
            if full {
                break;
            }
        }
        reply.ok();
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        match Self::child_path(parent, name).and_then(|path| self.fs.unlink(&path)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(log_and_errno("unlink", parent, &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        match self.fs.release(Handle(fh)) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(log_and_errno("release", ino, &e)),
        }
    }
}

fn build_mount_options(options: &MountOptions) -> Vec<MountOption> {
    let mut opts = vec![
        MountOption::FSName("slotfs".to_owned()),
        MountOption::Subtype("slotfs".to_owned()),
        MountOption::DefaultPermissions,
    ];

    if options.allow_other {
        opts.push(MountOption::AllowOther);
    }
    if options.auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }

    opts
}

/// Mount `fs` at `mountpoint`, blocking until it is unmounted
pub fn mount<S: BackingStore + Send + 'static>(
    fs: Arc<SharedSlotFs<S>>,
    mountpoint: impl AsRef<Path>,
    options: &MountOptions,
) -> Result<()> {
    let mountpoint = mountpoint.as_ref();
    if mountpoint.as_os_str().is_empty() {
        return Err(SlotFsError::Config("mountpoint cannot be empty".to_owned()));
    }

    info!(mountpoint = %mountpoint.display(), "Mounting slotfs");
    fuser::mount2(SlotFuse::new(fs), mountpoint, &build_mount_options(options))?;
    Ok(())
}
