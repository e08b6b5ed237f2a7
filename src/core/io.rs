//! Backing store I/O
//!
//! The engine addresses its store purely by byte offset. [`FileStore`] keeps
//! the store in a single host file; [`MemoryStore`] keeps it in a `Vec<u8>`
//! for tests and scratch filesystems.

use crate::core::error::Result;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A fixed-length, byte-addressed container
pub trait BackingStore {
    /// Current length of the store in bytes
    fn len(&mut self) -> Result<u64>;

    /// Fill `buf` from `offset`. Reading past the end is an error.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` at `offset`, returning how many bytes the store accepted.
    ///
    /// A count smaller than `data.len()` is a short write; the caller decides
    /// whether that is fatal.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize>;

    /// Discard all contents and resize to `size` zero bytes
    fn reset(&mut self, size: u64) -> Result<()>;

    /// Push buffered writes to the store
    fn flush(&mut self) -> Result<()>;

    /// Make all writes durable
    fn sync_all(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Disk-backed store
pub struct FileStore {
    file: File,
    path: PathBuf,
}

impl FileStore {
    /// Create (or overwrite) a store file of exactly `size` zero bytes
    pub fn create<P: AsRef<Path>>(path: P, size: u64) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(size)?;

        Ok(FileStore {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open an existing store file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        Ok(FileStore {
            file,
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Get file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BackingStore for FileStore {
    fn len(&mut self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        self.file.seek(SeekFrom::Start(offset))?;

        let mut written = 0;
        while written < data.len() {
            match self.file.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(written)
    }

    fn reset(&mut self, size: u64) -> Result<()> {
        self.file.set_len(0)?;
        self.file.set_len(size)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        Ok(())
    }

    fn sync_all(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

/// In-memory store
///
/// Behaves like a file that cannot grow: writes past the end are accepted
/// only up to the current length.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl MemoryStore {
    pub fn new(size: u64) -> Self {
        MemoryStore {
            bytes: vec![0u8; size as usize],
        }
    }

    /// Wrap existing bytes, e.g. a captured image of another store
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        MemoryStore { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl BackingStore for MemoryStore {
    fn len(&mut self) -> Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let start = offset as usize;
        let end = start.checked_add(buf.len()).filter(|&e| e <= self.bytes.len());
        match end {
            Some(end) => {
                buf.copy_from_slice(&self.bytes[start..end]);
                Ok(())
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "read past end of memory store",
            )
            .into()),
        }
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> Result<usize> {
        let start = offset as usize;
        if start >= self.bytes.len() {
            return Ok(0);
        }
        let n = data.len().min(self.bytes.len() - start);
        self.bytes[start..start + n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    fn reset(&mut self, size: u64) -> Result<()> {
        self.bytes.clear();
        self.bytes.resize(size as usize, 0);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
