//! Error types for slotfs operations
//!
//! Every variant maps to exactly one POSIX errno through
//! [`SlotFsError::to_errno`]. The match is exhaustive, so a new variant does
//! not compile until its errno is chosen.

use std::os::raw::c_int;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlotFsError {
    #[error("No such file: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("No free slot: all {max_files} file table entries are in use")]
    NoFreeSlot { max_files: usize },

    #[error("Region full: byte range ends at {end}, region capacity is {capacity}")]
    RegionFull { end: u64, capacity: u64 },

    #[error("Bad file handle: {0}")]
    BadHandle(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Short write: expected {expected} bytes, store accepted {written}")]
    ShortWrite { expected: usize, written: usize },

    #[error("Invalid magic number in superblock: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Backing store has wrong size: expected {expected} bytes, found {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("File name too long: {0}")]
    NameTooLong(String),

    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SlotFsError {
    /// POSIX errno reported to the host runtime for this error.
    pub fn to_errno(&self) -> c_int {
        match self {
            SlotFsError::NotFound(_) => libc::ENOENT,
            SlotFsError::NotADirectory(_) => libc::ENOTDIR,
            SlotFsError::NoFreeSlot { .. } => libc::ENOSPC,
            SlotFsError::RegionFull { .. } => libc::ENOSPC,
            SlotFsError::BadHandle(_) => libc::EBADF,
            SlotFsError::Io(_) => libc::EIO,
            SlotFsError::ShortWrite { .. } => libc::EIO,
            SlotFsError::InvalidMagic(_) => libc::EIO,
            SlotFsError::SizeMismatch { .. } => libc::EIO,
            SlotFsError::NameTooLong(_) => libc::ENAMETOOLONG,
            SlotFsError::InvalidName(_) => libc::EINVAL,
            SlotFsError::InvalidGeometry(_) => libc::EINVAL,
            SlotFsError::Config(_) => libc::EINVAL,
        }
    }

    /// True for either flavour of capacity exhaustion.
    pub fn is_no_space(&self) -> bool {
        matches!(
            self,
            SlotFsError::NoFreeSlot { .. } | SlotFsError::RegionFull { .. }
        )
    }

    /// True when the store is not a slotfs store at all and may be
    /// reformatted: wrong length or wrong magic.
    pub fn is_validation_failure(&self) -> bool {
        matches!(
            self,
            SlotFsError::InvalidMagic(_) | SlotFsError::SizeMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SlotFsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_mapping() {
        assert_eq!(SlotFsError::NotFound("/a".into()).to_errno(), libc::ENOENT);
        assert_eq!(
            SlotFsError::NotADirectory("/a".into()).to_errno(),
            libc::ENOTDIR
        );
        assert_eq!(
            SlotFsError::NoFreeSlot { max_files: 64 }.to_errno(),
            libc::ENOSPC
        );
        assert_eq!(
            SlotFsError::RegionFull {
                end: 20_000,
                capacity: 16_334
            }
            .to_errno(),
            libc::ENOSPC
        );
        assert_eq!(SlotFsError::BadHandle(99).to_errno(), libc::EBADF);
        assert_eq!(
            SlotFsError::ShortWrite {
                expected: 10,
                written: 3
            }
            .to_errno(),
            libc::EIO
        );
    }

    #[test]
    fn test_classification() {
        assert!(SlotFsError::NoFreeSlot { max_files: 1 }.is_no_space());
        assert!(!SlotFsError::BadHandle(0).is_no_space());
        assert!(SlotFsError::InvalidMagic(0).is_validation_failure());
        assert!(SlotFsError::SizeMismatch {
            expected: 1,
            actual: 2
        }
        .is_validation_failure());
        assert!(!SlotFsError::NotFound("x".into()).is_validation_failure());
    }
}
