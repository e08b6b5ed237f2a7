//! Store geometry and the static region allocator
//!
//! The backing store is split into a metadata region (superblock followed by
//! the file table) and a data region of `max_files` equally sized regions.
//! A slot's region is a pure function of its index:
//!
//! ```text
//! ┌──────────────┬───────────────────────────┬──────────┬──────────┬─────┐
//! │ Superblock   │ File table                │ Region 0 │ Region 1 │ ... │
//! │ 16 bytes     │ max_files × 49 bytes      │ cap      │ cap      │     │
//! └──────────────┴───────────────────────────┴──────────┴──────────┴─────┘
//! ```

use crate::core::catalog::ENTRY_SIZE;
use crate::core::error::{Result, SlotFsError};
use crate::core::header::SUPERBLOCK_SIZE;

/// Default backing store size (1 MiB)
pub const DEFAULT_TOTAL_SIZE: u64 = 1024 * 1024;

/// Default file table capacity
pub const DEFAULT_MAX_FILES: usize = 64;

/// Fixed dimensions of a formatted store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    total_size: u64,
    max_files: usize,
}

impl Geometry {
    /// Build a geometry, rejecting layouts that cannot hold at least one byte
    /// per region or whose offsets overflow the 32-bit on-disk fields.
    pub fn new(total_size: u64, max_files: usize) -> Result<Self> {
        if max_files == 0 {
            return Err(SlotFsError::InvalidGeometry(
                "max_files must be at least 1".to_string(),
            ));
        }
        if total_size > u32::MAX as u64 {
            return Err(SlotFsError::InvalidGeometry(format!(
                "total size {} does not fit 32-bit offsets",
                total_size
            )));
        }

        let meta_size = (ENTRY_SIZE as u64)
            .checked_mul(max_files as u64)
            .and_then(|table| table.checked_add(SUPERBLOCK_SIZE as u64))
            .ok_or_else(|| {
                SlotFsError::InvalidGeometry(format!("{} slots overflow the file table", max_files))
            })?;

        if total_size <= meta_size {
            return Err(SlotFsError::InvalidGeometry(format!(
                "total size {} leaves no room after {} bytes of metadata",
                total_size, meta_size
            )));
        }

        let geometry = Geometry {
            total_size,
            max_files,
        };

        if geometry.region_capacity() == 0 {
            return Err(SlotFsError::InvalidGeometry(format!(
                "{} slots leave zero bytes per region",
                max_files
            )));
        }

        Ok(geometry)
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn max_files(&self) -> usize {
        self.max_files
    }

    /// Size of the superblock plus the whole file table
    pub fn meta_size(&self) -> u64 {
        SUPERBLOCK_SIZE as u64 + ENTRY_SIZE as u64 * self.max_files as u64
    }

    /// First byte of the data region
    pub fn data_offset(&self) -> u64 {
        self.meta_size()
    }

    /// Bytes available to each slot, fixed for the life of the store
    pub fn region_capacity(&self) -> u64 {
        (self.total_size - self.meta_size()) / self.max_files as u64
    }

    /// Absolute store offset of a slot's region
    pub fn region_of(&self, slot: usize) -> u64 {
        self.data_offset() + slot as u64 * self.region_capacity()
    }

    /// Check that `[offset, offset + len)` fits inside a region.
    ///
    /// Returns the end offset (relative to the region) on success.
    pub fn check_range(&self, offset: u64, len: u64) -> Result<u64> {
        let capacity = self.region_capacity();
        match offset.checked_add(len) {
            Some(end) if end <= capacity => Ok(end),
            Some(end) => Err(SlotFsError::RegionFull { end, capacity }),
            None => Err(SlotFsError::RegionFull {
                end: u64::MAX,
                capacity,
            }),
        }
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Geometry {
            total_size: DEFAULT_TOTAL_SIZE,
            max_files: DEFAULT_MAX_FILES,
        }
    }
}
