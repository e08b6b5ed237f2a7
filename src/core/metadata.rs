//! Metadata layer: the in-memory mirror of the superblock and file table
//!
//! Every mutation is written through with [`Metadata::commit`], which
//! recomputes the derived superblock fields and rewrites the whole metadata
//! region from offset 0. There is no journal: a crash between a data write
//! and the following commit leaves the table describing the previous state.

use crate::core::catalog::{FileEntry, FileTable};
use crate::core::error::{Result, SlotFsError};
use crate::core::header::{Superblock, SUPERBLOCK_SIZE, VERSION};
use crate::core::io::BackingStore;
use crate::core::layout::Geometry;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

/// Current time as the 32-bit Unix seconds stored in `mtime`
pub fn now_secs() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

/// Pre-mutation copy of the state one operation touches
#[derive(Debug, Clone, Copy)]
pub(crate) struct Checkpoint {
    slot: usize,
    superblock: Superblock,
    entry: FileEntry,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    geometry: Geometry,
    superblock: Superblock,
    table: FileTable,
}

impl Metadata {
    /// Metadata of a freshly formatted, empty store
    pub fn new(geometry: Geometry) -> Self {
        Metadata {
            geometry,
            superblock: Superblock::new(geometry.data_offset() as u32),
            table: FileTable::new(geometry.max_files()),
        }
    }

    /// Reinitialize `store` to exactly the geometry's total size, all zero,
    /// and persist empty metadata.
    pub fn format<S: BackingStore>(store: &mut S, geometry: Geometry) -> Result<Self> {
        store.reset(geometry.total_size())?;
        let metadata = Self::new(geometry);
        metadata.sync(store)?;
        debug!(
            total_size = geometry.total_size(),
            max_files = geometry.max_files(),
            region_capacity = geometry.region_capacity(),
            "Formatted backing store"
        );
        Ok(metadata)
    }

    /// Read and validate metadata from `store`.
    ///
    /// Fails with a validation error (see
    /// [`SlotFsError::is_validation_failure`]) only when the store length or
    /// magic is wrong. Damaged slots are repaired individually (see
    /// [`FileTable::repair`]) and derived superblock fields are recomputed
    /// rather than trusted; both repairs reach the store with the next
    /// commit.
    pub fn load<S: BackingStore>(store: &mut S, geometry: Geometry) -> Result<Self> {
        let actual = store.len()?;
        if actual != geometry.total_size() {
            return Err(SlotFsError::SizeMismatch {
                expected: geometry.total_size(),
                actual,
            });
        }

        let mut buffer = vec![0u8; geometry.meta_size() as usize];
        store.read_at(0, &mut buffer)?;

        let superblock = Superblock::from_bytes(&buffer)?;
        superblock.validate()?;
        if superblock.version != VERSION {
            warn!(
                version = superblock.version,
                expected = VERSION,
                "Unknown format version, reading with the current layout"
            );
        }

        let mut table = FileTable::from_bytes(&buffer[SUPERBLOCK_SIZE..], geometry.max_files())?;
        table.repair(geometry.region_capacity());

        let mut metadata = Metadata {
            geometry,
            superblock,
            table,
        };
        metadata.repair_derived_fields();
        Ok(metadata)
    }

    fn repair_derived_fields(&mut self) {
        let stored_count = self.superblock.file_count;
        let stored_last = self.superblock.last_alloc;

        self.superblock.file_count = self.table.used_count() as u32;
        self.recompute_last_alloc();

        if stored_count != self.superblock.file_count || stored_last != self.superblock.last_alloc {
            warn!(
                stored_file_count = stored_count,
                file_count = self.superblock.file_count,
                stored_last_alloc = stored_last,
                last_alloc = self.superblock.last_alloc,
                "Superblock disagreed with file table, using recomputed values"
            );
        }
    }

    /// Set `last_alloc` to the end of the furthest non-empty file region
    pub fn recompute_last_alloc(&mut self) {
        let geometry = self.geometry;
        let last = self
            .table
            .iter_used()
            .filter(|(_, e)| e.size > 0)
            .map(|(slot, e)| geometry.region_of(slot) + e.size as u64)
            .max()
            .unwrap_or(geometry.data_offset());
        self.superblock.last_alloc = last as u32;
    }

    /// Write the full superblock and file table at offset 0
    pub fn sync<S: BackingStore>(&self, store: &mut S) -> Result<()> {
        let mut bytes = Vec::with_capacity(self.geometry.meta_size() as usize);
        bytes.extend_from_slice(&self.superblock.to_bytes());
        bytes.extend_from_slice(&self.table.to_bytes());

        let written = store.write_at(0, &bytes)?;
        if written != bytes.len() {
            return Err(SlotFsError::ShortWrite {
                expected: bytes.len(),
                written,
            });
        }
        store.flush()
    }

    /// Recompute derived fields, then persist
    pub fn commit<S: BackingStore>(&mut self, store: &mut S) -> Result<()> {
        self.recompute_last_alloc();
        self.sync(store)
    }

    /// Record the superblock and one slot before mutating them
    pub(crate) fn checkpoint(&self, slot: usize) -> Checkpoint {
        Checkpoint {
            slot,
            superblock: self.superblock,
            entry: self.table.entry(slot),
        }
    }

    /// Commit, or roll the in-memory state back to `checkpoint` if the
    /// store rejects the write.
    ///
    /// The store itself may hold a partially written table afterwards; the
    /// next successful commit rewrites all of it.
    pub(crate) fn commit_or_restore<S: BackingStore>(
        &mut self,
        store: &mut S,
        checkpoint: Checkpoint,
    ) -> Result<()> {
        if let Err(e) = self.commit(store) {
            self.superblock = checkpoint.superblock;
            self.table.restore(checkpoint.slot, checkpoint.entry);
            warn!(slot = checkpoint.slot, error = %e, "Metadata commit failed, change rolled back");
            return Err(e);
        }
        Ok(())
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn superblock(&self) -> &Superblock {
        &self.superblock
    }

    pub(crate) fn superblock_mut(&mut self) -> &mut Superblock {
        &mut self.superblock
    }

    pub fn table(&self) -> &FileTable {
        &self.table
    }

    pub(crate) fn table_mut(&mut self) -> &mut FileTable {
        &mut self.table
    }
}
