//! File table and name resolution
//!
//! The file table is a fixed array of slots. A slot's index is the file's
//! identity for its whole life: it selects the data region and doubles as the
//! handle returned to the host runtime. Lookups and allocation are linear
//! scans, which is fine at the small fixed capacities this format uses.

use crate::core::error::{Result, SlotFsError};
use crate::core::header::read_u32;
use std::collections::HashSet;
use tracing::warn;

/// Length of the on-disk name buffer, including the NUL terminator
pub const NAME_LEN: usize = 32;

/// Longest storable name in bytes
pub const MAX_NAME_BYTES: usize = NAME_LEN - 1;

/// On-disk size of one file table entry: used + name + start + size + perms + mtime
pub const ENTRY_SIZE: usize = 1 + NAME_LEN + 4 + 4 + 4 + 4;

/// One slot of the file table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    /// Slot is occupied
    pub used: bool,

    name: [u8; NAME_LEN],

    /// Mirror of the slot's region offset; the region formula is authoritative
    pub start: u32,

    /// Logical file length in bytes
    pub size: u32,

    /// Permission bits, opaque to the engine
    pub perms: u32,

    /// Last modification time (Unix seconds)
    pub mtime: u32,
}

impl FileEntry {
    /// An unused, all-zero slot
    pub const fn empty() -> Self {
        FileEntry {
            used: false,
            name: [0; NAME_LEN],
            start: 0,
            size: 0,
            perms: 0,
            mtime: 0,
        }
    }

    /// Stored name bytes, up to the first NUL
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_LEN);
        &self.name[..end]
    }

    /// Stored name as text
    pub fn name(&self) -> &str {
        std::str::from_utf8(self.name_bytes()).unwrap_or("")
    }

    fn set_name(&mut self, name: &str) {
        self.name = [0; NAME_LEN];
        self.name[..name.len()].copy_from_slice(name.as_bytes());
    }

    fn matches(&self, name: &str) -> bool {
        self.used && self.name_bytes() == name.as_bytes()
    }

    fn write_to(&self, out: &mut [u8]) {
        out[0] = self.used as u8;
        out[1..1 + NAME_LEN].copy_from_slice(&self.name);
        let mut offset = 1 + NAME_LEN;
        for field in [self.start, self.size, self.perms, self.mtime] {
            out[offset..offset + 4].copy_from_slice(&field.to_le_bytes());
            offset += 4;
        }
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut name = [0u8; NAME_LEN];
        name.copy_from_slice(&bytes[1..1 + NAME_LEN]);
        let base = 1 + NAME_LEN;

        FileEntry {
            used: bytes[0] != 0,
            name,
            start: read_u32(bytes, base),
            size: read_u32(bytes, base + 4),
            perms: read_u32(bytes, base + 8),
            mtime: read_u32(bytes, base + 12),
        }
    }
}

impl Default for FileEntry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Strip the single leading separator of a root-relative path
pub fn normalize(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

/// The root directory is the only directory and is never a slot
pub fn is_root(path: &str) -> bool {
    path == "/" || path.is_empty()
}

/// Check that a normalized name can be stored in a slot.
///
/// Names with a further separator would need a parent directory, which the
/// flat namespace never has.
pub fn validate_name(name: &str) -> Result<()> {
    if name.contains('/') {
        return Err(SlotFsError::NotFound(name.to_string()));
    }
    if name.is_empty() || name == "." || name == ".." || name.contains('\0') {
        return Err(SlotFsError::InvalidName(name.to_string()));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(SlotFsError::NameTooLong(name.to_string()));
    }
    Ok(())
}

/// Fixed-capacity file table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTable {
    entries: Vec<FileEntry>,
}

impl FileTable {
    /// Create a table of `max_files` unused slots
    pub fn new(max_files: usize) -> Self {
        FileTable {
            entries: vec![FileEntry::empty(); max_files],
        }
    }

    /// Number of slots, used or not
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Occupied slot at `slot`, if any
    pub fn get(&self, slot: usize) -> Option<&FileEntry> {
        self.entries.get(slot).filter(|e| e.used)
    }

    pub(crate) fn get_mut(&mut self, slot: usize) -> Option<&mut FileEntry> {
        self.entries.get_mut(slot).filter(|e| e.used)
    }

    /// Map a path to its slot index.
    ///
    /// First match wins; uniqueness is maintained by [`FileTable::insert`]'s
    /// callers, not rechecked here.
    pub fn resolve(&self, path: &str) -> Result<usize> {
        let name = normalize(path);
        if name.is_empty() {
            return Err(SlotFsError::NotFound(path.to_string()));
        }
        self.entries
            .iter()
            .position(|e| e.matches(name))
            .ok_or_else(|| SlotFsError::NotFound(path.to_string()))
    }

    /// Lowest-index unoccupied slot
    pub fn allocate_slot(&self) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| !e.used)
            .ok_or(SlotFsError::NoFreeSlot {
                max_files: self.entries.len(),
            })
    }

    /// Occupy `slot` with a fresh zero-length file
    pub(crate) fn insert(&mut self, slot: usize, name: &str, start: u32, perms: u32, mtime: u32) {
        let entry = &mut self.entries[slot];
        *entry = FileEntry::empty();
        entry.used = true;
        entry.set_name(name);
        entry.start = start;
        entry.perms = perms;
        entry.mtime = mtime;
    }

    /// Return `slot` to its unused zero state
    pub(crate) fn clear(&mut self, slot: usize) {
        self.entries[slot] = FileEntry::empty();
    }

    /// Raw copy of `slot`, occupied or not
    pub(crate) fn entry(&self, slot: usize) -> FileEntry {
        self.entries[slot]
    }

    /// Put back an entry previously taken with [`FileTable::entry`]
    pub(crate) fn restore(&mut self, slot: usize, entry: FileEntry) {
        self.entries[slot] = entry;
    }

    /// Occupied slots in index order
    pub fn iter_used(&self) -> impl Iterator<Item = (usize, &FileEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.used)
    }

    pub fn used_count(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }

    /// Serialize the whole table, slot 0 first
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; self.entries.len() * ENTRY_SIZE];
        for (entry, chunk) in self.entries.iter().zip(bytes.chunks_exact_mut(ENTRY_SIZE)) {
            entry.write_to(chunk);
        }
        bytes
    }

    /// Deserialize a table of `max_files` slots
    pub fn from_bytes(bytes: &[u8], max_files: usize) -> Result<Self> {
        if bytes.len() < max_files * ENTRY_SIZE {
            return Err(SlotFsError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for file table",
            )));
        }

        let entries = bytes
            .chunks_exact(ENTRY_SIZE)
            .take(max_files)
            .map(FileEntry::read_from)
            .collect();

        Ok(FileTable { entries })
    }

    /// Repair slots of a table read back from disk, one slot at a time.
    ///
    /// An oversized entry is clamped to the region capacity. An occupied slot
    /// whose name is empty, not UTF-8, or a repeat of an earlier slot's name
    /// cannot be addressed and is released; its region bytes are left alone.
    /// Returns the number of slots changed.
    pub fn repair(&mut self, region_capacity: u64) -> usize {
        let mut seen: HashSet<Vec<u8>> = HashSet::new();
        let mut repaired = 0;

        for slot in 0..self.entries.len() {
            let entry = self.entries[slot];
            if !entry.used {
                continue;
            }

            let name = entry.name_bytes();
            let problem = if name.is_empty() {
                Some("occupied but unnamed")
            } else if std::str::from_utf8(name).is_err() {
                Some("name is not valid UTF-8")
            } else if !seen.insert(name.to_vec()) {
                Some("duplicate name")
            } else {
                None
            };

            if let Some(reason) = problem {
                warn!(
                    slot,
                    reason,
                    name = %String::from_utf8_lossy(name),
                    "Releasing unusable file table slot"
                );
                self.entries[slot] = FileEntry::empty();
                repaired += 1;
                continue;
            }

            if entry.size as u64 > region_capacity {
                warn!(
                    slot,
                    size = entry.size,
                    region_capacity,
                    "File size exceeds its region, clamping"
                );
                self.entries[slot].size = region_capacity as u32;
                repaired += 1;
            }
        }

        repaired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_size_matches_packed_layout() {
        assert_eq!(ENTRY_SIZE, 49);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/test.txt"), "test.txt");
        assert_eq!(normalize("test.txt"), "test.txt");
        assert_eq!(normalize("/"), "");
        assert_eq!(normalize("//x"), "/x");
        assert!(is_root("/"));
        assert!(!is_root("/a"));
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("test.txt").is_ok());
        assert!(validate_name(&"a".repeat(MAX_NAME_BYTES)).is_ok());
        assert!(matches!(
            validate_name(&"a".repeat(NAME_LEN)),
            Err(SlotFsError::NameTooLong(_))
        ));
        assert!(matches!(validate_name(""), Err(SlotFsError::InvalidName(_))));
        assert!(matches!(validate_name(".."), Err(SlotFsError::InvalidName(_))));
        assert!(matches!(
            validate_name("a\0b"),
            Err(SlotFsError::InvalidName(_))
        ));
        assert!(matches!(
            validate_name("dir/file"),
            Err(SlotFsError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_and_allocate() {
        let mut table = FileTable::new(4);
        assert_eq!(table.allocate_slot().unwrap(), 0);

        table.insert(0, "a.txt", 0, 0o644, 1);
        table.insert(1, "b.txt", 0, 0o644, 1);

        assert_eq!(table.resolve("/a.txt").unwrap(), 0);
        assert_eq!(table.resolve("b.txt").unwrap(), 1);
        assert!(matches!(
            table.resolve("/c.txt"),
            Err(SlotFsError::NotFound(_))
        ));
        assert!(table.resolve("/").is_err());
        assert_eq!(table.allocate_slot().unwrap(), 2);

        table.clear(0);
        assert!(table.resolve("/a.txt").is_err());
        assert_eq!(table.allocate_slot().unwrap(), 0);
        assert_eq!(table.used_count(), 1);
    }

    #[test]
    fn test_name_prefix_does_not_match() {
        let mut table = FileTable::new(2);
        table.insert(0, "abc", 0, 0o644, 0);
        assert!(table.resolve("/ab").is_err());
        assert!(table.resolve("/abcd").is_err());
    }

    #[test]
    fn test_full_table() {
        let mut table = FileTable::new(2);
        table.insert(0, "a", 0, 0, 0);
        table.insert(1, "b", 0, 0, 0);
        assert!(matches!(
            table.allocate_slot(),
            Err(SlotFsError::NoFreeSlot { max_files: 2 })
        ));
    }

    #[test]
    fn test_entry_layout_offsets() {
        let mut table = FileTable::new(2);
        table.insert(1, "hello", 0x0102_0304, 0o644, 0x0A0B_0C0D);
        table.get_mut(1).unwrap().size = 5;

        let bytes = table.to_bytes();
        assert_eq!(bytes.len(), 2 * ENTRY_SIZE);
        assert!(bytes[..ENTRY_SIZE].iter().all(|&b| b == 0));

        let e = &bytes[ENTRY_SIZE..];
        assert_eq!(e[0], 1);
        assert_eq!(&e[1..6], b"hello");
        assert_eq!(e[6], 0);
        assert_eq!(&e[33..37], &0x0102_0304u32.to_le_bytes());
        assert_eq!(&e[37..41], &5u32.to_le_bytes());
        assert_eq!(&e[41..45], &0o644u32.to_le_bytes());
        assert_eq!(&e[45..49], &0x0A0B_0C0Du32.to_le_bytes());

        let decoded = FileTable::from_bytes(&bytes, 2).unwrap();
        assert_eq!(decoded, table);
        assert_eq!(decoded.get(1).unwrap().name(), "hello");
    }

    #[test]
    fn test_repair_clamps_oversized_entry() {
        let mut table = FileTable::new(2);
        table.insert(0, "big", 0, 0, 0);
        table.get_mut(0).unwrap().size = 101;

        assert_eq!(table.repair(101), 0);
        assert_eq!(table.repair(100), 1);
        assert_eq!(table.get(0).unwrap().size, 100);
    }

    #[test]
    fn test_repair_releases_later_duplicate() {
        let mut table = FileTable::new(3);
        table.insert(0, "same", 0, 0, 0);
        table.insert(2, "same", 0, 0, 0);

        assert_eq!(table.repair(100), 1);
        assert_eq!(table.resolve("/same").unwrap(), 0);
        assert!(table.get(2).is_none());
    }

    #[test]
    fn test_repair_releases_only_the_bad_name() {
        let mut table = FileTable::new(3);
        table.insert(0, "keep", 0, 0o644, 0);
        table.insert(1, "cafe", 0, 0o644, 0);
        table.insert(2, "also", 0, 0o644, 0);

        let mut bytes = table.to_bytes();
        // Latin-1 e-acute in place of the final 'e'
        bytes[ENTRY_SIZE + 1 + 3] = 0xE9;
        let mut table = FileTable::from_bytes(&bytes, 3).unwrap();

        assert_eq!(table.repair(100), 1);
        assert_eq!(table.used_count(), 2);
        assert_eq!(table.resolve("/keep").unwrap(), 0);
        assert_eq!(table.resolve("/also").unwrap(), 2);
    }

    #[test]
    fn test_unterminated_name_is_kept() {
        let mut bytes = vec![0u8; ENTRY_SIZE];
        bytes[0] = 1;
        for b in &mut bytes[1..1 + NAME_LEN] {
            *b = b'x';
        }
        let mut table = FileTable::from_bytes(&bytes, 1).unwrap();

        assert_eq!(table.repair(10), 0);
        assert_eq!(table.get(0).unwrap().name().len(), NAME_LEN);
        assert_eq!(table.resolve(&"x".repeat(NAME_LEN)).unwrap(), 0);
    }
}
