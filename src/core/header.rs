use crate::core::error::{Result, SlotFsError};

pub const MAGIC: u32 = 0xDEAD_BEEF;
pub const VERSION: u32 = 1;

/// On-disk size of the superblock: four little-endian u32 fields
pub const SUPERBLOCK_SIZE: usize = 16;

/// Filesystem superblock (offset 0)
///
/// `last_alloc` and `file_count` are derived from the file table and are
/// recomputed after every mutation; they are persisted for inspection only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Superblock {
    /// Magic number: 0xDEADBEEF
    pub magic: u32,

    /// Format version
    pub version: u32,

    /// Highest byte offset occupied by any file's data
    pub last_alloc: u32,

    /// Number of occupied file table slots
    pub file_count: u32,
}

impl Superblock {
    /// Create a superblock for an empty store whose data starts at `data_offset`
    pub fn new(data_offset: u32) -> Self {
        Superblock {
            magic: MAGIC,
            version: VERSION,
            last_alloc: data_offset,
            file_count: 0,
        }
    }

    /// Validate the magic number.
    ///
    /// The version is informational; a store with an unknown version is
    /// still read with this layout.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(SlotFsError::InvalidMagic(self.magic));
        }

        Ok(())
    }

    /// Serialize superblock to bytes
    pub fn to_bytes(&self) -> [u8; SUPERBLOCK_SIZE] {
        let mut bytes = [0u8; SUPERBLOCK_SIZE];
        bytes[0..4].copy_from_slice(&self.magic.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.last_alloc.to_le_bytes());
        bytes[12..16].copy_from_slice(&self.file_count.to_le_bytes());
        bytes
    }

    /// Deserialize superblock from bytes.
    ///
    /// Does not validate; callers decide what a bad magic means.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SUPERBLOCK_SIZE {
            return Err(SlotFsError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Insufficient bytes for superblock",
            )));
        }

        Ok(Superblock {
            magic: read_u32(bytes, 0),
            version: read_u32(bytes, 4),
            last_alloc: read_u32(bytes, 8),
            file_count: read_u32(bytes, 12),
        })
    }
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
