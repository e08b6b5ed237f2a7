//! Contents and metadata survive closing and reopening the backing store

use slotfs::{FsConfig, SlotFs, SlotFsBuilder, DEFAULT_TOTAL_SIZE};
use tempfile::TempDir;

fn config_in(dir: &TempDir) -> FsConfig {
    FsConfig {
        store_path: dir.path().join("filesys.db"),
        ..FsConfig::default()
    }
}

#[test]
fn test_missing_store_is_created_with_exact_size() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    let fs = SlotFs::from_config(&config).unwrap();
    assert_eq!(fs.superblock().file_count, 0);
    assert_eq!(fs.superblock().last_alloc, 3152);

    let len = std::fs::metadata(&config.store_path).unwrap().len();
    assert_eq!(len, DEFAULT_TOTAL_SIZE);
}

#[test]
fn test_hello_survives_remount() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let mut fs = SlotFs::from_config(&config).unwrap();
        let h = fs.create("/a.txt", 0o100644).unwrap();
        assert_eq!(fs.write(h, 0, b"Hello").unwrap(), 5);
        fs.release(h).unwrap();
        fs.flush().unwrap();
    }

    let mut fs = SlotFs::from_config(&config).unwrap();
    let attr = fs.getattr("/a.txt").unwrap();
    assert_eq!(attr.size, 5);
    assert_eq!(attr.perms, 0o100644);

    let (h, _) = fs.lookup("/a.txt").unwrap();
    let mut buf = [0u8; 10];
    let n = fs.read(h, 0, &mut buf).unwrap();
    assert_eq!(&buf[..n], b"Hello");
}

#[test]
fn test_store_bytes_match_layout() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let mut fs = SlotFs::from_config(&config).unwrap();
        let h = fs.create("/a.txt", 0o644).unwrap();
        fs.write(h, 0, b"Hello").unwrap();
    }

    let raw = std::fs::read(&config.store_path).unwrap();

    // Superblock
    assert_eq!(&raw[0..4], &0xDEADBEEFu32.to_le_bytes());
    assert_eq!(&raw[4..8], &1u32.to_le_bytes());
    assert_eq!(&raw[8..12], &3157u32.to_le_bytes());
    assert_eq!(&raw[12..16], &1u32.to_le_bytes());

    // Slot 0 entry
    assert_eq!(raw[16], 1);
    assert_eq!(&raw[17..22], b"a.txt");
    assert_eq!(raw[22], 0);
    assert_eq!(&raw[49..53], &3152u32.to_le_bytes());
    assert_eq!(&raw[53..57], &5u32.to_le_bytes());
    assert_eq!(&raw[57..61], &0o644u32.to_le_bytes());

    // Data region of slot 0
    assert_eq!(&raw[3152..3157], b"Hello");
}

#[test]
fn test_unlink_persists_and_slot_is_reused() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let mut fs = SlotFs::from_config(&config).unwrap();
        fs.create("/one", 0o644).unwrap();
        fs.create("/two", 0o644).unwrap();
        fs.unlink("/one").unwrap();
    }

    let mut fs = SlotFs::from_config(&config).unwrap();
    assert!(fs.getattr("/one").is_err());
    assert_eq!(fs.superblock().file_count, 1);

    let h = fs.create("/three", 0o644).unwrap();
    assert_eq!(h.0, 0);
}

#[test]
fn test_builder_with_custom_geometry() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("small.db");

    {
        let mut fs = SlotFsBuilder::new()
            .path(&path)
            .total_size(64 * 1024)
            .max_files(8)
            .build()
            .unwrap();
        assert_eq!(fs.stats().max_files, 8);
        let h = fs.create("/x", 0o600).unwrap();
        fs.write(h, 0, b"xyz").unwrap();
    }

    let fs = SlotFsBuilder::new()
        .path(&path)
        .total_size(64 * 1024)
        .max_files(8)
        .build()
        .unwrap();
    assert_eq!(fs.getattr("/x").unwrap().size, 3);
    assert_eq!(std::fs::metadata(&path).unwrap().len(), 64 * 1024);
}

#[test]
fn test_open_flags_on_disk_store() {
    let dir = TempDir::new().unwrap();
    let config = config_in(&dir);

    {
        let mut fs = SlotFs::from_config(&config).unwrap();
        let h = fs.open("/made.txt", libc::O_RDWR | libc::O_CREAT).unwrap();
        fs.write(h, 0, b"abc").unwrap();
    }

    let mut fs = SlotFsBuilder::new().config(config).build().unwrap();
    let h = fs.open("/made.txt", libc::O_RDWR).unwrap();
    assert_eq!(fs.attr_of(h).unwrap().size, 3);

    fs.open("/made.txt", libc::O_WRONLY | libc::O_TRUNC).unwrap();
    assert_eq!(fs.getattr("/made.txt").unwrap().size, 0);
}
