//! Opening stores that fail validation

use slotfs::{FsConfig, ReformatPolicy, SlotFs, SlotFsError, DEFAULT_TOTAL_SIZE};
use std::io::{Seek, SeekFrom, Write};
use tempfile::TempDir;

fn populated_store(dir: &TempDir) -> FsConfig {
    let config = FsConfig {
        store_path: dir.path().join("filesys.db"),
        ..FsConfig::default()
    };
    let mut fs = SlotFs::from_config(&config).unwrap();
    let h = fs.create("/keep.txt", 0o644).unwrap();
    fs.write(h, 0, b"data").unwrap();
    config
}

fn overwrite(config: &FsConfig, offset: u64, bytes: &[u8]) {
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .open(&config.store_path)
        .unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
}

fn listed_files(fs: &SlotFs) -> Vec<String> {
    fs.readdir("/")
        .unwrap()
        .into_iter()
        .filter(|e| e.handle.is_some())
        .map(|e| e.name)
        .collect()
}

#[test]
fn test_bad_magic_reformats() {
    let dir = TempDir::new().unwrap();
    let config = populated_store(&dir);
    overwrite(&config, 0, &0xCAFEBABEu32.to_le_bytes());

    let fs = SlotFs::from_config(&config).unwrap();
    assert_eq!(fs.superblock().file_count, 0);
    assert!(listed_files(&fs).is_empty());
}

#[test]
fn test_wrong_size_reformats_to_exact_size() {
    let dir = TempDir::new().unwrap();
    let config = populated_store(&dir);

    let file = std::fs::OpenOptions::new()
        .write(true)
        .open(&config.store_path)
        .unwrap();
    file.set_len(1000).unwrap();
    drop(file);

    let fs = SlotFs::from_config(&config).unwrap();
    assert_eq!(fs.superblock().file_count, 0);
    assert_eq!(
        std::fs::metadata(&config.store_path).unwrap().len(),
        DEFAULT_TOTAL_SIZE
    );
}

#[test]
fn test_unknown_version_keeps_files() {
    let dir = TempDir::new().unwrap();
    let config = populated_store(&dir);
    overwrite(&config, 4, &7u32.to_le_bytes());

    let fs = SlotFs::from_config(&config).unwrap();
    assert_eq!(listed_files(&fs), vec!["keep.txt".to_string()]);
}

#[test]
fn test_refuse_policy_surfaces_error_and_keeps_bytes() {
    let dir = TempDir::new().unwrap();
    let mut config = populated_store(&dir);
    overwrite(&config, 0, &0u32.to_le_bytes());
    config.reformat = ReformatPolicy::Refuse;

    match SlotFs::from_config(&config) {
        Err(SlotFsError::InvalidMagic(0)) => {}
        other => panic!("expected InvalidMagic, got {:?}", other.map(|_| ())),
    }

    let raw = std::fs::read(&config.store_path).unwrap();
    assert_eq!(&raw[3152..3156], b"data");
}

#[test]
fn test_oversized_entry_is_clamped_not_reformatted() {
    let dir = TempDir::new().unwrap();
    let config = populated_store(&dir);

    // size field of slot 0
    overwrite(&config, 53, &u32::MAX.to_le_bytes());

    let fs = SlotFs::from_config(&config).unwrap();
    let capacity = fs.geometry().region_capacity();
    assert_eq!(fs.getattr("/keep.txt").unwrap().size, capacity);
}

#[test]
fn test_bad_name_costs_only_its_own_slot() {
    let dir = TempDir::new().unwrap();
    let config = populated_store(&dir);
    {
        let mut fs = SlotFs::from_config(&config).unwrap();
        fs.create("/cafe", 0o644).unwrap();
    }

    // slot 1 name starts at 16 + 49 + 1; make its last byte Latin-1
    overwrite(&config, 16 + 49 + 1 + 3, &[0xE9]);

    let mut fs = SlotFs::from_config(&config).unwrap();
    assert_eq!(fs.superblock().file_count, 1);
    assert_eq!(listed_files(&fs), vec!["keep.txt".to_string()]);

    let (h, attr) = fs.lookup("/keep.txt").unwrap();
    let mut buf = vec![0u8; attr.size as usize];
    fs.read(h, 0, &mut buf).unwrap();
    assert_eq!(buf, b"data");
}

#[test]
fn test_stale_file_count_is_repaired() {
    let dir = TempDir::new().unwrap();
    let config = populated_store(&dir);
    overwrite(&config, 12, &42u32.to_le_bytes());

    let fs = SlotFs::from_config(&config).unwrap();
    assert_eq!(fs.superblock().file_count, 1);
    assert_eq!(listed_files(&fs), vec!["keep.txt".to_string()]);
}
