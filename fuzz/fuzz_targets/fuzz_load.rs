#![no_main]
use libfuzzer_sys::fuzz_target;
use slotfs::{Geometry, MemoryStore, ReformatPolicy, SlotFs};

// Arbitrary metadata bytes must either load into a consistent table or be
// rejected, never panic.
fuzz_target!(|data: &[u8]| {
    let geometry = match Geometry::new(16 * 1024, 8) {
        Ok(g) => g,
        Err(_) => return,
    };

    let mut bytes = vec![0u8; geometry.total_size() as usize];
    let n = data.len().min(geometry.meta_size() as usize);
    bytes[..n].copy_from_slice(&data[..n]);

    let fs = match SlotFs::load_or_format(
        MemoryStore::from_bytes(bytes),
        geometry,
        ReformatPolicy::Refuse,
    ) {
        Ok(fs) => fs,
        Err(_) => return,
    };

    let listing = fs.readdir("/").unwrap();
    let files = listing.iter().filter(|e| e.handle.is_some()).count();
    assert_eq!(files as u32, fs.superblock().file_count);

    for handle in listing.iter().filter_map(|e| e.handle) {
        let attr = fs.attr_of(handle).unwrap();
        assert!(attr.size <= geometry.region_capacity());
    }
});
