//! Concurrent access through the shared engine

use slotfs::{FsOps, SharedSlotFs, SlotFsBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_parallel_writers_on_distinct_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("filesys.db");
    let fs = Arc::new(SharedSlotFs::new(SlotFsBuilder::new().path(&path).build().unwrap()));

    let threads: Vec<_> = (0..16)
        .map(|id| {
            let fs = fs.clone();
            std::thread::spawn(move || {
                let name = format!("/t{}", id);
                let h = fs.create(&name, 0o644).unwrap();
                for round in 0..50u64 {
                    let chunk = format!("{:04}", round);
                    fs.write(h, round * 4, chunk.as_bytes()).unwrap();
                }
                fs.release(h).unwrap();
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(fs.stats().file_count, 16);
    for id in 0..16 {
        let h = fs.open(&format!("/t{}", id), 0).unwrap();
        let data = fs.read(h, 0, 200).unwrap();
        assert_eq!(data.len(), 200);
        assert_eq!(&data[0..4], b"0000");
        assert_eq!(&data[196..200], b"0049");
    }
}

#[test]
fn test_readers_and_writer_share_one_file() {
    let fs = Arc::new(SharedSlotFs::new(
        SlotFsBuilder::new().build_in_memory().unwrap(),
    ));
    let h = fs.create("/shared", 0o644).unwrap();
    fs.write(h, 0, &[b'a'; 512]).unwrap();

    let torn = Arc::new(AtomicUsize::new(0));
    let mut threads = Vec::new();

    {
        let fs = fs.clone();
        threads.push(std::thread::spawn(move || {
            for i in 0..200 {
                let byte = if i % 2 == 0 { b'b' } else { b'a' };
                fs.write(h, 0, &[byte; 512]).unwrap();
            }
        }));
    }

    for _ in 0..4 {
        let fs = fs.clone();
        let torn = torn.clone();
        threads.push(std::thread::spawn(move || {
            for _ in 0..200 {
                let offset = rand::random::<u64>() % 512;
                let data = fs.read(h, offset, 512).unwrap();
                assert_eq!(data.len() as u64, 512 - offset);
                if data.iter().any(|&b| b != data[0]) {
                    torn.fetch_add(1, Ordering::Relaxed);
                }
            }
        }));
    }

    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(torn.load(Ordering::Relaxed), 0);
    assert_eq!(fs.getattr("/shared").unwrap().size, 512);
}

#[test]
fn test_racing_creates_fill_every_slot_once() {
    let fs = Arc::new(SharedSlotFs::new(
        SlotFsBuilder::new().build_in_memory().unwrap(),
    ));

    let created = Arc::new(AtomicUsize::new(0));
    let threads: Vec<_> = (0..8)
        .map(|id| {
            let fs = fs.clone();
            let created = created.clone();
            std::thread::spawn(move || {
                for i in 0..10 {
                    if fs.create(&format!("/f{}_{}", id, i), 0o644).is_ok() {
                        created.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();

    for t in threads {
        t.join().unwrap();
    }

    assert_eq!(created.load(Ordering::Relaxed), 64);
    let stats = fs.stats();
    assert_eq!(stats.file_count, 64);

    let mut slots: Vec<u64> = fs
        .readdir("/")
        .unwrap()
        .into_iter()
        .filter_map(|e| e.handle.map(|h| h.0))
        .collect();
    slots.sort_unstable();
    slots.dedup();
    assert_eq!(slots.len(), 64);
}
