#![no_main]
use libfuzzer_sys::{arbitrary::{Arbitrary, Unstructured}, fuzz_target};
use slotfs::SlotFsBuilder;

#[derive(Debug, Arbitrary)]
enum Op {
    Create { name: u8 },
    Write { name: u8, offset: u16, data: Vec<u8> },
    Read { name: u8, offset: u16, len: u16 },
    Truncate { name: u8, size: u16 },
    Unlink { name: u8 },
}

fn path_of(name: u8) -> String {
    format!("/f{}", name % 12)
}

fuzz_target!(|input: &[u8]| {
    let mut u = Unstructured::new(input);
    let ops: Vec<Op> = match u.arbitrary() {
        Ok(ops) => ops,
        Err(_) => return,
    };

    let mut fs = match SlotFsBuilder::new()
        .total_size(32 * 1024)
        .max_files(8)
        .build_in_memory()
    {
        Ok(fs) => fs,
        Err(_) => return,
    };
    let capacity = fs.geometry().region_capacity();

    for op in ops {
        match op {
            Op::Create { name } => {
                let _ = fs.create(&path_of(name), 0o644);
            }
            Op::Write { name, offset, data } => {
                if let Ok((handle, _)) = fs.lookup(&path_of(name)) {
                    let fits = offset as u64 + data.len() as u64 <= capacity;
                    assert_eq!(fs.write(handle, offset as u64, &data).is_ok(), fits);
                }
            }
            Op::Read { name, offset, len } => {
                if let Ok((handle, attr)) = fs.lookup(&path_of(name)) {
                    let mut buf = vec![0u8; len as usize];
                    let n = fs.read(handle, offset as u64, &mut buf).unwrap();
                    assert!(offset as u64 + n as u64 <= attr.size.max(offset as u64));
                }
            }
            Op::Truncate { name, size } => {
                let _ = fs.truncate(&path_of(name), size as u64);
            }
            Op::Unlink { name } => {
                let _ = fs.unlink(&path_of(name));
            }
        }

        let used = fs.readdir("/").unwrap().iter().filter(|e| e.handle.is_some()).count();
        assert_eq!(used as u32, fs.superblock().file_count);
    }
});
