//! Persistence tests: flush, close and reopen through the file backend.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use pretable_store::{
    BlockBackend, Error, FileBackend, IndexFile, InMemoryBackend, TableConfig, TableStore,
};
use pretable_test_utils::{TestDir, init_tracing, strategies};
use proptest::prelude::*;

const RECORD_SIZE: usize = 8;

fn config() -> TableConfig {
    TableConfig::builder().block_size(64).record_size(RECORD_SIZE).buffers(2).fill_ratio(0.5).build()
}

fn numbered(n: u32) -> Vec<u8> {
    (0..n)
        .flat_map(|i| {
            let mut rec = [0u8; RECORD_SIZE];
            rec[..4].copy_from_slice(&i.to_be_bytes());
            rec
        })
        .collect()
}

#[test]
fn test_reopen_after_close() {
    init_tracing();
    let dir = TestDir::new();
    {
        let table = TableStore::create(dir.path(), "nodes", config()).unwrap();
        table.insert(0, &numbered(50)).unwrap();
        table.delete(10, 5).unwrap();
        table.write5(0, 3, (1 << 40) - 1).unwrap();
        table.close().unwrap();
    }

    let table = TableStore::open(dir.path(), "nodes", config()).unwrap();
    assert_eq!(table.size().unwrap(), 45);
    assert_eq!(table.read5(0, 3).unwrap(), (1 << 40) - 1);
    assert_eq!(table.read4(10, 0).unwrap(), 15);
    assert_eq!(table.read4(44, 0).unwrap(), 49);
    table.check_invariants().unwrap();
}

#[test]
fn test_unflushed_changes_are_lost() {
    let dir = TestDir::new();
    {
        let table = TableStore::create(dir.path(), "nodes", config()).unwrap();
        table.insert(0, &numbered(4)).unwrap();
        table.flush().unwrap();
        table.insert(4, &numbered(4)).unwrap();
        // Dropped without flush.
    }

    let table = TableStore::open(dir.path(), "nodes", config()).unwrap();
    assert_eq!(table.size().unwrap(), 4);
}

#[test]
fn test_create_writes_empty_index() {
    let dir = TestDir::new();
    let table = TableStore::create(dir.path(), "nodes", config()).unwrap();
    let (_, index_path) = dir.table_files("nodes");
    assert_eq!(std::fs::read(&index_path).unwrap(), vec![0, 0, 0]);

    table.close().unwrap();
    let table = TableStore::open(dir.path(), "nodes", config()).unwrap();
    assert_eq!(table.size().unwrap(), 0);
    assert_eq!(table.blocks().unwrap(), 0);
}

#[test]
fn test_missing_table_fails_to_open() {
    let dir = TestDir::new();
    assert!(matches!(TableStore::open(dir.path(), "nodes", config()), Err(Error::Io { .. })));
}

#[test]
fn test_truncated_index_fails_to_open() {
    let dir = TestDir::new();
    let table = TableStore::create(dir.path(), "nodes", config()).unwrap();
    table.insert(0, &numbered(30)).unwrap();
    table.close().unwrap();

    let (_, index_path) = dir.table_files("nodes");
    let bytes = std::fs::read(&index_path).unwrap();
    std::fs::write(&index_path, &bytes[..bytes.len() - 1]).unwrap();

    let err = TableStore::open(dir.path(), "nodes", config()).err().unwrap();
    assert!(err.is_consistency_fault(), "{err}");
}

#[test]
fn test_corrupted_index_fails_to_open() {
    let dir = TestDir::new();
    let (_, index_path) = dir.table_files("nodes");
    TableStore::create(dir.path(), "nodes", config()).unwrap().close().unwrap();

    // Two blocks sharing block number 0.
    let file = IndexFile { nr_blocks: 1, count: 4, first_pres: vec![0, 2], blocks: vec![0, 0] };
    std::fs::write(&index_path, file.encode()).unwrap();
    assert!(matches!(
        TableStore::open(dir.path(), "nodes", config()),
        Err(Error::Corrupted { .. })
    ));
}

#[test]
fn test_block_capacity_checked_on_open() {
    let dir = TestDir::new();
    let table = TableStore::create(dir.path(), "nodes", config()).unwrap();
    table.insert(0, &numbered(4)).unwrap();
    // Fills the first block in place up to its 8 entries.
    table.insert(4, &numbered(4)).unwrap();
    assert_eq!(table.blocks().unwrap(), 1);
    table.close().unwrap();

    // 64-byte blocks with 16-byte records hold only 4 entries.
    let smaller = TableConfig::builder().block_size(64).record_size(16).build();
    assert!(matches!(TableStore::open(dir.path(), "nodes", smaller), Err(Error::Corrupted { .. })));
}

#[test]
fn test_data_file_layout() {
    let dir = TestDir::new();
    let table = TableStore::create(dir.path(), "nodes", config()).unwrap();
    table.insert(0, &numbered(10)).unwrap();
    table.flush().unwrap();

    // 10 records at 4 per split block: three blocks, no file header.
    let (data_path, index_path) = dir.table_files("nodes");
    assert_eq!(std::fs::metadata(&data_path).unwrap().len(), 3 * 64);
    let backend = FileBackend::open(&data_path, &index_path, 64).unwrap();
    let block = backend.read_block(1).unwrap();
    assert_eq!(&block[..4], &4u32.to_be_bytes());

    let index = IndexFile::decode(&std::fs::read(&index_path).unwrap()).unwrap();
    assert_eq!(index.nr_blocks, 3);
    assert_eq!(index.count, 10);
    assert_eq!(index.first_pres, vec![0, 4, 8]);
}

#[test]
fn test_in_memory_backend_reopen() {
    let backend = InMemoryBackend::with_block_size(64);
    let table = TableStore::create_with_backend(backend, config(), "mem".to_string()).unwrap();
    table.insert(0, &numbered(6)).unwrap();
    table.flush().unwrap();
    assert!(table.stats().unwrap().total_blocks >= 2);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_reopen_preserves_contents(ops in strategies::arb_ops(RECORD_SIZE, 30)) {
        let dir = TestDir::new();
        let table = TableStore::create(dir.path(), "nodes", config()).unwrap();
        let mut model: Vec<Vec<u8>> = Vec::new();
        for op in &ops {
            match op {
                strategies::TableOp::Insert { at, records } => {
                    let pre = at.index(model.len() + 1);
                    table.insert(pre as u64, &records.concat()).unwrap();
                    model.splice(pre..pre, records.iter().cloned());
                }
                strategies::TableOp::Delete { at, len } if !model.is_empty() => {
                    let pre = at.index(model.len());
                    let n = (*len).min(model.len() - pre);
                    table.delete(pre as u64, n as u64).unwrap();
                    model.drain(pre..pre + n);
                }
                strategies::TableOp::Write { at, value } if !model.is_empty() => {
                    let pre = at.index(model.len());
                    table.write4(pre as u64, 0, *value).unwrap();
                    model[pre][..4].copy_from_slice(&value.to_be_bytes());
                }
                strategies::TableOp::Flush => table.flush().unwrap(),
                _ => {}
            }
        }
        table.close().unwrap();

        let table = TableStore::open(dir.path(), "nodes", config()).unwrap();
        prop_assert_eq!(table.size().unwrap(), model.len() as u64);
        prop_assert_eq!(table.records(0, model.len() as u64).unwrap(), model.concat());
        table.check_invariants().unwrap();
    }
}
