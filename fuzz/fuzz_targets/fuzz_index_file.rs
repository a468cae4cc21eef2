//! Fuzz target for the sidecar index decoder.
//!
//! Arbitrary bytes must either be rejected with an error or decode to an
//! index that survives re-encoding and opens as a usable table.

#![no_main]

use libfuzzer_sys::fuzz_target;

use pretable_store::{BlockBackend, IndexFile, InMemoryBackend, TableConfig, TableStore};

fuzz_target!(|data: &[u8]| {
    let Ok(file) = IndexFile::decode(data) else {
        return;
    };
    let reencoded = IndexFile::decode(&file.encode()).expect("re-encoded sidecar decodes");
    assert_eq!(reencoded, file, "sidecar round-trip mismatch");

    let config = TableConfig::builder().block_size(64).record_size(8).buffers(2).build();
    let backend = InMemoryBackend::with_block_size(64);
    if backend.write_index(data).is_err() {
        return;
    }
    // Capacity violations are rejected at open; anything accepted must be readable.
    let Ok(table) = TableStore::from_backend(backend, config) else {
        return;
    };
    let count = file.count.min(1024);
    if count > 0 {
        let records = table.records(0, count).expect("records of an accepted index");
        assert_eq!(records.len() as u64, count * 8);
        table.delete(0, 1).expect("delete from an accepted index");
        table.check_invariants().expect("invariants after delete");
    }
});
