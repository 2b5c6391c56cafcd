//! Adapter behavior over an in-memory source: init failure stages, header
//! walking, forward reads, gap skipping, and backward-seek emulation.

use std::sync::Arc;

use arcmount_engine::{ArchiveAdapter, EngineError, ParserFactory, SessionAdapter, VolumeConfig};
use arcmount_testkit::{MemorySource, ScriptedArchive, ScriptedParserFactory, PARSER_ERROR};

fn entry_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn two_file_archive() -> ScriptedArchive {
    ScriptedArchive::new()
        .add_file("path/to/first", 100, entry_bytes(4096, 1))
        .add_dir("path/extra", 150)
        .add_file("path/to/second", 200, entry_bytes(48 * 1024, 2))
}

fn adapter_for(archive: ScriptedArchive) -> (SessionAdapter, Arc<ScriptedParserFactory>) {
    let factory = Arc::new(ScriptedParserFactory::new(archive));
    let image = factory.archive().image();
    let adapter = SessionAdapter::new(
        "req-1",
        Arc::clone(&factory) as Arc<dyn ParserFactory>,
        Box::new(MemorySource::new(image)),
        VolumeConfig::default(),
    );
    (adapter, factory)
}

#[test]
fn init_succeeds_on_a_well_formed_archive() {
    let (mut adapter, _factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    adapter.cleanup().unwrap();
}

#[test]
fn init_reports_allocation_failure() {
    let (mut adapter, factory) = adapter_for(two_file_archive());
    factory
        .behavior()
        .fail_create
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let error = adapter.init().unwrap_err();
    assert_eq!(error, EngineError::ArchiveNew);
    assert_eq!(error.to_string(), "Could not allocate archive.");
    // Cleanup must still be safe after a failed init.
    adapter.cleanup().unwrap();
}

#[test]
fn init_reports_format_support_failure() {
    let (mut adapter, factory) = adapter_for(two_file_archive());
    factory
        .behavior()
        .fail_register_formats
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let error = adapter.init().unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("Error at support rar/zip format: {PARSER_ERROR}")
    );
    adapter.cleanup().unwrap();
}

#[test]
fn init_reports_open_failure() {
    let (mut adapter, factory) = adapter_for(two_file_archive());
    factory
        .behavior()
        .fail_open
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let error = adapter.init().unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("Error at open archive: {PARSER_ERROR}")
    );
    adapter.cleanup().unwrap();
}

#[test]
fn next_header_walks_entries_to_end_of_archive() {
    let (mut adapter, _factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();

    let first = adapter.next_header().unwrap().unwrap();
    assert_eq!(first.path, "path/to/first");
    assert_eq!(first.size, 4096);
    assert!(!first.is_directory);
    assert_eq!(first.modification_time, 100);

    let dir = adapter.next_header().unwrap().unwrap();
    assert_eq!(dir.path, "path/extra");
    assert!(dir.is_directory);

    let second = adapter.next_header().unwrap().unwrap();
    assert_eq!(second.path, "path/to/second");

    assert_eq!(adapter.next_header().unwrap(), None);
    adapter.cleanup().unwrap();
}

#[test]
fn next_header_failure_uses_the_header_error_prefix() {
    let (mut adapter, factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    factory
        .behavior()
        .fail_next_entry
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let error = adapter.next_header().unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("Error at reading next header for metadata: {PARSER_ERROR}")
    );
    adapter.cleanup().unwrap();
}

#[test]
fn read_data_returns_entry_bytes_from_the_start() {
    let data = entry_bytes(4096, 1);
    let (mut adapter, _factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    adapter.next_header().unwrap().unwrap();

    let mut buf = vec![0u8; 4096];
    let read = adapter.read_data(0, &mut buf).unwrap();
    assert_eq!(read, 4096);
    assert_eq!(buf, data);
    adapter.cleanup().unwrap();
}

#[test]
fn read_data_skips_a_forward_gap_through_the_dummy_buffer() {
    let data = entry_bytes(48 * 1024, 2);
    let (mut adapter, _factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    // Walk to the large entry.
    while adapter.next_header().unwrap().unwrap().path != "path/to/second" {}

    let offset = 17_000usize;
    let mut buf = vec![0u8; 8_000];
    let read = adapter.read_data(offset as i64, &mut buf).unwrap();
    assert_eq!(read, 8_000);
    assert_eq!(buf, data[offset..offset + 8_000]);
    adapter.cleanup().unwrap();
}

#[test]
fn backward_seek_restarts_and_returns_identical_bytes() {
    let data = entry_bytes(48 * 1024, 2);
    let (mut adapter, _factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    while adapter.next_header().unwrap().unwrap().path != "path/to/second" {}

    // Read the whole entry forward, then the upper half again: the second
    // request starts behind last_read_offset and forces a parser restart.
    let mut full = vec![0u8; data.len()];
    assert_eq!(adapter.read_data(0, &mut full).unwrap(), data.len());
    assert_eq!(full, data);

    let half = data.len() / 2;
    let mut upper = vec![0u8; data.len() - half];
    let read = adapter.read_data(half as i64, &mut upper).unwrap();
    assert_eq!(read, upper.len());
    assert_eq!(upper, data[half..]);
    adapter.cleanup().unwrap();
}

#[test]
fn backward_seek_is_idempotent_across_orders() {
    // Property: ReadData(a, b-a) returns the same bytes whether or not a
    // farther read happened first.
    let data = entry_bytes(20_000, 7);
    let archive = ScriptedArchive::new().add_file("solo", 1, data.clone());

    let (a, b) = (3_000usize, 9_000usize);

    let (mut fresh, _f) = adapter_for(archive.clone());
    fresh.init().unwrap();
    fresh.next_header().unwrap().unwrap();
    let mut direct = vec![0u8; b - a];
    assert_eq!(fresh.read_data(a as i64, &mut direct).unwrap(), b - a);

    let (mut seeked, _f) = adapter_for(archive);
    seeked.init().unwrap();
    seeked.next_header().unwrap().unwrap();
    let mut tail = vec![0u8; 4_000];
    assert_eq!(seeked.read_data(12_000, &mut tail).unwrap(), 4_000);
    let mut replayed = vec![0u8; b - a];
    assert_eq!(seeked.read_data(a as i64, &mut replayed).unwrap(), b - a);

    assert_eq!(direct, replayed);
    assert_eq!(direct, data[a..b]);
}

#[test]
fn read_past_entry_end_reports_fewer_bytes_and_leaves_the_tail_untouched() {
    let data = entry_bytes(4096, 1);
    let (mut adapter, _factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    adapter.next_header().unwrap().unwrap();

    let mut buf = vec![0xAB; 2 * 4096];
    let read = adapter.read_data(0, &mut buf).unwrap();
    assert_eq!(read, 4096);
    assert_eq!(buf[..4096], data[..]);
    assert!(buf[4096..].iter().all(|&b| b == 0xAB));
    adapter.cleanup().unwrap();
}

#[test]
fn rewind_to_a_vanished_entry_reports_file_not_found() {
    let (mut adapter, factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    while adapter.next_header().unwrap().unwrap().path != "path/to/second" {}

    let mut buf = vec![0u8; 1024];
    assert_eq!(adapter.read_data(2048, &mut buf).unwrap(), 1024);

    // The archive the restart re-parses no longer carries the entry.
    factory.set_archive(ScriptedArchive::new().add_file("path/to/first", 100, vec![0; 64]));

    let error = adapter.read_data(0, &mut buf).unwrap_err();
    assert_eq!(error, EngineError::EntryNotFound);
    assert_eq!(error.to_string(), "File not found for read data request.");
    adapter.cleanup().unwrap();
}

#[test]
fn read_data_failure_uses_the_read_error_prefix() {
    let (mut adapter, factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    adapter.next_header().unwrap().unwrap();
    factory
        .behavior()
        .fail_read_block
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let mut buf = vec![0u8; 16];
    let error = adapter.read_data(0, &mut buf).unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("Error at reading data: {PARSER_ERROR}")
    );
    adapter.cleanup().unwrap();
}

#[test]
fn cleanup_failure_still_releases_and_stays_idempotent() {
    let (mut adapter, factory) = adapter_for(two_file_archive());
    adapter.init().unwrap();
    factory
        .behavior()
        .fail_close
        .store(true, std::sync::atomic::Ordering::SeqCst);

    let error = adapter.cleanup().unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("Error at archive free: {PARSER_ERROR}")
    );

    // Only the first call does work; repeats are no-ops.
    adapter.cleanup().unwrap();
    adapter.cleanup().unwrap();
}
