//! End-to-end volume behavior over the fake host: metadata scans, open/read/
//! close flows, chunked responses, error keying, and chunk-delivery routing.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use bytes::Bytes;

use arcmount_engine::{
    AdapterFactory, HostSender, ParserAdapterFactory, ParserFactory, Volume, VolumeConfig,
};
use arcmount_protocol::HostResponse;
use arcmount_testkit::{
    ChunkService, ChunkSink, FakeHost, ScriptedArchive, ScriptedParserFactory, PARSER_ERROR,
};

const TIMEOUT: Duration = Duration::from_secs(10);

fn entry_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(17).wrapping_add(seed)).collect()
}

fn mount(
    archive: ScriptedArchive,
    config: VolumeConfig,
) -> (Arc<FakeHost>, Arc<Volume>, Arc<ScriptedParserFactory>) {
    let host = FakeHost::new(archive.image());
    let parser_factory = Arc::new(ScriptedParserFactory::new(archive));
    let adapter_factory = Arc::new(ParserAdapterFactory::new(
        Arc::clone(&parser_factory) as Arc<dyn ParserFactory>,
        config,
    )) as Arc<dyn AdapterFactory>;

    let volume = Arc::new(
        Volume::new(
            "fs-1",
            Arc::clone(&host) as Arc<dyn HostSender>,
            adapter_factory,
            config,
        )
        .unwrap(),
    );
    let sink: Arc<dyn ChunkSink> = Arc::clone(&volume) as Arc<dyn ChunkSink>;
    host.attach(&sink);
    (host, volume, parser_factory)
}

fn wait_terminal(host: &FakeHost, request_id: &str) {
    let id = request_id.to_owned();
    assert!(
        host.wait_for(TIMEOUT, |responses| {
            responses
                .iter()
                .any(|r| r.request_id() == id && r.is_terminal())
        }),
        "no terminal response for {request_id}"
    );
}

fn terminals_for(responses: &[HostResponse], request_id: &str) -> usize {
    responses
        .iter()
        .filter(|r| r.request_id() == request_id && r.is_terminal())
        .count()
}

fn error_for(responses: &[HostResponse], request_id: &str) -> Option<String> {
    responses.iter().find_map(|r| match r {
        HostResponse::FileSystemError {
            request_id: id,
            error,
            ..
        } if id == request_id => Some(error.clone()),
        _ => None,
    })
}

fn read_file_payload(responses: &[HostResponse], request_id: &str) -> Vec<u8> {
    let mut payload = Vec::new();
    for response in responses {
        if let HostResponse::ReadFileDone {
            request_id: id,
            read_file_data,
            ..
        } = response
        {
            if id == request_id {
                payload.extend_from_slice(read_file_data);
            }
        }
    }
    payload
}

#[test]
fn read_metadata_builds_the_tree() {
    let archive = ScriptedArchive::new()
        .add_file("docs/report.bin", 300, entry_bytes(100, 1))
        .add_file("readme.txt", 400, entry_bytes(20, 2))
        .add_dir("docs", 500);
    let (host, volume, _factory) = mount(archive, VolumeConfig::default());

    volume.read_metadata("meta-1", host.archive_size());
    wait_terminal(&host, "meta-1");

    let responses = host.responses();
    assert_eq!(terminals_for(&responses, "meta-1"), 1);

    let tree = responses
        .iter()
        .find_map(|r| match r {
            HostResponse::ReadMetadataDone { metadata, .. } => Some(metadata.clone()),
            _ => None,
        })
        .expect("metadata tree");

    assert_eq!(tree.name, "/");
    assert!(tree.is_directory);

    let docs = tree.child("docs").unwrap();
    assert!(docs.is_directory);
    // The directory's own row arrived after its contents and replaced the
    // synthesized node without dropping them.
    assert_eq!(docs.modification_time, 500);
    let report = docs.child("report.bin").unwrap();
    assert_eq!(report.size, 100);
    assert_eq!(report.modification_time, 300);

    assert_eq!(tree.child("readme.txt").unwrap().size, 20);
}

#[test]
fn metadata_scan_failure_reports_the_header_error() {
    let archive = ScriptedArchive::new().add_file("a", 1, entry_bytes(10, 1));
    let (host, volume, factory) = mount(archive, VolumeConfig::default());
    factory
        .behavior()
        .fail_next_entry
        .store(true, Ordering::SeqCst);

    volume.read_metadata("meta-1", host.archive_size());
    wait_terminal(&host, "meta-1");

    let error = error_for(&host.responses(), "meta-1").unwrap();
    assert_eq!(
        error,
        format!("Error at reading next header for metadata: {PARSER_ERROR}")
    );
}

#[test]
fn open_read_close_round_trip_chunks_the_payload() {
    let data = entry_bytes(3000, 3);
    let archive = ScriptedArchive::new().add_file("docs/report.bin", 300, data.clone());
    let config = VolumeConfig {
        read_chunk_max: 1024,
        ..VolumeConfig::default()
    };
    let (host, volume, _factory) = mount(archive, config);

    volume.open_file("open-1", "/docs/report.bin", host.archive_size());
    wait_terminal(&host, "open-1");
    assert!(host.responses().iter().any(|r| matches!(
        r,
        HostResponse::OpenFileDone { request_id, .. } if request_id == "open-1"
    )));

    volume.read_file("read-1", "open-1", 0, data.len() as i64);
    wait_terminal(&host, "read-1");

    let responses = host.responses();
    let chunks: Vec<(usize, bool)> = responses
        .iter()
        .filter_map(|r| match r {
            HostResponse::ReadFileDone {
                request_id,
                read_file_data,
                has_more_data,
                ..
            } if request_id == "read-1" => Some((read_file_data.len(), *has_more_data)),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec![(1024, true), (1024, true), (952, false)]);
    assert_eq!(read_file_payload(&responses, "read-1"), data);
    assert_eq!(terminals_for(&responses, "read-1"), 1);

    volume.close_file("close-1", "open-1");
    wait_terminal(&host, "close-1");
    assert!(host.responses().iter().any(|r| matches!(
        r,
        HostResponse::CloseFileDone { request_id, open_request_id, .. }
            if request_id == "close-1" && open_request_id == "open-1"
    )));
}

#[test]
fn read_file_at_an_offset_returns_the_tail() {
    let data = entry_bytes(3000, 4);
    let archive = ScriptedArchive::new().add_file("f", 1, data.clone());
    let (host, volume, _factory) = mount(archive, VolumeConfig::default());

    volume.open_file("open-1", "/f", host.archive_size());
    wait_terminal(&host, "open-1");

    volume.read_file("read-1", "open-1", 2000, 1000);
    wait_terminal(&host, "read-1");

    assert_eq!(read_file_payload(&host.responses(), "read-1"), data[2000..]);
}

#[test]
fn backward_read_through_the_full_stack_matches_forward_read() {
    let data = entry_bytes(3000, 5);
    let archive = ScriptedArchive::new().add_file("f", 1, data.clone());
    let (host, volume, _factory) = mount(archive, VolumeConfig::default());

    volume.open_file("open-1", "/f", host.archive_size());
    wait_terminal(&host, "open-1");

    volume.read_file("read-1", "open-1", 0, 3000);
    wait_terminal(&host, "read-1");

    // Starts behind the previous read; the adapter restarts its parser and
    // re-pulls the archive through the reader.
    volume.read_file("read-2", "open-1", 500, 100);
    wait_terminal(&host, "read-2");

    assert_eq!(read_file_payload(&host.responses(), "read-2"), data[500..600]);
}

#[test]
fn read_beyond_entry_end_serves_what_exists() {
    let data = entry_bytes(3000, 6);
    let archive = ScriptedArchive::new().add_file("f", 1, data.clone());
    let config = VolumeConfig {
        read_chunk_max: 1024,
        ..VolumeConfig::default()
    };
    let (host, volume, _factory) = mount(archive, config);

    volume.open_file("open-1", "/f", host.archive_size());
    wait_terminal(&host, "open-1");

    volume.read_file("read-1", "open-1", 0, 5000);
    wait_terminal(&host, "read-1");

    let responses = host.responses();
    assert_eq!(read_file_payload(&responses, "read-1"), data);
    assert_eq!(terminals_for(&responses, "read-1"), 1);
}

#[test]
fn opening_a_missing_path_reports_file_not_found() {
    let archive = ScriptedArchive::new().add_file("path/to/file", 1, entry_bytes(10, 7));
    let (host, volume, _factory) = mount(archive, VolumeConfig::default());

    volume.open_file("open-1", "no/such", host.archive_size());
    wait_terminal(&host, "open-1");

    let error = error_for(&host.responses(), "open-1").unwrap();
    assert!(
        error.contains("File not found in archive: no/such"),
        "unexpected message: {error}"
    );
}

#[test]
fn read_error_is_keyed_to_the_read_and_leaves_the_session_open() {
    let archive = ScriptedArchive::new().add_file("f", 1, entry_bytes(100, 8));
    let (host, volume, factory) = mount(archive, VolumeConfig::default());

    volume.open_file("open-1", "/f", host.archive_size());
    wait_terminal(&host, "open-1");

    factory
        .behavior()
        .fail_read_block
        .store(true, Ordering::SeqCst);
    volume.read_file("read-1", "open-1", 0, 100);
    wait_terminal(&host, "read-1");

    let error = error_for(&host.responses(), "read-1").unwrap();
    assert_eq!(error, format!("Error at reading data: {PARSER_ERROR}"));

    // The session survives the failed read; close_file disposes it normally.
    factory
        .behavior()
        .fail_read_block
        .store(false, Ordering::SeqCst);
    volume.close_file("close-1", "open-1");
    wait_terminal(&host, "close-1");
    assert!(host.responses().iter().any(|r| matches!(
        r,
        HostResponse::CloseFileDone { request_id, .. } if request_id == "close-1"
    )));
}

#[test]
fn close_failure_reports_instead_of_done() {
    let archive = ScriptedArchive::new().add_file("f", 1, entry_bytes(10, 9));
    let (host, volume, factory) = mount(archive, VolumeConfig::default());

    volume.open_file("open-1", "/f", host.archive_size());
    wait_terminal(&host, "open-1");

    factory.behavior().fail_close.store(true, Ordering::SeqCst);
    volume.close_file("close-1", "open-1");
    wait_terminal(&host, "close-1");

    let error = error_for(&host.responses(), "close-1").unwrap();
    assert_eq!(error, format!("Error at archive free: {PARSER_ERROR}"));
}

#[test]
fn chunk_errors_abort_the_blocked_operation() {
    let archive = ScriptedArchive::new().add_file("f", 1, entry_bytes(100, 10));
    let (host, volume, _factory) = mount(archive, VolumeConfig::default());
    host.set_mode(ChunkService::Fail);

    volume.read_metadata("meta-1", host.archive_size());
    wait_terminal(&host, "meta-1");

    let error = error_for(&host.responses(), "meta-1").unwrap();
    assert_eq!(
        error,
        "Error at open archive: VolumeReader failed to retrieve data."
    );
}

#[test]
fn deliveries_for_unknown_requests_are_dropped_silently() {
    let archive = ScriptedArchive::new().add_file("f", 1, entry_bytes(10, 11));
    let (host, volume, _factory) = mount(archive, VolumeConfig::default());

    volume.deliver_chunk("never-seen", Bytes::from_static(b"late"), 0);
    volume.deliver_chunk_error("never-seen");

    // Still fully operational afterwards.
    volume.read_metadata("meta-1", host.archive_size());
    wait_terminal(&host, "meta-1");
    assert_eq!(terminals_for(&host.responses(), "meta-1"), 1);
    assert!(error_for(&host.responses(), "never-seen").is_none());
}

#[test]
fn two_sessions_coexist_in_one_volume() {
    let first = entry_bytes(2000, 12);
    let second = entry_bytes(1500, 13);
    let archive = ScriptedArchive::new()
        .add_file("a.bin", 1, first.clone())
        .add_file("b.bin", 2, second.clone());
    let (host, volume, _factory) = mount(archive, VolumeConfig::default());

    volume.open_file("open-a", "/a.bin", host.archive_size());
    volume.open_file("open-b", "/b.bin", host.archive_size());
    wait_terminal(&host, "open-a");
    wait_terminal(&host, "open-b");

    // Interleave reads across the two live sessions.
    volume.read_file("read-b", "open-b", 100, 200);
    volume.read_file("read-a", "open-a", 0, 2000);
    wait_terminal(&host, "read-b");
    wait_terminal(&host, "read-a");

    let responses = host.responses();
    assert_eq!(read_file_payload(&responses, "read-b"), second[100..300]);
    assert_eq!(read_file_payload(&responses, "read-a"), first);

    volume.close_file("close-a", "open-a");
    volume.close_file("close-b", "open-b");
    wait_terminal(&host, "close-a");
    wait_terminal(&host, "close-b");
}

#[test]
fn blocked_reads_wake_on_deliveries_from_another_thread() {
    let data = entry_bytes(4000, 14);
    let archive = ScriptedArchive::new().add_file("f", 1, data.clone());
    let (host, volume, _factory) = mount(archive, VolumeConfig::default());
    host.set_mode(ChunkService::Manual);

    volume.open_file("open-1", "/f", host.archive_size());

    // Service chunk requests by hand, from this thread, while the worker
    // sits blocked inside its reader.
    let deadline = Instant::now() + TIMEOUT;
    loop {
        if host.wait_for(Duration::from_millis(5), |responses| {
            responses
                .iter()
                .any(|r| r.request_id() == "open-1" && r.is_terminal())
        }) {
            break;
        }
        while let Some((request_id, offset, length)) =
            host.next_chunk_request(Duration::from_millis(5))
        {
            volume.deliver_chunk(&request_id, host.chunk_bytes(offset, length), offset);
        }
        assert!(Instant::now() < deadline, "timed out pumping chunks");
    }

    assert!(host.responses().iter().any(|r| matches!(
        r,
        HostResponse::OpenFileDone { request_id, .. } if request_id == "open-1"
    )));
}
