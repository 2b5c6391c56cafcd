//! A recording host for end-to-end engine tests
//!
//! Plays the part of the message channel's far side: collects every response
//! the core sends and answers `READ_CHUNK` requests from an in-memory archive
//! image. Chunk requests can be serviced inline (the common case), answered
//! with errors, or held for the test to deliver by hand from another thread.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};

use arcmount_engine::{HostSender, Volume};
use arcmount_protocol::HostResponse;

/// How the fake host treats incoming chunk requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkService {
    /// Answer inline from the image.
    Auto,
    /// Answer inline with `READ_CHUNK_ERROR`.
    Fail,
    /// Queue; the test delivers (or errors) by hand.
    Manual,
}

/// Where serviced chunks are delivered. [`Volume`] implements this directly;
/// registry-level tests adapt through their own dispatch.
pub trait ChunkSink: Send + Sync {
    fn deliver_chunk(&self, request_id: &str, chunk: Bytes, offset: i64);
    fn deliver_error(&self, request_id: &str);
}

impl ChunkSink for Volume {
    fn deliver_chunk(&self, request_id: &str, chunk: Bytes, offset: i64) {
        Volume::deliver_chunk(self, request_id, chunk, offset);
    }

    fn deliver_error(&self, request_id: &str) {
        Volume::deliver_chunk_error(self, request_id);
    }
}

struct HostState {
    responses: Vec<HostResponse>,
    pending_chunks: Vec<(String, i64, i64)>,
    mode: ChunkService,
    /// Weak so that a `FakeHost` held inside a volume's sender never keeps
    /// that same volume alive (the test owns the strong reference).
    sink: Option<Weak<dyn ChunkSink>>,
}

pub struct FakeHost {
    image: Vec<u8>,
    state: Mutex<HostState>,
    changed: Condvar,
}

impl FakeHost {
    pub fn new(image: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            image,
            state: Mutex::new(HostState {
                responses: Vec::new(),
                pending_chunks: Vec::new(),
                mode: ChunkService::Auto,
                sink: None,
            }),
            changed: Condvar::new(),
        })
    }

    pub fn archive_size(&self) -> i64 {
        self.image.len() as i64
    }

    /// Wires the destination for serviced chunks. Must happen before the
    /// first operation that pulls archive bytes.
    pub fn attach(&self, sink: &Arc<dyn ChunkSink>) {
        self.state.lock().sink = Some(Arc::downgrade(sink));
    }

    pub fn set_mode(&self, mode: ChunkService) {
        self.state.lock().mode = mode;
    }

    /// The image bytes a well-behaved host would return for a request.
    pub fn chunk_bytes(&self, offset: i64, length: i64) -> Bytes {
        let start = (offset.max(0) as usize).min(self.image.len());
        let end = ((offset + length).max(0) as usize).min(self.image.len());
        Bytes::copy_from_slice(&self.image[start..end])
    }

    pub fn responses(&self) -> Vec<HostResponse> {
        self.state.lock().responses.clone()
    }

    /// Blocks until the collected responses satisfy `predicate` or the
    /// timeout passes; reports whether they did.
    pub fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl Fn(&[HostResponse]) -> bool,
    ) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !predicate(&state.responses) {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return false;
            }
        }
        true
    }

    /// In `Manual` mode: blocks until the worker issues a chunk request and
    /// returns it.
    pub fn next_chunk_request(&self, timeout: Duration) -> Option<(String, i64, i64)> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if !state.pending_chunks.is_empty() {
                return Some(state.pending_chunks.remove(0));
            }
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return None;
            }
        }
    }

    fn sink(&self) -> Option<Arc<dyn ChunkSink>> {
        self.state.lock().sink.as_ref()?.upgrade()
    }
}

impl HostSender for FakeHost {
    fn send(&self, response: HostResponse) {
        if let HostResponse::ReadChunk {
            request_id,
            offset,
            length,
            ..
        } = &response
        {
            let mode = self.state.lock().mode;
            match mode {
                ChunkService::Auto => {
                    if let Some(sink) = self.sink() {
                        sink.deliver_chunk(request_id, self.chunk_bytes(*offset, *length), *offset);
                    }
                }
                ChunkService::Fail => {
                    if let Some(sink) = self.sink() {
                        sink.deliver_error(request_id);
                    }
                }
                ChunkService::Manual => {
                    let mut state = self.state.lock();
                    state
                        .pending_chunks
                        .push((request_id.clone(), *offset, *length));
                    self.changed.notify_all();
                }
            }
            return;
        }

        let mut state = self.state.lock();
        state.responses.push(response);
        self.changed.notify_all();
    }
}
