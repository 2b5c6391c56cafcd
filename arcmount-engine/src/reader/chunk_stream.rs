//! Demand-pulled stream reader over an asynchronous chunk channel
//!
//! The parser runs on the volume's worker thread and calls the blocking
//! [`StreamSource`] contract; the host's chunk replies arrive on the main
//! thread. `ChunkStreamReader` couples the two with a condition variable and
//! a pair of buffers: while the parser consumes one buffer, the main thread
//! is free to fill the other with the read-ahead chunk. Buffers swap only
//! inside `read`, so a chunk that arrives after a `skip`/`seek` is recognized
//! as stale by its offset and dropped.

use std::rc::Rc;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::cache::HeaderCache;
use crate::config::VolumeConfig;
use crate::reader::{SourceError, StreamSource, Whence};

/// Capability to request raw archive bytes from the host.
///
/// The volume implements this by posting a `READ_CHUNK` message; the reader
/// never learns who is on the other end.
pub trait ChunkRequestor: Send + Sync {
    fn request_chunk(&self, request_id: &str, offset: i64, length: i64);
}

struct ReaderState {
    /// The two read-ahead buffers.
    buffers: [Bytes; 2],
    /// Index of the buffer the next delivery fills. The other buffer is the
    /// one the parser is consuming (or about to consume).
    fill: usize,
    /// Exactly one of `available` / `error` releases a blocked `read`.
    available: bool,
    error: bool,
    /// Logical offset: start of the next chunk to consume, and the offset a
    /// delivery must carry to be accepted.
    offset: i64,
}

struct ReaderShared {
    state: Mutex<ReaderState>,
    ready: Condvar,
}

/// Cross-thread half of the reader, held in the volume's request map.
#[derive(Clone)]
pub struct DeliveryHandle {
    shared: Arc<ReaderShared>,
}

impl DeliveryHandle {
    /// Accepts a chunk the host delivered for `request_offset`. A chunk whose
    /// offset no longer matches the logical offset answers a request made
    /// before a `skip`/`seek` and is dropped.
    pub fn deliver_chunk(&self, chunk: Bytes, request_offset: i64) {
        let mut state = self.shared.state.lock();
        if request_offset != state.offset {
            trace!(
                request_offset,
                current = state.offset,
                "dropping stale chunk delivery"
            );
            return;
        }

        let fill = state.fill;
        state.buffers[fill] = chunk;
        state.available = true;
        self.shared.ready.notify_one();
    }

    /// Records a failed chunk request and releases a blocked `read`.
    pub fn deliver_error(&self) {
        let mut state = self.shared.state.lock();
        state.error = true;
        self.shared.ready.notify_one();
    }
}

/// The production [`StreamSource`]: a synchronous facade over the host's
/// asynchronous chunk channel, with double-buffered read-ahead.
pub struct ChunkStreamReader {
    request_id: String,
    archive_size: i64,
    shared: Arc<ReaderShared>,
    requestor: Arc<dyn ChunkRequestor>,
    /// Consumed-chunk memo; also satisfies read-ahead for offsets a parser
    /// restart re-reads. Worker-thread only.
    header_cache: Option<Rc<HeaderCache>>,
    /// Buffer most recently handed to the parser. Keeping it out of the
    /// shared state lets the parser hold the slice while the main thread
    /// fills the other buffer.
    current: Bytes,
    hint: usize,
    config: VolumeConfig,
}

impl ChunkStreamReader {
    pub fn new(
        request_id: impl Into<String>,
        archive_size: i64,
        requestor: Arc<dyn ChunkRequestor>,
        header_cache: Option<Rc<HeaderCache>>,
        config: VolumeConfig,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            archive_size,
            shared: Arc::new(ReaderShared {
                state: Mutex::new(ReaderState {
                    buffers: [Bytes::new(), Bytes::new()],
                    fill: 0,
                    available: false,
                    error: false,
                    offset: 0,
                }),
                ready: Condvar::new(),
            }),
            requestor,
            header_cache,
            current: Bytes::new(),
            hint: config.read_ahead_min,
            config,
        }
    }

    /// Returns the handle the volume registers in its request map. Must be
    /// registered before [`prime`](Self::prime) so the first delivery finds
    /// the reader.
    pub fn delivery_handle(&self) -> DeliveryHandle {
        DeliveryHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Starts read-ahead of the first chunk. Called once, after the delivery
    /// handle is registered.
    pub fn prime(&mut self) {
        self.read_ahead(self.config.read_ahead_min);
    }

    pub fn archive_size(&self) -> i64 {
        self.archive_size
    }

    /// Issues the next chunk request, or satisfies it from the header cache
    /// when this exact offset was consumed before (parser restarts replay the
    /// same offsets).
    fn read_ahead(&mut self, length: usize) {
        let mut state = self.shared.state.lock();
        if state.offset >= self.archive_size {
            return;
        }

        let remaining = self.archive_size - state.offset;
        let length = (length as i64).min(remaining);
        if length <= 0 {
            return;
        }

        state.available = false;

        if let Some(cache) = &self.header_cache {
            if let Some(cached) = cache.get_header(state.offset) {
                let take = (cached.len() as i64).min(remaining) as usize;
                let fill = state.fill;
                trace!(offset = state.offset, take, "read-ahead served from header cache");
                state.buffers[fill] = cached.slice(..take);
                state.available = true;
                return;
            }
        }

        let offset = state.offset;
        drop(state);

        trace!(request_id = %self.request_id, offset, length, "requesting chunk");
        self.requestor
            .request_chunk(&self.request_id, offset, length);
    }

    /// Read-ahead sizing: proportional to the current read (or the adapter's
    /// advisory hint), bounded by the configured chunk-request window.
    fn next_request_len(&self, max_bytes: usize) -> usize {
        max_bytes
            .max(self.hint)
            .clamp(self.config.read_ahead_min, self.config.read_ahead_max)
    }
}

impl StreamSource for ChunkStreamReader {
    /// The real stream lives on the host side; nothing to open here.
    fn open(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn read(&mut self, max_bytes: usize) -> Result<&[u8], SourceError> {
        let bytes_read;
        {
            let mut state = self.shared.state.lock();
            if state.offset >= self.archive_size {
                return Ok(&[]);
            }

            while !state.available {
                if state.error {
                    return Err(SourceError::ReadFailed);
                }
                self.shared.ready.wait(&mut state);
            }

            let consumed = state.fill;
            let chunk_offset = state.offset;
            self.current = std::mem::take(&mut state.buffers[consumed]);
            bytes_read = self.current.len().min(max_bytes);
            state.offset += bytes_read as i64;
            state.fill = 1 - consumed;

            if let Some(cache) = &self.header_cache {
                cache.add_header(chunk_offset, &self.current);
            }
        }

        // Ask for the next chunk in the other buffer. This is the only place
        // buffers swap: the parser keeps the returned slice valid until its
        // next read, while the host fills the idle buffer.
        let next = self.next_request_len(max_bytes);
        self.read_ahead(next);

        Ok(&self.current[..bytes_read])
    }

    fn skip(&mut self, bytes_to_skip: i64) -> i64 {
        {
            let mut state = self.shared.state.lock();
            // Corrupted archives can produce invalid skips. Report 0 so the
            // parser falls back to read and surfaces its own error instead of
            // silently stopping.
            if bytes_to_skip < 0 || self.archive_size - state.offset < bytes_to_skip {
                return 0;
            }
            state.offset += bytes_to_skip;
        }

        // The next read starts at a fresh offset, so restart read-ahead at
        // the minimum request size.
        self.read_ahead(self.config.read_ahead_min);
        bytes_to_skip
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, SourceError> {
        let new_offset;
        {
            let mut state = self.shared.state.lock();
            let base = match whence {
                Whence::Set => 0,
                Whence::Cur => state.offset,
                Whence::End => self.archive_size,
            };
            new_offset = base
                .checked_add(offset)
                .ok_or(SourceError::SeekOutOfBounds)?;
            if new_offset < 0 || new_offset > self.archive_size {
                return Err(SourceError::SeekOutOfBounds);
            }
            state.offset = new_offset;
        }

        self.read_ahead(self.config.read_ahead_min);
        Ok(new_offset)
    }

    /// The host owns the underlying stream; nothing to release here.
    fn close(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn request_hint(&self) -> usize {
        self.hint
    }

    fn set_request_hint(&mut self, bytes: usize) {
        self.hint = bytes;
    }
}
