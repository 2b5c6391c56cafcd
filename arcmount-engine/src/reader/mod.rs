//! Synchronous byte sources for the format parser
//!
//! The format parser expects a blocking random-access source with the usual
//! read/skip/seek/close shape. [`StreamSource`] is that contract;
//! [`ChunkStreamReader`] is the production implementation that satisfies it by
//! driving an asynchronous chunk-request channel to the host.

mod chunk_stream;

pub use chunk_stream::{ChunkRequestor, ChunkStreamReader, DeliveryHandle};

use thiserror::Error;

/// Origin for [`StreamSource::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

/// Fatal failure of a byte source. Reaching the parser, any variant surfaces
/// as the stable reader-failure message so the parser's error reporting never
/// depends on source internals.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceError {
    /// The host answered a chunk request with an error.
    #[error("chunk delivery failed")]
    ReadFailed,
    /// A seek target fell outside `[0, archive_size]`.
    #[error("seek outside archive bounds")]
    SeekOutOfBounds,
}

/// A synchronous byte source driven by the format parser.
///
/// `read` is the only call that may block. `skip` reports 0 on any invalid
/// argument instead of failing, so the parser falls back to `read` and
/// surfaces its own, more precise error for a malformed archive.
pub trait StreamSource {
    /// Opens the source. The production source is demand-pulled, so this
    /// trivially succeeds.
    fn open(&mut self) -> Result<(), SourceError>;

    /// Returns the next run of bytes, at most `max_bytes` long. An empty
    /// slice signals end of archive. The returned bytes stay valid until the
    /// next `read` call.
    fn read(&mut self, max_bytes: usize) -> Result<&[u8], SourceError>;

    /// Advances the logical offset without producing bytes. Returns the bytes
    /// skipped, or 0 when `bytes_to_skip` is negative or overshoots the end.
    fn skip(&mut self, bytes_to_skip: i64) -> i64;

    /// Moves the logical offset. The new offset must land inside
    /// `[0, archive_size]`.
    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, SourceError>;

    /// Closes the source.
    fn close(&mut self) -> Result<(), SourceError>;

    /// Advisory size for the next `read`, tuned by the adapter between calls
    /// (small while parsing headers, larger while decompressing entry data).
    fn request_hint(&self) -> usize;

    fn set_request_hint(&mut self, bytes: usize);
}
