//! The external format-parser seam
//!
//! Actual ZIP/RAR decoding is delegated to a parser library; the engine only
//! drives it. [`FormatParser`] is the shape of that library as the adapter
//! sees it: a sequential entry walker fed by a [`StreamSource`]. Parsers are
//! injected through [`ParserFactory`], both for substituting controllable
//! implementations in tests and because backward seeks restart the parser
//! from a fresh instance.

use thiserror::Error;

use crate::reader::{SourceError, StreamSource};

/// Container formats every session registers at open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    Rar,
}

pub const SUPPORTED_FORMATS: &[ArchiveFormat] = &[ArchiveFormat::Rar, ArchiveFormat::Zip];

/// One entry header, as reported by the parser. Paths come without a leading
/// `/`; the volume prepends one when comparing against host paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub size: i64,
    pub is_directory: bool,
    pub modification_time: i64,
}

/// Failure reported by a parser call.
///
/// When the parser only failed because its byte source did, the source error
/// is carried as its own variant and displays as the stable reader-failure
/// message, never as parser-owned text.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParserError {
    #[error("{0}")]
    Format(String),
    #[error("VolumeReader failed to retrieve data.")]
    Source(#[source] SourceError),
}

impl From<SourceError> for ParserError {
    fn from(err: SourceError) -> Self {
        Self::Source(err)
    }
}

/// A sequential archive parser driven through a [`StreamSource`].
///
/// The contract mirrors the underlying parser library: `register_formats`
/// then `open` exactly once, `next_entry` until it reports `None`,
/// `read_block` for the entry most recently returned, `close` to release the
/// instance. Calls may block inside the source's `read`.
pub trait FormatParser {
    /// Registers the container formats this session must detect.
    fn register_formats(&mut self, formats: &[ArchiveFormat]) -> Result<(), ParserError>;

    /// Reads enough of the archive start to detect the format and position at
    /// the first entry.
    fn open(&mut self, source: &mut dyn StreamSource) -> Result<(), ParserError>;

    /// Advances to the next entry header. `None` means end of archive. Any
    /// unconsumed data of the previous entry is skipped.
    fn next_entry(
        &mut self,
        source: &mut dyn StreamSource,
    ) -> Result<Option<ArchiveEntry>, ParserError>;

    /// Decompresses the next run of the current entry into `buf`, returning
    /// the bytes produced; 0 means the entry is exhausted.
    fn read_block(
        &mut self,
        source: &mut dyn StreamSource,
        buf: &mut [u8],
    ) -> Result<usize, ParserError>;

    /// Releases the parser instance.
    fn close(&mut self) -> Result<(), ParserError>;
}

/// Creates parser instances for sessions and for restart-after-rewind.
pub trait ParserFactory: Send + Sync {
    /// Returns a fresh parser, or `None` when allocation failed.
    fn create_parser(&self) -> Option<Box<dyn FormatParser>>;
}
