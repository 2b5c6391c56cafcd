//! Adapter between the volume and the format parser
//!
//! [`SessionAdapter`] owns one parser instance plus the byte source feeding
//! it, and maintains the per-entry extraction state. Its main job beyond
//! forwarding calls is offset bookkeeping: compressed entries cannot seek, so
//! a read behind the last position tears the parser down and replays the
//! archive from the start, and a read ahead of it decompresses the gap into a
//! scratch buffer.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::config::VolumeConfig;
use crate::error::{EngineError, Result};
use crate::parser::{ArchiveEntry, FormatParser, ParserFactory, SUPPORTED_FORMATS};
use crate::reader::{StreamSource, Whence};

const NOT_OPEN: &str = "archive is not open";

/// Per-session archive surface as the volume drives it. The default
/// implementation is [`SessionAdapter`]; alternates can be substituted
/// through [`AdapterFactory`] without the volume noticing.
pub trait ArchiveAdapter {
    /// Prepares the parser. Call once; on failure the session is unusable but
    /// `cleanup` must still run.
    fn init(&mut self) -> Result<()>;

    /// Advances to the next entry header. `None` means end of archive.
    fn next_header(&mut self) -> Result<Option<ArchiveEntry>>;

    /// Fills `buf` with decompressed bytes of the current entry starting at
    /// `offset`, returning how many were produced. Fewer than `buf.len()`
    /// bytes (or 0) means the entry ended; the rest of `buf` is untouched.
    fn read_data(&mut self, offset: i64, buf: &mut [u8]) -> Result<usize>;

    /// Releases the parser and the source. Safe to call repeatedly; failure
    /// still releases everything.
    fn cleanup(&mut self) -> Result<()>;
}

/// Creates one adapter per session.
pub trait AdapterFactory: Send + Sync {
    fn create_adapter(&self, request_id: &str, source: Box<dyn StreamSource>)
        -> Box<dyn ArchiveAdapter>;
}

/// Default [`AdapterFactory`] wiring [`SessionAdapter`] to a parser factory.
pub struct ParserAdapterFactory {
    parser_factory: Arc<dyn ParserFactory>,
    config: VolumeConfig,
}

impl ParserAdapterFactory {
    pub fn new(parser_factory: Arc<dyn ParserFactory>, config: VolumeConfig) -> Self {
        Self {
            parser_factory,
            config,
        }
    }
}

impl AdapterFactory for ParserAdapterFactory {
    fn create_adapter(
        &self,
        request_id: &str,
        source: Box<dyn StreamSource>,
    ) -> Box<dyn ArchiveAdapter> {
        Box::new(SessionAdapter::new(
            request_id,
            Arc::clone(&self.parser_factory),
            source,
            self.config,
        ))
    }
}

/// The default adapter implementation.
pub struct SessionAdapter {
    request_id: String,
    parser_factory: Arc<dyn ParserFactory>,
    parser: Option<Box<dyn FormatParser>>,
    source: Option<Box<dyn StreamSource>>,
    current_entry: Option<ArchiveEntry>,
    /// Byte position inside the current entry after the last successful read.
    /// Consecutive reads continue from here; a smaller requested offset means
    /// a backward seek and forces a parser restart.
    last_read_offset: i64,
    /// Scratch space for decompressing the gap when a read starts ahead of
    /// `last_read_offset`.
    dummy: Box<[u8]>,
    config: VolumeConfig,
}

impl SessionAdapter {
    pub fn new(
        request_id: impl Into<String>,
        parser_factory: Arc<dyn ParserFactory>,
        source: Box<dyn StreamSource>,
        config: VolumeConfig,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            parser_factory,
            parser: None,
            source: Some(source),
            current_entry: None,
            last_read_offset: 0,
            dummy: vec![0u8; config.dummy_buffer_max].into_boxed_slice(),
            config,
        }
    }

    fn data_hint(&self, wanted: i64) -> usize {
        (wanted.max(0) as usize).clamp(self.config.read_ahead_min, self.config.read_ahead_max)
    }

    /// Restarts the parser from archive offset 0 and walks entries until
    /// `path` reappears.
    fn rewind_to_entry(&mut self, path: &str) -> Result<()> {
        debug!(
            request_id = %self.request_id,
            path,
            "backward seek inside entry, restarting parser"
        );

        if let Some(mut parser) = self.parser.take() {
            parser
                .close()
                .map_err(|e| EngineError::ReadData(e.to_string()))?;
        }
        let Some(source) = self.source.as_deref_mut() else {
            return Err(EngineError::ReadData(NOT_OPEN.into()));
        };
        source
            .seek(0, Whence::Set)
            .map_err(|e| EngineError::ReadData(e.to_string()))?;

        self.init()?;

        loop {
            match self.next_header()? {
                None => return Err(EngineError::EntryNotFound),
                Some(entry) if entry.path == path => return Ok(()),
                Some(_) => {}
            }
        }
    }
}

impl ArchiveAdapter for SessionAdapter {
    fn init(&mut self) -> Result<()> {
        let parser = self
            .parser_factory
            .create_parser()
            .ok_or(EngineError::ArchiveNew)?;
        self.parser = Some(parser);
        let header_hint = self.config.header_read_hint;

        let Self { parser, source, .. } = self;
        let (Some(parser), Some(source)) = (parser.as_deref_mut(), source.as_deref_mut()) else {
            return Err(EngineError::ArchiveOpen(NOT_OPEN.into()));
        };

        parser
            .register_formats(SUPPORTED_FORMATS)
            .map_err(|e| EngineError::FormatSupport(e.to_string()))?;

        source
            .open()
            .map_err(|e| EngineError::ArchiveOpen(e.to_string()))?;
        source.set_request_hint(header_hint);
        parser
            .open(source)
            .map_err(|e| EngineError::ArchiveOpen(e.to_string()))?;

        Ok(())
    }

    fn next_header(&mut self) -> Result<Option<ArchiveEntry>> {
        // A new entry restarts read_data bookkeeping, and headers need far
        // smaller chunks than entry data.
        self.last_read_offset = 0;
        let hint = self.config.header_read_hint;

        let Self { parser, source, .. } = self;
        let (Some(parser), Some(source)) = (parser.as_deref_mut(), source.as_deref_mut()) else {
            return Err(EngineError::NextHeader(NOT_OPEN.into()));
        };
        source.set_request_hint(hint);

        match parser.next_entry(source) {
            Ok(Some(entry)) => {
                trace!(request_id = %self.request_id, path = %entry.path, "entry header");
                self.current_entry = Some(entry.clone());
                Ok(Some(entry))
            }
            Ok(None) => {
                self.current_entry = None;
                Ok(None)
            }
            Err(e) => Err(EngineError::NextHeader(e.to_string())),
        }
    }

    fn read_data(&mut self, offset: i64, buf: &mut [u8]) -> Result<usize> {
        debug_assert!(!buf.is_empty(), "read_data requires a non-empty buffer");
        if buf.is_empty() {
            return Ok(0);
        }
        debug_assert!(
            self.current_entry.is_some(),
            "read_data requires a current entry"
        );
        let Some(current) = self.current_entry.as_ref() else {
            return Err(EngineError::ReadData(NOT_OPEN.into()));
        };

        if offset < self.last_read_offset {
            let path = current.path.clone();
            self.rewind_to_entry(&path)?;
        }

        // The entry is compressed, so everything between the last position
        // and the requested offset must be decompressed and discarded.
        while offset > self.last_read_offset {
            let gap = offset - self.last_read_offset;
            let hint = self.data_hint(gap);
            let want = gap.min(self.config.dummy_buffer_max as i64) as usize;

            let Self {
                parser,
                source,
                dummy,
                ..
            } = self;
            let (Some(parser), Some(source)) = (parser.as_deref_mut(), source.as_deref_mut())
            else {
                return Err(EngineError::ReadData(NOT_OPEN.into()));
            };
            source.set_request_hint(hint);

            let skipped = parser
                .read_block(source, &mut dummy[..want])
                .map_err(|e| EngineError::ReadData(e.to_string()))?;
            if skipped == 0 {
                // Entry ended before the requested offset; the read loop
                // below reports 0 bytes.
                break;
            }
            trace!(request_id = %self.request_id, skipped, "discarded gap bytes");
            self.last_read_offset += skipped as i64;
        }

        let hint = self.data_hint(buf.len() as i64);
        let Self { parser, source, .. } = self;
        let (Some(parser), Some(source)) = (parser.as_deref_mut(), source.as_deref_mut()) else {
            return Err(EngineError::ReadData(NOT_OPEN.into()));
        };
        source.set_request_hint(hint);

        let mut written = 0;
        loop {
            let produced = parser
                .read_block(source, &mut buf[written..])
                .map_err(|e| EngineError::ReadData(e.to_string()))?;
            written += produced;
            if produced == 0 || written == buf.len() {
                break;
            }
        }

        self.last_read_offset += written as i64;
        Ok(written)
    }

    fn cleanup(&mut self) -> Result<()> {
        let mut result = Ok(());
        if let Some(mut parser) = self.parser.take() {
            if let Err(e) = parser.close() {
                result = Err(EngineError::ArchiveFree(e.to_string()));
            }
        }
        // The source is released even when parser teardown failed.
        if let Some(mut source) = self.source.take() {
            let _ = source.close();
        }
        result
    }
}
