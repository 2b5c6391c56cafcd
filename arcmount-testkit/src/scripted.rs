//! A controllable format parser over an in-memory archive image
//!
//! The scripted "format" is deliberately trivial: a magic prefix, then per
//! entry a fixed-size header region followed by the entry's stored bytes
//! (stored form == decompressed form). What matters is that the parser pulls
//! every byte it needs through the [`StreamSource`] it is driven with, so the
//! reader, the adapter's seek emulation, and the volume's chunk plumbing all
//! get exercised exactly as a real parser would exercise them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use arcmount_engine::{
    ArchiveEntry, ArchiveFormat, FormatParser, ParserError, ParserFactory, StreamSource,
};

/// Length of the image's magic prefix.
pub const MAGIC_LEN: usize = 16;
/// Length of the per-entry header region in the image.
pub const ENTRY_HEADER_LEN: usize = 64;

/// Error text reported by injected parser failures.
pub const PARSER_ERROR: &str = "An archive error.";

const MAGIC: &[u8; MAGIC_LEN] = b"ARCMOUNT-TEST-01";

/// One scripted entry. `size` is what the parser reports; `data` is what the
/// image stores (equal for ordinary files, free to differ for metadata-only
/// scenarios that never read entry bytes).
#[derive(Debug, Clone)]
pub struct ScriptedEntry {
    pub path: String,
    pub size: i64,
    pub is_directory: bool,
    pub modification_time: i64,
    pub data: Vec<u8>,
}

/// The archive a [`ScriptedParser`] walks, plus its byte image for whichever
/// source feeds the parser.
#[derive(Debug, Clone, Default)]
pub struct ScriptedArchive {
    entries: Vec<ScriptedEntry>,
}

impl ScriptedArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(mut self, path: &str, mtime: i64, data: Vec<u8>) -> Self {
        self.entries.push(ScriptedEntry {
            path: path.to_owned(),
            size: data.len() as i64,
            is_directory: false,
            modification_time: mtime,
            data,
        });
        self
    }

    pub fn add_dir(mut self, path: &str, mtime: i64) -> Self {
        self.entries.push(ScriptedEntry {
            path: path.to_owned(),
            size: 0,
            is_directory: true,
            modification_time: mtime,
            data: Vec::new(),
        });
        self
    }

    pub fn add_entry(mut self, entry: ScriptedEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn entries(&self) -> &[ScriptedEntry] {
        &self.entries
    }

    /// The raw archive image: magic, then header region + stored bytes per
    /// entry. This is what the fake host serves chunk requests from.
    pub fn image(&self) -> Vec<u8> {
        let mut image = MAGIC.to_vec();
        for entry in &self.entries {
            image.extend(std::iter::repeat(0xEE).take(ENTRY_HEADER_LEN));
            image.extend_from_slice(&entry.data);
        }
        image
    }

    pub fn archive_size(&self) -> i64 {
        self.image().len() as i64
    }
}

/// Failure switches, shared between the test and every parser instance the
/// factory hands out (rewinds create fresh instances, so the switches must
/// outlive any single one).
#[derive(Debug, Default)]
pub struct ScriptedBehavior {
    /// Factory returns no parser at all (allocation failure).
    pub fail_create: AtomicBool,
    pub fail_register_formats: AtomicBool,
    pub fail_open: AtomicBool,
    pub fail_next_entry: AtomicBool,
    pub fail_read_block: AtomicBool,
    pub fail_close: AtomicBool,
}

impl ScriptedBehavior {
    fn tripped(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

pub struct ScriptedParser {
    archive: Arc<ScriptedArchive>,
    behavior: Arc<ScriptedBehavior>,
    /// Index of the next entry `next_entry` reports.
    next_index: usize,
    /// Stored bytes of the current entry not yet consumed from the source.
    remaining: usize,
}

impl ScriptedParser {
    fn new(archive: Arc<ScriptedArchive>, behavior: Arc<ScriptedBehavior>) -> Self {
        Self {
            archive,
            behavior,
            next_index: 0,
            remaining: 0,
        }
    }

    fn parser_error() -> ParserError {
        ParserError::Format(PARSER_ERROR.to_owned())
    }

    /// Consumes exactly `count` bytes from the source, discarding them.
    fn consume(source: &mut dyn StreamSource, mut count: usize) -> Result<(), ParserError> {
        while count > 0 {
            let hint = source.request_hint();
            let chunk = source.read(hint.min(count))?;
            if chunk.is_empty() {
                return Err(ParserError::Format("unexpected end of archive".to_owned()));
            }
            count -= chunk.len();
        }
        Ok(())
    }
}

impl FormatParser for ScriptedParser {
    fn register_formats(&mut self, formats: &[ArchiveFormat]) -> Result<(), ParserError> {
        if ScriptedBehavior::tripped(&self.behavior.fail_register_formats) {
            return Err(Self::parser_error());
        }
        debug_assert!(formats.contains(&ArchiveFormat::Zip) && formats.contains(&ArchiveFormat::Rar));
        Ok(())
    }

    fn open(&mut self, source: &mut dyn StreamSource) -> Result<(), ParserError> {
        if ScriptedBehavior::tripped(&self.behavior.fail_open) {
            return Err(Self::parser_error());
        }
        Self::consume(source, MAGIC_LEN)
    }

    fn next_entry(
        &mut self,
        source: &mut dyn StreamSource,
    ) -> Result<Option<ArchiveEntry>, ParserError> {
        if ScriptedBehavior::tripped(&self.behavior.fail_next_entry) {
            return Err(Self::parser_error());
        }

        // Whatever the caller left unread of the previous entry is skipped,
        // falling back to plain reads when the source rejects the skip.
        if self.remaining > 0 {
            let skipped = source.skip(self.remaining as i64);
            if skipped == 0 {
                Self::consume(source, self.remaining)?;
            }
            self.remaining = 0;
        }

        let Some(entry) = self.archive.entries.get(self.next_index) else {
            return Ok(None);
        };
        Self::consume(source, ENTRY_HEADER_LEN)?;

        self.next_index += 1;
        self.remaining = entry.data.len();
        Ok(Some(ArchiveEntry {
            path: entry.path.clone(),
            size: entry.size,
            is_directory: entry.is_directory,
            modification_time: entry.modification_time,
        }))
    }

    fn read_block(
        &mut self,
        source: &mut dyn StreamSource,
        buf: &mut [u8],
    ) -> Result<usize, ParserError> {
        if ScriptedBehavior::tripped(&self.behavior.fail_read_block) {
            return Err(Self::parser_error());
        }

        let want = buf.len().min(self.remaining);
        let mut filled = 0;
        while filled < want {
            let chunk_len = {
                let chunk = source.read(want - filled)?;
                if chunk.is_empty() {
                    return Err(ParserError::Format("unexpected end of archive".to_owned()));
                }
                buf[filled..filled + chunk.len()].copy_from_slice(chunk);
                chunk.len()
            };
            filled += chunk_len;
        }

        self.remaining -= filled;
        Ok(filled)
    }

    fn close(&mut self) -> Result<(), ParserError> {
        if ScriptedBehavior::tripped(&self.behavior.fail_close) {
            return Err(Self::parser_error());
        }
        Ok(())
    }
}

/// Hands out [`ScriptedParser`] instances over one archive script.
///
/// The script can be swapped mid-test to model an archive that no longer
/// contains an entry when a rewind re-parses it.
pub struct ScriptedParserFactory {
    archive: Mutex<Arc<ScriptedArchive>>,
    behavior: Arc<ScriptedBehavior>,
}

impl ScriptedParserFactory {
    pub fn new(archive: ScriptedArchive) -> Self {
        Self {
            archive: Mutex::new(Arc::new(archive)),
            behavior: Arc::new(ScriptedBehavior::default()),
        }
    }

    pub fn behavior(&self) -> Arc<ScriptedBehavior> {
        Arc::clone(&self.behavior)
    }

    pub fn archive(&self) -> Arc<ScriptedArchive> {
        Arc::clone(&self.archive.lock())
    }

    /// Replaces the script; parsers created from now on walk the new one.
    pub fn set_archive(&self, archive: ScriptedArchive) {
        *self.archive.lock() = Arc::new(archive);
    }
}

impl ParserFactory for ScriptedParserFactory {
    fn create_parser(&self) -> Option<Box<dyn FormatParser>> {
        if ScriptedBehavior::tripped(&self.behavior.fail_create) {
            return None;
        }
        Some(Box::new(ScriptedParser::new(
            self.archive(),
            Arc::clone(&self.behavior),
        )))
    }
}
