//! In-memory byte source

use arcmount_engine::{SourceError, StreamSource, Whence};

/// A [`StreamSource`] over a byte buffer, honoring the same skip/seek
/// contract as the production reader but without any host round-trips.
pub struct MemorySource {
    data: Vec<u8>,
    offset: i64,
    hint: usize,
}

impl MemorySource {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            offset: 0,
            hint: 16 * 1024,
        }
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    fn size(&self) -> i64 {
        self.data.len() as i64
    }
}

impl StreamSource for MemorySource {
    fn open(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn read(&mut self, max_bytes: usize) -> Result<&[u8], SourceError> {
        let start = self.offset.max(0) as usize;
        if start >= self.data.len() {
            return Ok(&[]);
        }
        let len = max_bytes.min(self.data.len() - start);
        self.offset += len as i64;
        Ok(&self.data[start..start + len])
    }

    fn skip(&mut self, bytes_to_skip: i64) -> i64 {
        if bytes_to_skip < 0 || self.size() - self.offset < bytes_to_skip {
            return 0;
        }
        self.offset += bytes_to_skip;
        bytes_to_skip
    }

    fn seek(&mut self, offset: i64, whence: Whence) -> Result<i64, SourceError> {
        let base = match whence {
            Whence::Set => 0,
            Whence::Cur => self.offset,
            Whence::End => self.size(),
        };
        let new_offset = base
            .checked_add(offset)
            .ok_or(SourceError::SeekOutOfBounds)?;
        if new_offset < 0 || new_offset > self.size() {
            return Err(SourceError::SeekOutOfBounds);
        }
        self.offset = new_offset;
        Ok(new_offset)
    }

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
