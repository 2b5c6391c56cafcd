//! Offset-keyed cache of small archive prefixes
//!
//! Backward seeks inside compressed entries restart the format parser, and a
//! restart re-reads the same header offsets it read the first time. The cache
//! memoizes the first bytes of each chunk so restarts (and re-opens of the
//! same archive) skip the host round-trip for those offsets.
//!
//! Not thread safe: all access happens on the owning volume's worker thread,
//! which is the only thread that runs parser code.

use std::cell::RefCell;
use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::trace;

use crate::config::VolumeConfig;

pub struct HeaderCache {
    entries: RefCell<BTreeMap<i64, Bytes>>,
    /// Maximum bytes stored per entry.
    header_max: usize,
    /// Entry-count bound; a full cache ignores further additions instead of
    /// evicting, since the offsets added first are the hot ones.
    capacity: usize,
}

impl HeaderCache {
    pub fn new(config: &VolumeConfig) -> Self {
        Self {
            entries: RefCell::new(BTreeMap::new()),
            header_max: config.header_max,
            capacity: config.header_cache_capacity,
        }
    }

    /// Stores up to `header_max` bytes starting at `offset`. Re-adding an
    /// existing offset and adding to a full cache are both no-ops.
    pub fn add_header(&self, offset: i64, bytes: &[u8]) {
        debug_assert!(offset >= 0);
        if bytes.is_empty() {
            return;
        }

        let mut entries = self.entries.borrow_mut();
        if entries.len() >= self.capacity || entries.contains_key(&offset) {
            return;
        }

        let stored = bytes.len().min(self.header_max);
        trace!(offset, stored, "caching header bytes");
        entries.insert(offset, Bytes::copy_from_slice(&bytes[..stored]));
    }

    /// Returns the bytes of the first `add_header` made with `offset`, if any.
    pub fn get_header(&self, offset: i64) -> Option<Bytes> {
        self.entries.borrow().get(&offset).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}
