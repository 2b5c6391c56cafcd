//! Deployment tunables for the session engine

/// Configuration shared by every session of a volume.
#[derive(Debug, Clone, Copy)]
pub struct VolumeConfig {
    /// Maximum bytes memoized per header cache entry.
    pub header_max: usize,
    /// Maximum number of header cache entries. A full cache silently drops
    /// later additions; earlier offsets are the hotter ones.
    pub header_cache_capacity: usize,
    /// Size of the scratch buffer used to discard bytes when skipping forward
    /// inside a compressed entry.
    pub dummy_buffer_max: usize,
    /// Smallest chunk request issued to the host.
    pub read_ahead_min: usize,
    /// Largest chunk request issued to the host.
    pub read_ahead_max: usize,
    /// Maximum payload of a single `READ_FILE_DONE` message.
    pub read_chunk_max: usize,
    /// Advisory request size while the parser is walking entry headers, which
    /// need far smaller chunks than entry data.
    pub header_read_hint: usize,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            header_max: 512,
            header_cache_capacity: 500_000,
            dummy_buffer_max: 512 * 1024,
            read_ahead_min: 10 * 1024,
            read_ahead_max: 512 * 1024,
            read_chunk_max: 512 * 1024,
            header_read_hint: 16 * 1024,
        }
    }
}
