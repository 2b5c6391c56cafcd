//! Memoization of archive header bytes

mod header_cache;

pub use header_cache::HeaderCache;
