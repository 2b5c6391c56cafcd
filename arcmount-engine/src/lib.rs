//! Archive session engine for a browser-embedded archive mounter
//!
//! The host environment exposes a remote ZIP or RAR archive across an
//! asynchronous message channel and expects it mounted as a read-only
//! filesystem. This crate is the native core that services the four
//! filesystem-level requests (enumerate metadata, open a member, stream
//! decompressed bytes at arbitrary offsets, close a member) against that
//! remote archive:
//! - A demand-pulled [`reader::ChunkStreamReader`] that presents a synchronous
//!   random-access byte source while its actual source is an asynchronous
//!   chunk-request channel to the host
//! - A [`adapter::SessionAdapter`] that drives the format parser through that
//!   reader and emulates backward seeks inside compressed entries
//! - A [`volume::Volume`] owning the worker thread the parser runs on, the
//!   in-flight request map, and the protocol state machine matching host
//!   replies to the blocked worker
//! - A [`cache::HeaderCache`] memoizing the archive prefixes that parser
//!   restarts re-read

pub mod adapter;
pub mod cache;
pub mod config;
pub mod error;
pub mod host;
pub mod metadata;
pub mod parser;
pub mod reader;
pub mod registry;
pub mod volume;

pub use adapter::{AdapterFactory, ArchiveAdapter, ParserAdapterFactory, SessionAdapter};
pub use cache::HeaderCache;
pub use config::VolumeConfig;
pub use error::{EngineError, Result};
pub use host::HostSender;
pub use parser::{
    ArchiveEntry, ArchiveFormat, FormatParser, ParserError, ParserFactory, SUPPORTED_FORMATS,
};
pub use reader::{ChunkRequestor, ChunkStreamReader, SourceError, StreamSource, Whence};
pub use registry::VolumeRegistry;
pub use volume::Volume;
