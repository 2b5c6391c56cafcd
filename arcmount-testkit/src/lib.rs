//! Test doubles for the archive session engine
//!
//! - [`ScriptedArchive`] / [`ScriptedParser`]: a controllable format parser
//!   over an in-memory archive image, with per-stage failure switches
//! - [`MemorySource`]: a plain [`StreamSource`] over a byte buffer, for
//!   driving the adapter without any host machinery
//! - [`FakeHost`]: records every core-to-host response and answers chunk
//!   requests from the image, inline or under manual test control

mod host;
mod memory;
mod scripted;

pub use host::{ChunkService, ChunkSink, FakeHost};
pub use memory::MemorySource;
pub use scripted::{
    ScriptedArchive, ScriptedBehavior, ScriptedEntry, ScriptedParser, ScriptedParserFactory,
    ENTRY_HEADER_LEN, MAGIC_LEN, PARSER_ERROR,
};
