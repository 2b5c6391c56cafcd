//! Message protocol between the archive mount core and its host channel
//!
//! The host environment exposes a remote archive over an asynchronous message
//! channel. Every message is a keyed record carrying an integer operation code
//! plus `file_system_id` and `request_id` correlation strings. This crate
//! defines the typed form of those records:
//! - Operation codes and the request/response message enums
//! - Decimal-string encoding for 64-bit integer fields (the transport's
//!   numeric type is 32-bit)
//! - The metadata tree node returned by `READ_METADATA_DONE`

pub mod decimal;
pub mod message;
pub mod metadata;

pub use message::{HostRequest, HostResponse, Operation};
pub use metadata::MetadataNode;

/// Path separator used inside archives and by host-supplied absolute paths.
pub const PATH_DELIMITER: char = '/';
