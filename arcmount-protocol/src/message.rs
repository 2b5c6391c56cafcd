//! Typed request and response messages
//!
//! Requests travel host -> core, responses core -> host. The concrete record
//! serializer lives on the host side of the channel; the core only ever sees
//! and produces these typed forms. Field names follow the wire keys
//! (`file_system_id`, `request_id`, `open_request_id`, ...).

use bytes::Bytes;

use crate::metadata::MetadataNode;

/// Operation codes shared with the host side of the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Operation {
    ReadMetadata = 0,
    ReadMetadataDone = 1,
    ReadChunk = 2,
    ReadChunkDone = 3,
    ReadChunkError = 4,
    CloseVolume = 5,
    OpenFile = 6,
    OpenFileDone = 7,
    CloseFile = 8,
    CloseFileDone = 9,
    ReadFile = 10,
    ReadFileDone = 11,
    FileSystemError = -1,
}

impl Operation {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::ReadMetadata,
            1 => Self::ReadMetadataDone,
            2 => Self::ReadChunk,
            3 => Self::ReadChunkDone,
            4 => Self::ReadChunkError,
            5 => Self::CloseVolume,
            6 => Self::OpenFile,
            7 => Self::OpenFileDone,
            8 => Self::CloseFile,
            9 => Self::CloseFileDone,
            10 => Self::ReadFile,
            11 => Self::ReadFileDone,
            -1 => Self::FileSystemError,
            _ => return None,
        })
    }
}

/// A message from the host to the core.
///
/// `ReadChunkDone` / `ReadChunkError` answer a `ReadChunk` the core issued
/// earlier and reuse its request id; everything else opens a new operation.
#[derive(Debug, Clone)]
pub enum HostRequest {
    ReadMetadata {
        file_system_id: String,
        request_id: String,
        archive_size: i64,
    },
    ReadChunkDone {
        file_system_id: String,
        request_id: String,
        chunk_buffer: Bytes,
        offset: i64,
    },
    ReadChunkError {
        file_system_id: String,
        request_id: String,
    },
    CloseVolume {
        file_system_id: String,
    },
    OpenFile {
        file_system_id: String,
        request_id: String,
        file_path: String,
        archive_size: i64,
    },
    CloseFile {
        file_system_id: String,
        request_id: String,
        open_request_id: String,
    },
    ReadFile {
        file_system_id: String,
        request_id: String,
        open_request_id: String,
        offset: i64,
        length: i64,
    },
}

impl HostRequest {
    pub fn operation(&self) -> Operation {
        match self {
            Self::ReadMetadata { .. } => Operation::ReadMetadata,
            Self::ReadChunkDone { .. } => Operation::ReadChunkDone,
            Self::ReadChunkError { .. } => Operation::ReadChunkError,
            Self::CloseVolume { .. } => Operation::CloseVolume,
            Self::OpenFile { .. } => Operation::OpenFile,
            Self::CloseFile { .. } => Operation::CloseFile,
            Self::ReadFile { .. } => Operation::ReadFile,
        }
    }

    pub fn file_system_id(&self) -> &str {
        match self {
            Self::ReadMetadata { file_system_id, .. }
            | Self::ReadChunkDone { file_system_id, .. }
            | Self::ReadChunkError { file_system_id, .. }
            | Self::CloseVolume { file_system_id }
            | Self::OpenFile { file_system_id, .. }
            | Self::CloseFile { file_system_id, .. }
            | Self::ReadFile { file_system_id, .. } => file_system_id,
        }
    }
}

/// A message from the core to the host.
///
/// `ReadChunk` is the core asking for raw archive bytes; it is an
/// intra-operation exchange and never terminal. All the `*Done` variants and
/// `FileSystemError` conclude the operation for their request id.
#[derive(Debug, Clone)]
pub enum HostResponse {
    ReadMetadataDone {
        file_system_id: String,
        request_id: String,
        metadata: MetadataNode,
    },
    ReadChunk {
        file_system_id: String,
        request_id: String,
        offset: i64,
        length: i64,
    },
    OpenFileDone {
        file_system_id: String,
        request_id: String,
    },
    CloseFileDone {
        file_system_id: String,
        request_id: String,
        open_request_id: String,
    },
    ReadFileDone {
        file_system_id: String,
        request_id: String,
        read_file_data: Bytes,
        has_more_data: bool,
    },
    FileSystemError {
        file_system_id: String,
        request_id: String,
        error: String,
    },
}

impl HostResponse {
    pub fn operation(&self) -> Operation {
        match self {
            Self::ReadMetadataDone { .. } => Operation::ReadMetadataDone,
            Self::ReadChunk { .. } => Operation::ReadChunk,
            Self::OpenFileDone { .. } => Operation::OpenFileDone,
            Self::CloseFileDone { .. } => Operation::CloseFileDone,
            Self::ReadFileDone { .. } => Operation::ReadFileDone,
            Self::FileSystemError { .. } => Operation::FileSystemError,
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::ReadMetadataDone { request_id, .. }
            | Self::ReadChunk { request_id, .. }
            | Self::OpenFileDone { request_id, .. }
            | Self::CloseFileDone { request_id, .. }
            | Self::ReadFileDone { request_id, .. }
            | Self::FileSystemError { request_id, .. } => request_id,
        }
    }

    /// Whether this response concludes the operation for its request id.
    pub fn is_terminal(&self) -> bool {
        match self {
            Self::ReadChunk { .. } => false,
            Self::ReadFileDone { has_more_data, .. } => !has_more_data,
            _ => true,
        }
    }
}
