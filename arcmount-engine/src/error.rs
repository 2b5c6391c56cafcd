//! Error types for the session engine
//!
//! Every variant's display string is the exact human-readable message that
//! reaches the host inside a `FILE_SYSTEM_ERROR` record, so the wording here
//! is part of the external contract.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Could not allocate archive.")]
    ArchiveNew,

    #[error("Error at support rar/zip format: {0}")]
    FormatSupport(String),

    #[error("Error at open archive: {0}")]
    ArchiveOpen(String),

    #[error("Error at reading next header for metadata: {0}")]
    NextHeader(String),

    #[error("Error at reading data: {0}")]
    ReadData(String),

    #[error("Error at archive free: {0}")]
    ArchiveFree(String),

    #[error("File not found for read data request.")]
    EntryNotFound,

    #[error("File not found in archive: {0}.")]
    FileNotFound(String),

    #[error("Could not create a volume for: {0}.")]
    CreateVolume(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;
