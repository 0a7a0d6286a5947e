// Error types for the tag store

use thiserror::Error;

/// Errors raised by the tag store and its collaborators.
///
/// Variants that describe corrupted databases (`MissingFileId`,
/// `MissingPath`, the `Illegal*Format` family) are unrecoverable for the
/// current operation; callers are expected to stop and report them.
#[derive(Debug, Error)]
pub enum TagError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{db} seems new format (version {found}). Please install the latest tagstore")]
    VersionTooNew { db: &'static str, found: i64 },

    #[error("{db} seems older format (version {found}). Please remake tag files")]
    VersionTooOld { db: &'static str, found: i64 },

    #[error("illegal tag format: '{0}'")]
    IllegalTagFormat(String),

    #[error("illegal standard format: '{0}'")]
    IllegalStandardFormat(String),

    #[error("illegal compact format: '{0}'")]
    IllegalCompactFormat(String),

    #[error("tag name too long ({len} bytes): '{tag}'")]
    TagTooLong { tag: String, len: usize },

    #[error("GPATH is corrupted ('{0}' not found)")]
    MissingFileId(String),

    #[error("GPATH is corrupted (file id '{0}' not found)")]
    MissingPath(u32),

    #[error("unexpected end of file '{path}' (line {line})")]
    UnexpectedEof { path: String, line: u32 },

    #[error("a source root directory is required for compact format")]
    MissingSourceRoot,

    #[error("{0} is opened read-only")]
    ReadOnly(&'static str),

    #[error("invalid abbreviation table: {0}")]
    InvalidAbbreviation(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TagError>;
