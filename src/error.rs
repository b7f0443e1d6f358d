use std::io;
use thiserror::Error;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, CombineError>;

/// Unified error type for all archive operations
#[derive(Debug, Error)]
pub enum CombineError {
    // Path errors
    #[error("Invalid archive path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },

    #[error("Path already present in archive: {0}")]
    DuplicatePath(String),

    #[error("Path not found in archive: {0}")]
    UnknownPath(String),

    // Master errors
    #[error("Cannot mark {requested} as master: {current} is already the master entry")]
    ConflictingMaster { requested: String, current: String },

    #[error("Manifest declares more than one master entry: {0:?}")]
    AmbiguousMaster(Vec<String>),

    // Document errors
    #[error("Not a COMBINE archive: {0}")]
    NotACombineArchive(String),

    #[error("Malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("Malformed metadata: {0}")]
    MalformedMetadata(String),

    #[error("Malformed timestamp {0:?}: expected an RFC 3339 date-time with offset")]
    MalformedTimestamp(String),

    #[error("Invalid format identifier: {0}")]
    InvalidFormat(String),

    // Container errors
    #[error("Corrupt container: {0}")]
    CorruptContainer(String),

    #[error("Reserved path cannot be used for content: {0}")]
    ReservedPath(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CombineError {
    pub(crate) fn invalid_path(path: impl Into<String>, reason: &'static str) -> Self {
        CombineError::InvalidPath {
            path: path.into(),
            reason,
        }
    }
}

impl From<zip::result::ZipError> for CombineError {
    fn from(err: zip::result::ZipError) -> Self {
        match err {
            zip::result::ZipError::Io(e) => CombineError::Io(e),
            other => CombineError::CorruptContainer(other.to_string()),
        }
    }
}

impl From<toml::de::Error> for CombineError {
    fn from(err: toml::de::Error) -> Self {
        CombineError::Config(err.to_string())
    }
}
