use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BtrieveError {
    /// Neither the database nor a `.VIR` virgin copy exists.
    #[error("database file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("malformed database file: {reason}")]
    MalformedFile { reason: String },

    /// Record length mismatch on update. Inserts only warn.
    #[error("record length mismatch: expected {expected} bytes, got {actual}")]
    MalformedRecord { expected: usize, actual: usize },

    #[error("operation code {code} is not implemented")]
    UnsupportedOperation { code: u16 },

    #[error("key {number} is not defined for this file")]
    InvalidKey { number: u16 },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("structured mirror: {0}")]
    Mirror(#[from] serde_json::Error),

    #[error("sqlite mirror: {0}")]
    Sqlite(#[from] rusqlite::Error),
}
