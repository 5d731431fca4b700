//! Error types for whitelist generation

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WhitelistError>;

#[derive(Debug, Error)]
pub enum WhitelistError {
    #[error("Failed to load config from {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to read login log {path}: {source}")]
    LogRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Whitelist database is busy: another run holds the write lock")]
    StoreBusy,

    #[error("Whitelist database error: {0}")]
    Database(#[source] rusqlite::Error),

    #[error("Invalid data in whitelist database: {0}")]
    InvalidData(String),

    #[error("Failed to write draft report {path}: {source}")]
    ReportWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WhitelistError {
    /// Whether the error is a transient conflict that a scheduler can
    /// simply retry on the next cycle
    pub fn is_retriable(&self) -> bool {
        matches!(self, WhitelistError::StoreBusy)
    }
}

impl From<rusqlite::Error> for WhitelistError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DatabaseBusy
                    || e.code == rusqlite::ErrorCode::DatabaseLocked =>
            {
                WhitelistError::StoreBusy
            }
            other => WhitelistError::Database(other),
        }
    }
}
