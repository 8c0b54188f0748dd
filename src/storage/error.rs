//! Data Store Gateway Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("no data: both extrema aggregates were null")]
    NoData,

    #[error("parse error: {0}")]
    ParseError(String),

    #[error("{0}")]
    Other(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

impl From<StorageError> for crate::error::OrchestrationError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NoData => crate::error::OrchestrationError::NoData,
            other => crate::error::OrchestrationError::StorageError(other.to_string()),
        }
    }
}
