//! Error types for collection services

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("collection not found: {0}")]
    NotFound(String),

    #[error("invalid range: offset {offset}, limit {limit}")]
    InvalidRange { offset: usize, limit: usize },

    #[error("{0}")]
    Unknown(String),
}

impl RemoteError {
    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

impl From<rusqlite::Error> for RemoteError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure => RemoteError::Unavailable(err.to_string()),
                _ if err.to_string().contains("no such table") => {
                    RemoteError::NotFound(err.to_string())
                }
                _ => RemoteError::Unknown(err.to_string()),
            },
            _ if err.to_string().contains("no such table") => RemoteError::NotFound(err.to_string()),
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => {
                RemoteError::Unknown(format!("malformed record: {}", err))
            }
            _ => RemoteError::Unknown(err.to_string()),
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;
