use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExpansionError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("data integrity violation: {0}")]
    DataIntegrityViolation(String),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable label for an error, used in run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Configuration,
    StoreUnavailable,
    DataIntegrityViolation,
    Worker,
    Io,
}

impl ExpansionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(_) | Self::Json(_) => ErrorKind::Configuration,
            Self::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
            Self::DataIntegrityViolation(_) => ErrorKind::DataIntegrityViolation,
            Self::Worker(_) => ErrorKind::Worker,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<rusqlite::Error> for ExpansionError {
    fn from(err: rusqlite::Error) -> Self {
        match err.sqlite_error_code() {
            Some(rusqlite::ErrorCode::ConstraintViolation) => {
                Self::DataIntegrityViolation(err.to_string())
            }
            _ => Self::StoreUnavailable(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExpansionError>;
