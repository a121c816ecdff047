use thiserror::Error;
use weft_core::ErrorKind;

use super::RunMode;

#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Invalid recorder configuration: {0}")]
    InvalidConfig(String),

    #[error("{actual} result cannot be recorded in mode {expected}")]
    ModeMismatch { expected: RunMode, actual: RunMode },

    #[error("Invalid stored data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RecorderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) | Self::ModeMismatch { .. } => ErrorKind::InvalidConfig,
            Self::InvalidData(_) | Self::Database(_) => ErrorKind::Database,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, RecorderError>;
