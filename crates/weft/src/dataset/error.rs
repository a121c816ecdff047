use thiserror::Error;
use weft_core::ErrorKind;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("Dataset path is empty")]
    EmptyPath,

    #[error("Invalid JSON on line {line}: {source}")]
    InvalidLine {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid JSON array: {0}")]
    InvalidArray(#[source] serde_json::Error),

    #[error("Dataset is empty")]
    Empty,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) => ErrorKind::Io,
            _ => ErrorKind::InvalidDataset,
        }
    }
}

pub type Result<T> = std::result::Result<T, DatasetError>;
