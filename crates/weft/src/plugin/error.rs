use thiserror::Error;
use weft_core::{CoreError, ErrorKind};

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Invalid plugin descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("evaluator return value missing required field: score")]
    MissingScore,

    #[error("Invalid plugin return value: {0}")]
    InvalidReturn(String),

    #[error("Plugin call failed: {0}")]
    CallFailed(String),

    #[error("Plugin has no dataset: {0}")]
    NoDataset(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl PluginError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidDescriptor(_) => ErrorKind::InvalidConfig,
            Self::MissingScore => ErrorKind::PluginMissingScore,
            Self::InvalidReturn(_) | Self::CallFailed(_) => ErrorKind::PluginInvalidReturn,
            Self::NoDataset(_) => ErrorKind::InvalidDataset,
            Self::Core(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PluginError>;
