//! Error types for the weft crate

use thiserror::Error;
use weft_core::ErrorKind;

use crate::dataset::DatasetError;
use crate::gepa::GepaError;
use crate::plugin::PluginError;
use crate::recorder::RecorderError;

#[derive(Error, Debug)]
pub enum WeftError {
    #[error("Core error: {0}")]
    Core(#[from] weft_core::CoreError),

    #[error("Optimizer error: {0}")]
    Gepa(#[from] GepaError),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Recorder error: {0}")]
    Recorder(#[from] RecorderError),

    #[error("Build error: {0}")]
    Build(String),
}

impl WeftError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            Self::Gepa(e) => e.kind(),
            Self::Plugin(e) => e.kind(),
            Self::Dataset(e) => e.kind(),
            Self::Recorder(e) => e.kind(),
            Self::Build(_) => ErrorKind::InvalidConfig,
        }
    }
}

pub type Result<T> = std::result::Result<T, WeftError>;
