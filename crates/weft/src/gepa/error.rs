use thiserror::Error;
use weft_core::{CoreError, ErrorKind};

#[derive(Error, Debug)]
pub enum GepaError {
    #[error("Invalid optimizer configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid reflection template: {0}")]
    InvalidTemplate(String),

    #[error("Invalid candidate: {0}")]
    InvalidCandidate(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Reflector failed: {0}")]
    Reflector(String),

    /// Failure reported by an evaluator, classified by the evaluator itself
    #[error("{message}")]
    Evaluation { kind: ErrorKind, message: String },

    #[error("evaluator failed for example {index}: {source}")]
    EvaluatorFailed {
        index: usize,
        #[source]
        source: Box<GepaError>,
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl GepaError {
    pub fn evaluation(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Evaluation {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::InvalidTemplate(_) => ErrorKind::InvalidTemplate,
            Self::InvalidCandidate(_) => ErrorKind::InvalidCandidate,
            Self::InvalidDataset(_) => ErrorKind::InvalidDataset,
            Self::Reflector(_) => ErrorKind::ReflectorFailure,
            Self::Evaluation { kind, .. } => *kind,
            Self::EvaluatorFailed { source, .. } => source.kind(),
            Self::Core(e) => e.kind(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GepaError>;
