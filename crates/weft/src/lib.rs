//! # weft
//!
//! Provider adapters, the GEPA reflective prompt optimizer, the evaluator plugin boundary,
//! dataset loading and run recording, built on the turn and middleware model of `weft-core`.

pub mod app;
pub mod config;
pub mod dataset;
pub mod error;
pub mod gepa;
pub mod logging;
pub mod plugin;
pub mod providers;
pub mod recorder;

// Re-export core types
pub use weft_core::{
    Block, BlockKind, CoreError, Engine, EngineExt, ErrorKind, InferenceContext, Middleware,
    SharedEngine, ToolConfig, ToolRegistry, Turn,
};

pub use app::{AppMetadata, InferenceApp, InferenceAppBuilder};
pub use config::WeftConfig;
pub use dataset::{DatasetFormat, load_dataset, parse_dataset};
pub use error::{Result as WeftResult, WeftError};
pub use gepa::{Candidate, EvalResult, Evaluator, OptimizeResult, Optimizer, OptimizerConfig, Reflector};
pub use logging::init_tracing;
pub use providers::{EngineFactory, ProviderSettings};
pub use recorder::{RunRecorder, RunSession, SqliteRunRecorder};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::app::InferenceApp;
    pub use crate::gepa::{Candidate, EvalResult, Optimizer, OptimizerConfig, Reflector};
    pub use weft_core::{Block, Engine, InferenceContext, Turn};
}
