//! Persistence of optimizer and eval runs
//!
//! A [`RunSession`] buffers the run row plus candidate or per-example rows and hands them to a
//! [`RunRecorder`] in a single `save` when the run finishes.

pub mod error;
pub mod in_memory;
pub mod record;
pub mod session;
pub mod sqlite;

pub use error::{RecorderError, Result};
pub use in_memory::InMemoryRunRecorder;
pub use record::{CandidateMetricRow, EvalExampleRow, RunMode, RunRecord, RunStatus};
pub use session::{RunConfig, RunSession};
pub use sqlite::SqliteRunRecorder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Storage backend for run records
#[async_trait]
pub trait RunRecorder: Send + Sync {
    /// Insert or replace a run and its rows atomically
    async fn save(
        &self,
        run: &RunRecord,
        candidates: &[CandidateMetricRow],
        evals: &[EvalExampleRow],
    ) -> Result<()>;

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>>;

    /// Newest first
    async fn list_runs(&self) -> Result<Vec<RunRecord>>;

    async fn list_candidates(&self, run_id: &str) -> Result<Vec<CandidateMetricRow>>;

    async fn list_eval_examples(&self, run_id: &str) -> Result<Vec<EvalExampleRow>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub enabled: bool,
    pub db_path: PathBuf,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            db_path: PathBuf::from("gepa_runs.sqlite"),
        }
    }
}

impl RecorderConfig {
    /// Open the configured backend, or `None` when recording is disabled
    pub async fn open(&self) -> Result<Option<Arc<dyn RunRecorder>>> {
        if !self.enabled {
            return Ok(None);
        }
        let recorder = SqliteRunRecorder::connect(&self.db_path).await?;
        Ok(Some(Arc::new(recorder)))
    }
}
