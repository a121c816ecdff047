use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunMode {
    Optimize,
    Eval,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One row of `gepa_runs`. Timestamps are unix milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub started_at_ms: i64,
    pub finished_at_ms: i64,
    pub duration_ms: i64,
    pub plugin_id: Option<String>,
    pub plugin_name: Option<String>,
    pub profile: Option<String>,
    pub dataset_size: i64,
    pub objective: Option<String>,
    pub max_evals: Option<i64>,
    pub batch_size: Option<i64>,
    pub calls_used: Option<i64>,
    pub best_mean_score: Option<f64>,
    pub best_n: Option<i64>,
    pub mean_score: Option<f64>,
    pub mean_n: Option<i64>,
    pub candidate_count: Option<i64>,
    pub best_candidate_hash: Option<String>,
    pub seed_prompt_sha256: Option<String>,
    pub error: Option<String>,
    pub created_at_ms: i64,
}

/// One row of `gepa_candidate_metrics`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMetricRow {
    pub run_id: String,
    pub candidate_id: i64,
    /// -1 for the seed
    pub parent_id: i64,
    pub candidate_hash: String,
    pub mean_score: f64,
    pub n: i64,
    pub mean_objectives_json: String,
    pub evals_cached: i64,
    pub reflection_raw: Option<String>,
    pub candidate_json: String,
    pub is_best: bool,
}

/// One row of `gepa_eval_examples`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalExampleRow {
    pub run_id: String,
    pub candidate_hash: String,
    pub example_index: i64,
    pub score: f64,
    pub objectives_json: String,
    pub feedback: Option<String>,
    pub evaluator_notes: Option<String>,
    pub output_json: String,
    pub trace_json: String,
    pub raw_json: String,
}
