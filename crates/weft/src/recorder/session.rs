use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::{
    CandidateMetricRow, EvalExampleRow, RecorderError, Result, RunMode, RunRecord, RunRecorder,
    RunStatus,
};
use crate::gepa::{EvalRunResult, OptimizeResult};

const FEEDBACK_MAX_CHARS: usize = 2000;
const ERROR_MAX_CHARS: usize = 4000;

/// Run-level fields known before the run starts
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub mode: RunMode,
    pub plugin_id: String,
    pub plugin_name: String,
    pub profile: String,
    pub dataset_size: usize,
    pub objective: String,
    pub max_evals: usize,
    pub batch_size: usize,
    pub seed_prompt: String,
}

impl RunConfig {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            plugin_id: String::new(),
            plugin_name: String::new(),
            profile: String::new(),
            dataset_size: 0,
            objective: String::new(),
            max_evals: 0,
            batch_size: 0,
            seed_prompt: String::new(),
        }
    }
}

/// Buffers one run's rows and writes them when the run finishes
pub struct RunSession {
    recorder: Arc<dyn RunRecorder>,
    run: RunRecord,
    candidates: Vec<CandidateMetricRow>,
    evals: Vec<EvalExampleRow>,
}

impl RunSession {
    pub fn begin_run(recorder: Arc<dyn RunRecorder>, config: RunConfig) -> Self {
        let now = Utc::now();
        let now_ms = now.timestamp_millis();
        let run_id = format!(
            "gepa-{}-{}",
            config.mode,
            now.timestamp_nanos_opt().unwrap_or(now_ms)
        );
        let run = RunRecord {
            run_id,
            mode: config.mode,
            status: RunStatus::Running,
            started_at_ms: now_ms,
            finished_at_ms: 0,
            duration_ms: 0,
            plugin_id: non_blank(config.plugin_id.trim()),
            plugin_name: non_blank(config.plugin_name.trim()),
            profile: non_blank(config.profile.trim()),
            dataset_size: config.dataset_size as i64,
            objective: non_blank(config.objective.trim()),
            max_evals: non_zero(config.max_evals),
            batch_size: non_zero(config.batch_size),
            calls_used: None,
            best_mean_score: None,
            best_n: None,
            mean_score: None,
            mean_n: None,
            candidate_count: None,
            best_candidate_hash: None,
            seed_prompt_sha256: non_blank(config.seed_prompt.trim()).map(sha256::digest),
            error: None,
            created_at_ms: now_ms,
        };
        info!(run_id = %run.run_id, mode = %run.mode, "run started");
        Self {
            recorder,
            run,
            candidates: Vec::new(),
            evals: Vec::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run.run_id
    }

    pub fn run(&self) -> &RunRecord {
        &self.run
    }

    pub fn record_optimize_result(&mut self, result: &OptimizeResult) -> Result<()> {
        self.expect_mode(RunMode::Optimize)?;
        let best_hash = result.best_hash();

        self.run.calls_used = non_zero(result.calls_used);
        self.run.best_mean_score = Some(result.best_stats.mean_score);
        self.run.best_n = Some(result.best_stats.n as i64);
        self.run.candidate_count = non_zero(result.candidates.len());

        for entry in &result.candidates {
            self.candidates.push(CandidateMetricRow {
                run_id: self.run.run_id.clone(),
                candidate_id: entry.id as i64,
                parent_id: entry.parent_id.map_or(-1, |id| id as i64),
                candidate_hash: entry.hash.clone(),
                mean_score: entry.global_stats.mean_score,
                n: entry.global_stats.n as i64,
                mean_objectives_json: to_json(&entry.global_stats.mean_objectives)?,
                evals_cached: entry.evals_cached as i64,
                reflection_raw: entry.reflection_raw.as_deref().and_then(non_blank),
                candidate_json: to_json(&entry.candidate)?,
                is_best: entry.hash == best_hash,
            });
        }
        self.run.best_candidate_hash = non_blank(&best_hash);
        Ok(())
    }

    pub fn record_eval_result(&mut self, result: &EvalRunResult) -> Result<()> {
        self.expect_mode(RunMode::Eval)?;

        self.run.mean_score = Some(result.stats.mean_score);
        self.run.mean_n = Some(result.stats.n as i64);
        self.run.calls_used = non_zero(result.evals.len());
        self.run.candidate_count = Some(1);
        self.run.best_candidate_hash = non_blank(&result.hash);

        for eval in &result.evals {
            let feedback = eval.result.feedback.as_ref().map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
            self.evals.push(EvalExampleRow {
                run_id: self.run.run_id.clone(),
                candidate_hash: result.hash.clone(),
                example_index: eval.example_index as i64,
                score: eval.result.score,
                objectives_json: to_json(&eval.result.objectives)?,
                feedback: feedback
                    .as_deref()
                    .and_then(non_blank)
                    .map(|s| truncate(&s, FEEDBACK_MAX_CHARS)),
                evaluator_notes: eval
                    .result
                    .evaluator_notes
                    .as_deref()
                    .and_then(non_blank)
                    .map(|s| truncate(&s, FEEDBACK_MAX_CHARS)),
                output_json: to_json(&eval.result.output)?,
                trace_json: to_json(&eval.result.trace)?,
                raw_json: to_json(&eval.result.raw)?,
            });
        }
        Ok(())
    }

    /// Stamp the end time and status, then save everything in one write
    pub async fn finish_run(mut self, error: Option<&str>) -> Result<RunRecord> {
        let now_ms = Utc::now().timestamp_millis();
        self.run.finished_at_ms = now_ms;
        self.run.duration_ms = (now_ms - self.run.started_at_ms).max(0);
        match error {
            None => self.run.status = RunStatus::Completed,
            Some(message) => {
                self.run.status = RunStatus::Failed;
                self.run.error = non_blank(message).map(|s| truncate(&s, ERROR_MAX_CHARS));
            }
        }

        if let Err(e) = self
            .recorder
            .save(&self.run, &self.candidates, &self.evals)
            .await
        {
            warn!(run_id = %self.run.run_id, error = %e, "failed to save run");
            return Err(e);
        }
        info!(
            run_id = %self.run.run_id,
            status = %self.run.status,
            duration_ms = self.run.duration_ms,
            "run recorded"
        );
        Ok(self.run)
    }

    fn expect_mode(&self, actual: RunMode) -> Result<()> {
        if self.run.mode != actual {
            return Err(RecorderError::ModeMismatch {
                expected: self.run.mode,
                actual,
            });
        }
        Ok(())
    }
}

/// JSON text of a value; absent values are written as `null`
fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

fn non_blank(s: &str) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn non_zero(v: usize) -> Option<i64> {
    (v != 0).then_some(v as i64)
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}
