use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{CandidateMetricRow, EvalExampleRow, Result, RunRecord, RunRecorder};

#[derive(Debug, Default)]
struct Tables {
    runs: HashMap<String, RunRecord>,
    candidates: HashMap<(String, i64), CandidateMetricRow>,
    evals: HashMap<(String, String, i64), EvalExampleRow>,
}

/// In-memory implementation of RunRecorder with the same replace-on-key semantics
#[derive(Debug, Clone, Default)]
pub struct InMemoryRunRecorder {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryRunRecorder {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunRecorder for InMemoryRunRecorder {
    async fn save(
        &self,
        run: &RunRecord,
        candidates: &[CandidateMetricRow],
        evals: &[EvalExampleRow],
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.runs.insert(run.run_id.clone(), run.clone());
        for c in candidates {
            tables
                .candidates
                .insert((c.run_id.clone(), c.candidate_id), c.clone());
        }
        for ev in evals {
            tables.evals.insert(
                (ev.run_id.clone(), ev.candidate_hash.clone(), ev.example_index),
                ev.clone(),
            );
        }
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.runs.get(run_id).cloned())
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let tables = self.tables.read().await;
        let mut runs: Vec<RunRecord> = tables.runs.values().cloned().collect();
        runs.sort_by(|a, b| b.started_at_ms.cmp(&a.started_at_ms));
        Ok(runs)
    }

    async fn list_candidates(&self, run_id: &str) -> Result<Vec<CandidateMetricRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<CandidateMetricRow> = tables
            .candidates
            .values()
            .filter(|c| c.run_id == run_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.candidate_id);
        Ok(rows)
    }

    async fn list_eval_examples(&self, run_id: &str) -> Result<Vec<EvalExampleRow>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<EvalExampleRow> = tables
            .evals
            .values()
            .filter(|ev| ev.run_id == run_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (&a.candidate_hash, a.example_index).cmp(&(&b.candidate_hash, b.example_index))
        });
        Ok(rows)
    }
}
