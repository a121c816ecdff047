use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use super::{
    CandidateMetricRow, EvalExampleRow, RecorderError, Result, RunRecord, RunRecorder,
};

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS gepa_runs (
        run_id TEXT PRIMARY KEY,
        mode TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at_ms INTEGER NOT NULL,
        finished_at_ms INTEGER NOT NULL,
        duration_ms INTEGER NOT NULL,
        plugin_id TEXT,
        plugin_name TEXT,
        profile TEXT,
        dataset_size INTEGER NOT NULL DEFAULT 0,
        objective TEXT,
        max_evals INTEGER,
        batch_size INTEGER,
        calls_used INTEGER,
        best_mean_score REAL,
        best_n INTEGER,
        mean_score REAL,
        mean_n INTEGER,
        candidate_count INTEGER,
        best_candidate_hash TEXT,
        seed_prompt_sha256 TEXT,
        error TEXT,
        created_at_ms INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gepa_candidate_metrics (
        run_id TEXT NOT NULL,
        candidate_id INTEGER NOT NULL,
        parent_id INTEGER NOT NULL,
        candidate_hash TEXT NOT NULL,
        mean_score REAL NOT NULL,
        n INTEGER NOT NULL,
        mean_objectives_json TEXT NOT NULL,
        evals_cached INTEGER NOT NULL,
        reflection_raw TEXT,
        candidate_json TEXT NOT NULL,
        is_best INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (run_id, candidate_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS gepa_eval_examples (
        run_id TEXT NOT NULL,
        candidate_hash TEXT NOT NULL,
        example_index INTEGER NOT NULL,
        score REAL NOT NULL,
        objectives_json TEXT NOT NULL,
        feedback TEXT,
        evaluator_notes TEXT,
        output_json TEXT NOT NULL,
        trace_json TEXT NOT NULL,
        raw_json TEXT NOT NULL,
        PRIMARY KEY (run_id, candidate_hash, example_index)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_gepa_runs_started_at ON gepa_runs (started_at_ms DESC)",
    "CREATE INDEX IF NOT EXISTS idx_gepa_runs_plugin ON gepa_runs (plugin_id, started_at_ms DESC)",
    "CREATE INDEX IF NOT EXISTS idx_gepa_candidates_run_hash ON gepa_candidate_metrics (run_id, candidate_hash)",
    "CREATE INDEX IF NOT EXISTS idx_gepa_eval_examples_run ON gepa_eval_examples (run_id, candidate_hash)",
];

/// SQLite implementation of RunRecorder
#[derive(Debug, Clone)]
pub struct SqliteRunRecorder {
    pool: SqlitePool,
}

impl SqliteRunRecorder {
    /// Wrap an existing pool and create the tables if needed
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        let recorder = Self { pool };
        recorder.ensure_schema().await?;
        Ok(recorder)
    }

    /// Open (or create) a database file, creating its parent directory
    pub async fn connect(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if db_path.as_os_str().is_empty() {
            return Err(RecorderError::InvalidConfig("db path is empty".to_string()));
        }
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::new(pool).await
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        Self::new(pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ensure_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl RunRecorder for SqliteRunRecorder {
    async fn save(
        &self,
        run: &RunRecord,
        candidates: &[CandidateMetricRow],
        evals: &[EvalExampleRow],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO gepa_runs (
                run_id, mode, status, started_at_ms, finished_at_ms, duration_ms,
                plugin_id, plugin_name, profile, dataset_size, objective, max_evals,
                batch_size, calls_used, best_mean_score, best_n, mean_score, mean_n,
                candidate_count, best_candidate_hash, seed_prompt_sha256, error, created_at_ms
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.run_id)
        .bind(run.mode.as_ref())
        .bind(run.status.as_ref())
        .bind(run.started_at_ms)
        .bind(run.finished_at_ms)
        .bind(run.duration_ms)
        .bind(&run.plugin_id)
        .bind(&run.plugin_name)
        .bind(&run.profile)
        .bind(run.dataset_size)
        .bind(&run.objective)
        .bind(run.max_evals)
        .bind(run.batch_size)
        .bind(run.calls_used)
        .bind(run.best_mean_score)
        .bind(run.best_n)
        .bind(run.mean_score)
        .bind(run.mean_n)
        .bind(run.candidate_count)
        .bind(&run.best_candidate_hash)
        .bind(&run.seed_prompt_sha256)
        .bind(&run.error)
        .bind(run.created_at_ms)
        .execute(&mut *tx)
        .await?;

        for c in candidates {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO gepa_candidate_metrics (
                    run_id, candidate_id, parent_id, candidate_hash, mean_score, n,
                    mean_objectives_json, evals_cached, reflection_raw, candidate_json, is_best
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&c.run_id)
            .bind(c.candidate_id)
            .bind(c.parent_id)
            .bind(&c.candidate_hash)
            .bind(c.mean_score)
            .bind(c.n)
            .bind(&c.mean_objectives_json)
            .bind(c.evals_cached)
            .bind(&c.reflection_raw)
            .bind(&c.candidate_json)
            .bind(i64::from(c.is_best))
            .execute(&mut *tx)
            .await?;
        }

        for ev in evals {
            sqlx::query(
                r#"
                INSERT OR REPLACE INTO gepa_eval_examples (
                    run_id, candidate_hash, example_index, score, objectives_json, feedback,
                    evaluator_notes, output_json, trace_json, raw_json
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&ev.run_id)
            .bind(&ev.candidate_hash)
            .bind(ev.example_index)
            .bind(ev.score)
            .bind(&ev.objectives_json)
            .bind(&ev.feedback)
            .bind(&ev.evaluator_notes)
            .bind(&ev.output_json)
            .bind(&ev.trace_json)
            .bind(&ev.raw_json)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(
            run_id = %run.run_id,
            candidates = candidates.len(),
            evals = evals.len(),
            "run saved to sqlite"
        );
        Ok(())
    }

    async fn get_run(&self, run_id: &str) -> Result<Option<RunRecord>> {
        let row = sqlx::query("SELECT * FROM gepa_runs WHERE run_id = ?")
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| run_from_row(&row)).transpose()
    }

    async fn list_runs(&self) -> Result<Vec<RunRecord>> {
        let rows = sqlx::query("SELECT * FROM gepa_runs ORDER BY started_at_ms DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(run_from_row).collect()
    }

    async fn list_candidates(&self, run_id: &str) -> Result<Vec<CandidateMetricRow>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, candidate_id, parent_id, candidate_hash, mean_score, n,
                   mean_objectives_json, evals_cached, reflection_raw, candidate_json, is_best
            FROM gepa_candidate_metrics
            WHERE run_id = ?
            ORDER BY candidate_id
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CandidateMetricRow {
                run_id: row.get("run_id"),
                candidate_id: row.get("candidate_id"),
                parent_id: row.get("parent_id"),
                candidate_hash: row.get("candidate_hash"),
                mean_score: row.get("mean_score"),
                n: row.get("n"),
                mean_objectives_json: row.get("mean_objectives_json"),
                evals_cached: row.get("evals_cached"),
                reflection_raw: row.get("reflection_raw"),
                candidate_json: row.get("candidate_json"),
                is_best: row.get::<i64, _>("is_best") != 0,
            })
            .collect())
    }

    async fn list_eval_examples(&self, run_id: &str) -> Result<Vec<EvalExampleRow>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, candidate_hash, example_index, score, objectives_json, feedback,
                   evaluator_notes, output_json, trace_json, raw_json
            FROM gepa_eval_examples
            WHERE run_id = ?
            ORDER BY candidate_hash, example_index
            "#,
        )
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| EvalExampleRow {
                run_id: row.get("run_id"),
                candidate_hash: row.get("candidate_hash"),
                example_index: row.get("example_index"),
                score: row.get("score"),
                objectives_json: row.get("objectives_json"),
                feedback: row.get("feedback"),
                evaluator_notes: row.get("evaluator_notes"),
                output_json: row.get("output_json"),
                trace_json: row.get("trace_json"),
                raw_json: row.get("raw_json"),
            })
            .collect())
    }
}

fn run_from_row(row: &SqliteRow) -> Result<RunRecord> {
    let mode: String = row.get("mode");
    let status: String = row.get("status");
    Ok(RunRecord {
        run_id: row.get("run_id"),
        mode: mode
            .parse()
            .map_err(|_| RecorderError::InvalidData(format!("unknown run mode: {}", mode)))?,
        status: status
            .parse()
            .map_err(|_| RecorderError::InvalidData(format!("unknown run status: {}", status)))?,
        started_at_ms: row.get("started_at_ms"),
        finished_at_ms: row.get("finished_at_ms"),
        duration_ms: row.get("duration_ms"),
        plugin_id: row.get("plugin_id"),
        plugin_name: row.get("plugin_name"),
        profile: row.get("profile"),
        dataset_size: row.get("dataset_size"),
        objective: row.get("objective"),
        max_evals: row.get("max_evals"),
        batch_size: row.get("batch_size"),
        calls_used: row.get("calls_used"),
        best_mean_score: row.get("best_mean_score"),
        best_n: row.get("best_n"),
        mean_score: row.get("mean_score"),
        mean_n: row.get("mean_n"),
        candidate_count: row.get("candidate_count"),
        best_candidate_hash: row.get("best_candidate_hash"),
        seed_prompt_sha256: row.get("seed_prompt_sha256"),
        error: row.get("error"),
        created_at_ms: row.get("created_at_ms"),
    })
}
