use serde_json::{Value, json};
use std::sync::Arc;
use weft::gepa::{Candidate, EvalResult, Evaluator, FnEvaluator, Optimizer, OptimizerConfig, Reflector};
use weft::recorder::{
    RunConfig, RunMode, RunRecorder, RunSession, RunStatus, SqliteRunRecorder,
};
use weft_core::{Block, FnEngine, InferenceContext, SharedEngine, Turn};

fn dataset() -> Vec<Value> {
    (1..=4).map(|x| json!({"x": x})).collect()
}

fn optimizer(budget: usize) -> Optimizer {
    let engine: SharedEngine = Arc::new(FnEngine::new("reflector", |turn: Turn| {
        Ok(turn.with_block(Block::llm_text("```better prompt```")))
    }));
    let evaluator: Arc<dyn Evaluator> = Arc::new(FnEvaluator::new(
        |c: &Candidate, i: usize, _: &Value| {
            let score = if c.get("prompt") == Some("better prompt") { 1.0 } else { 0.25 };
            Ok(EvalResult::from_score(score)
                .with_objective("accuracy", score)
                .with_feedback(json!(format!("example {}", i))))
        },
    ));
    let config = OptimizerConfig::default().with_budget(budget, 2).with_seed(9);
    Optimizer::new(config, evaluator, Reflector::new(engine))
}

fn run_config(mode: RunMode) -> RunConfig {
    RunConfig {
        plugin_id: "toy".to_string(),
        plugin_name: "Toy plugin".to_string(),
        dataset_size: 4,
        max_evals: 12,
        batch_size: 2,
        seed_prompt: "seed prompt".to_string(),
        ..RunConfig::new(mode)
    }
}

#[tokio::test]
async fn test_optimize_run_is_saved_to_sqlite() {
    let recorder = Arc::new(SqliteRunRecorder::in_memory().await.unwrap());
    let mut session = RunSession::begin_run(recorder.clone(), run_config(RunMode::Optimize));

    let result = optimizer(12)
        .optimize(&InferenceContext::new(), Candidate::from_prompt("seed prompt"), &dataset())
        .await
        .unwrap();
    session.record_optimize_result(&result).unwrap();
    let run = session.finish_run(None).await.unwrap();

    let stored = recorder.get_run(&run.run_id).await.unwrap().unwrap();
    assert_eq!(stored, run);
    assert_eq!(stored.status, RunStatus::Completed);
    assert_eq!(stored.mode, RunMode::Optimize);
    assert_eq!(stored.plugin_id.as_deref(), Some("toy"));
    assert_eq!(stored.profile, None);
    assert_eq!(stored.calls_used, Some(result.calls_used as i64));
    assert_eq!(stored.best_candidate_hash, Some(result.best_hash()));
    assert_eq!(stored.seed_prompt_sha256, Some(sha256::digest("seed prompt")));

    let candidates = recorder.list_candidates(&run.run_id).await.unwrap();
    assert_eq!(candidates.len(), result.candidates.len());
    assert_eq!(candidates[0].parent_id, -1);
    assert_eq!(candidates.iter().filter(|c| c.is_best).count(), 1);
    let seed: Candidate = serde_json::from_str(&candidates[0].candidate_json).unwrap();
    assert_eq!(seed, Candidate::from_prompt("seed prompt"));
    assert!(recorder.list_eval_examples(&run.run_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_eval_run_is_saved_to_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("runs.sqlite");
    let recorder = Arc::new(SqliteRunRecorder::connect(&db_path).await.unwrap());
    let mut session = RunSession::begin_run(recorder.clone(), run_config(RunMode::Eval));

    let result = optimizer(100)
        .evaluate(&InferenceContext::new(), Candidate::from_prompt("seed prompt"), &dataset())
        .await
        .unwrap();
    session.record_eval_result(&result).unwrap();
    let run = session.finish_run(None).await.unwrap();

    assert!(db_path.exists());
    assert_eq!(run.mean_n, Some(4));
    assert_eq!(run.candidate_count, Some(1));

    let rows = recorder.list_eval_examples(&run.run_id).await.unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].example_index, 0);
    assert_eq!(rows[0].feedback.as_deref(), Some("example 0"));
    assert_eq!(rows[0].objectives_json, r#"{"accuracy":0.25}"#);
    assert_eq!(rows[0].trace_json, "null");

    let runs = recorder.list_runs().await.unwrap();
    assert_eq!(runs.len(), 1);
}

#[tokio::test]
async fn test_failed_run_is_recorded() {
    let recorder = Arc::new(SqliteRunRecorder::in_memory().await.unwrap());
    let session = RunSession::begin_run(recorder.clone(), run_config(RunMode::Optimize));
    let run = session.finish_run(Some("evaluator exploded")).await.unwrap();

    let stored = recorder.get_run(&run.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, RunStatus::Failed);
    assert_eq!(stored.error.as_deref(), Some("evaluator exploded"));
    assert_eq!(stored.calls_used, None);
}
