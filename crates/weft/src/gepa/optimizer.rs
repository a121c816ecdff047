//! Reflective evolutionary optimization loop
//!
//! The pool is an append-only arena: a node's id is its index, parents are referred to by id.
//! Evaluations are cached per candidate hash and example index; cache hits cost no budget.

use super::config::OptimizerConfig;
use super::error::{GepaError, Result};
use super::format::format_side_info;
use super::pareto::{pareto_front, top_k_by_score};
use super::reflector::Reflector;
use super::types::{Candidate, CandidateStats, EvalResult, ExampleEval, ObjectiveScores, aggregate_stats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};
use weft_core::InferenceContext;

/// Scores one candidate on one example
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn evaluate(
        &self,
        ctx: &InferenceContext,
        candidate: &Candidate,
        example_index: usize,
        example: &Value,
    ) -> Result<EvalResult>;
}

/// Evaluator backed by a synchronous closure
pub struct FnEvaluator<F> {
    func: F,
}

impl<F> FnEvaluator<F>
where
    F: Fn(&Candidate, usize, &Value) -> Result<EvalResult> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F> Evaluator for FnEvaluator<F>
where
    F: Fn(&Candidate, usize, &Value) -> Result<EvalResult> + Send + Sync,
{
    async fn evaluate(
        &self,
        ctx: &InferenceContext,
        candidate: &Candidate,
        example_index: usize,
        example: &Value,
    ) -> Result<EvalResult> {
        ctx.check()?;
        (self.func)(candidate, example_index, example)
    }
}

/// One pool member as reported to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub id: usize,
    /// `None` for the seed
    pub parent_id: Option<usize>,
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub candidate: Candidate,
    pub global_stats: CandidateStats,
    pub evals_cached: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflection_raw: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeResult {
    pub best_candidate: Candidate,
    pub best_stats: CandidateStats,
    pub calls_used: usize,
    pub candidates: Vec<CandidateEntry>,
}

impl OptimizeResult {
    pub fn best_hash(&self) -> String {
        self.best_candidate.hash()
    }
}

/// Single-candidate evaluation over a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalRunResult {
    pub candidate: Candidate,
    pub hash: String,
    pub stats: CandidateStats,
    pub calls_used: usize,
    pub evals: Vec<ExampleEval>,
}

#[derive(Debug, Clone)]
struct CandidateNode {
    id: usize,
    parent_id: Option<usize>,
    hash: String,
    candidate: Candidate,
    created_at: DateTime<Utc>,
    reflection_raw: Option<String>,
}

impl CandidateNode {
    fn new(id: usize, parent_id: Option<usize>, candidate: Candidate) -> Self {
        Self {
            id,
            parent_id,
            hash: candidate.hash(),
            candidate,
            created_at: Utc::now(),
            reflection_raw: None,
        }
    }
}

pub struct Optimizer {
    config: OptimizerConfig,
    evaluator: Arc<dyn Evaluator>,
    reflector: Reflector,
    rng: StdRng,
    cache: HashMap<String, BTreeMap<usize, EvalResult>>,
    calls_used: usize,
    pool: Vec<CandidateNode>,
}

impl Optimizer {
    pub fn new(config: OptimizerConfig, evaluator: Arc<dyn Evaluator>, reflector: Reflector) -> Self {
        let rng = match config.random_seed {
            0 => StdRng::from_entropy(),
            seed => StdRng::seed_from_u64(seed),
        };
        Self {
            config,
            evaluator,
            reflector,
            rng,
            cache: HashMap::new(),
            calls_used: 0,
            pool: Vec::new(),
        }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Evaluator calls consumed so far; cache hits are free
    pub fn calls_used(&self) -> usize {
        self.calls_used
    }

    fn remaining_budget(&self) -> usize {
        self.config.max_eval_calls.saturating_sub(self.calls_used)
    }

    fn check_inputs(&self, candidate: &Candidate, examples: &[Value]) -> Result<()> {
        self.config.validate()?;
        if candidate.is_empty() {
            return Err(GepaError::InvalidCandidate(
                "candidate has no parameters".to_string(),
            ));
        }
        if examples.is_empty() {
            return Err(GepaError::InvalidDataset("dataset is empty".to_string()));
        }
        Ok(())
    }

    pub async fn optimize(
        &mut self,
        ctx: &InferenceContext,
        seed: Candidate,
        examples: &[Value],
    ) -> Result<OptimizeResult> {
        self.check_inputs(&seed, examples)?;
        self.pool.clear();
        self.pool.push(CandidateNode::new(0, None, seed));

        let initial = self.sample_indices(examples.len(), self.config.batch_size.min(self.remaining_budget()));
        let seed_hash = self.pool[0].hash.clone();
        let seed_candidate = self.pool[0].candidate.clone();
        self.ensure_evaluated(ctx, &seed_hash, &seed_candidate, examples, &initial)
            .await?;
        info!(
            examples = examples.len(),
            batch = initial.len(),
            calls_used = self.calls_used,
            "seed evaluated"
        );

        let mut best = 0;
        while self.calls_used < self.config.max_eval_calls {
            ctx.check()?;
            let calls_at_start = self.calls_used;

            let Some(parent_id) = self.select_parent() else {
                break;
            };
            // the child needs the same indices, so keep half the budget for it
            let batch_size = self.config.batch_size.min(self.remaining_budget() / 2);
            if batch_size == 0 {
                debug!(remaining = self.remaining_budget(), "budget too small for another iteration");
                break;
            }
            let indices = self.sample_indices(examples.len(), batch_size);

            let parent = self.pool[parent_id].clone();
            let parent_evals = self
                .ensure_evaluated(ctx, &parent.hash, &parent.candidate, examples, &indices)
                .await?;
            let side_info = format_side_info(examples, &parent_evals, self.config.max_side_info_chars);

            let key = parent.candidate.primary_param_key().to_string();
            let current = parent.candidate.get(&key).unwrap_or_default().to_string();
            let proposal = self.reflector.propose(ctx, &current, &side_info).await?;

            let child_candidate = parent.candidate.clone().with(key, proposal.proposed);
            let mut child = CandidateNode::new(self.pool.len(), Some(parent_id), child_candidate);
            child.reflection_raw = Some(proposal.raw);
            let child_evals = self
                .ensure_evaluated(ctx, &child.hash, &child.candidate, examples, &indices)
                .await?;

            let (parent_evals, child_evals) = shared_evals(parent_evals, child_evals);
            let parent_stats = aggregate_stats(&parent_evals);
            let child_stats = aggregate_stats(&child_evals);
            let accepted = !child_evals.is_empty() && self.accept_child(&parent_stats, &child_stats);

            debug!(
                parent = parent_id,
                batch = indices.len(),
                parent_mean = parent_stats.mean_score,
                child_mean = child_stats.mean_score,
                accepted,
                calls_used = self.calls_used,
                "iteration finished"
            );

            // an accepted child already in the pool collapses onto the existing node
            let mut appended = false;
            if accepted {
                let child_id = match self.pool.iter().position(|n| n.hash == child.hash) {
                    Some(id) => id,
                    None => {
                        let id = child.id;
                        self.pool.push(child);
                        appended = true;
                        id
                    }
                };
                if self.global_stats(child_id).mean_score > self.global_stats(best).mean_score {
                    best = child_id;
                }
            }

            if self.calls_used == calls_at_start && !appended {
                warn!(
                    calls_used = self.calls_used,
                    "no budget consumed and no child accepted, stopping"
                );
                break;
            }
        }

        let candidates: Vec<CandidateEntry> = (0..self.pool.len()).map(|id| self.entry(id)).collect();
        let best_stats = self.global_stats(best);
        info!(
            candidates = candidates.len(),
            best = best,
            best_mean = best_stats.mean_score,
            calls_used = self.calls_used,
            "optimization finished"
        );
        Ok(OptimizeResult {
            best_candidate: self.pool[best].candidate.clone(),
            best_stats,
            calls_used: self.calls_used,
            candidates,
        })
    }

    /// Score `candidate` on every example, in order, until the budget runs out
    pub async fn evaluate(
        &mut self,
        ctx: &InferenceContext,
        candidate: Candidate,
        examples: &[Value],
    ) -> Result<EvalRunResult> {
        self.check_inputs(&candidate, examples)?;
        let hash = candidate.hash();
        let indices: Vec<usize> = (0..examples.len()).collect();
        let evals = self
            .ensure_evaluated(ctx, &hash, &candidate, examples, &indices)
            .await?;
        if evals.len() < examples.len() {
            warn!(
                evaluated = evals.len(),
                examples = examples.len(),
                "budget exhausted before the whole dataset was evaluated"
            );
        }
        Ok(EvalRunResult {
            stats: aggregate_stats(&evals),
            candidate,
            hash,
            calls_used: self.calls_used,
            evals,
        })
    }

    fn accept_child(&self, parent: &CandidateStats, child: &CandidateStats) -> bool {
        if parent.mean_objectives.len() > 1 || child.mean_objectives.len() > 1 {
            return super::pareto::dominates(&child.mean_objectives, &parent.mean_objectives);
        }
        child.mean_score > parent.mean_score + self.config.epsilon
    }

    fn select_parent(&mut self) -> Option<usize> {
        if self.pool.is_empty() {
            return None;
        }
        let stats: Vec<CandidateStats> = (0..self.pool.len()).map(|id| self.global_stats(id)).collect();
        let vectors: Vec<ObjectiveScores> = stats.iter().map(CandidateStats::objective_vector).collect();
        let scalars: Vec<f64> = stats.iter().map(|s| s.mean_score).collect();
        let keys: BTreeSet<&String> = vectors.iter().flat_map(|v| v.keys()).collect();

        let pool = if keys.len() > 1 {
            pareto_front(&vectors)
        } else {
            top_k_by_score(&scalars, self.config.frontier_size)
        };
        if pool.is_empty() {
            return Some(self.rng.gen_range(0..self.pool.len()));
        }

        let min = pool.iter().map(|&i| scalars[i]).fold(f64::INFINITY, f64::min);
        let weights: Vec<f64> = pool
            .iter()
            .map(|&i| (scalars[i] - min + 1e-9).max(0.0))
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Some(pool[self.rng.gen_range(0..pool.len())]);
        }
        let target = self.rng.r#gen::<f64>() * total;
        let mut acc = 0.0;
        for (&id, weight) in pool.iter().zip(&weights) {
            acc += weight;
            if target <= acc {
                return Some(id);
            }
        }
        pool.last().copied()
    }

    /// Permutation prefix of `[0, n)`; the identity when the whole range is requested
    fn sample_indices(&mut self, n: usize, size: usize) -> Vec<usize> {
        let size = size.min(n);
        let mut indices: Vec<usize> = (0..n).collect();
        if size < n {
            indices.shuffle(&mut self.rng);
            indices.truncate(size);
        }
        indices
    }

    async fn ensure_evaluated(
        &mut self,
        ctx: &InferenceContext,
        hash: &str,
        candidate: &Candidate,
        examples: &[Value],
        indices: &[usize],
    ) -> Result<Vec<ExampleEval>> {
        let mut out = Vec::with_capacity(indices.len());
        for &index in indices {
            let Some(example) = examples.get(index) else {
                continue;
            };
            if let Some(cached) = self.cache.get(hash).and_then(|c| c.get(&index)) {
                out.push(ExampleEval {
                    example_index: index,
                    result: cached.clone(),
                });
                continue;
            }
            if self.calls_used >= self.config.max_eval_calls {
                break;
            }
            let mut result = self
                .evaluator
                .evaluate(ctx, candidate, index, example)
                .await
                .map_err(|e| GepaError::EvaluatorFailed {
                    index,
                    source: Box::new(e),
                })?;
            if result.objectives.is_empty() {
                result.objectives = result.objective_vector();
            }
            self.calls_used += 1;
            self.cache
                .entry(hash.to_string())
                .or_default()
                .insert(index, result.clone());
            out.push(ExampleEval {
                example_index: index,
                result,
            });
        }
        Ok(out)
    }

    /// Stats over every cached evaluation of a node's candidate
    fn global_stats(&self, id: usize) -> CandidateStats {
        let evals: Vec<ExampleEval> = self
            .cache
            .get(&self.pool[id].hash)
            .map(|cached| {
                cached
                    .iter()
                    .map(|(&example_index, result)| ExampleEval {
                        example_index,
                        result: result.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        aggregate_stats(&evals)
    }

    fn entry(&self, id: usize) -> CandidateEntry {
        let node = &self.pool[id];
        CandidateEntry {
            id: node.id,
            parent_id: node.parent_id,
            hash: node.hash.clone(),
            created_at: node.created_at,
            candidate: node.candidate.clone(),
            global_stats: self.global_stats(id),
            evals_cached: self.cache.get(&node.hash).map_or(0, BTreeMap::len),
            reflection_raw: node.reflection_raw.clone(),
        }
    }
}

/// Restrict both sides to the example indices each of them was scored on
fn shared_evals(parent: Vec<ExampleEval>, child: Vec<ExampleEval>) -> (Vec<ExampleEval>, Vec<ExampleEval>) {
    let parent_indices: BTreeSet<usize> = parent.iter().map(|e| e.example_index).collect();
    let child_indices: BTreeSet<usize> = child.iter().map(|e| e.example_index).collect();
    let keep = |e: &ExampleEval| parent_indices.contains(&e.example_index) && child_indices.contains(&e.example_index);
    (
        parent.into_iter().filter(|e| keep(e)).collect(),
        child.into_iter().filter(|e| keep(e)).collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weft_core::{Block, ErrorKind, FnEngine, SharedEngine, Turn};

    fn dataset(n: usize) -> Vec<Value> {
        (1..=n).map(|x| json!({"x": x})).collect()
    }

    fn constant_reflector(reply: &'static str) -> (Reflector, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let engine: SharedEngine = Arc::new(FnEngine::new("reflect", move |turn: Turn| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(turn.with_block(Block::llm_text(reply)))
        }));
        (Reflector::new(engine), calls)
    }

    fn zero_evaluator() -> Arc<dyn Evaluator> {
        Arc::new(FnEvaluator::new(|_: &Candidate, _: usize, _: &Value| {
            Ok(EvalResult::from_score(0.0))
        }))
    }

    #[tokio::test]
    async fn test_batch_size_zero_fails_before_reflection() {
        let (reflector, calls) = constant_reflector("```x```");
        let config = OptimizerConfig::default().with_budget(10, 0).with_seed(1);
        let mut optimizer = Optimizer::new(config, zero_evaluator(), reflector);
        let err = optimizer
            .optimize(&InferenceContext::new(), Candidate::from_prompt("p"), &dataset(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_empty_inputs_rejected() {
        let (reflector, _) = constant_reflector("x");
        let mut optimizer = Optimizer::new(OptimizerConfig::default(), zero_evaluator(), reflector);
        let ctx = InferenceContext::new();
        let err = optimizer
            .optimize(&ctx, Candidate::new(), &dataset(1))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCandidate);
        let err = optimizer
            .optimize(&ctx, Candidate::from_prompt("p"), &[])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidDataset);
    }

    #[tokio::test]
    async fn test_single_example_dataset() {
        let (reflector, _) = constant_reflector("```p```");
        let config = OptimizerConfig::default().with_budget(20, 8).with_seed(7);
        let mut optimizer = Optimizer::new(config, zero_evaluator(), reflector);
        let result = optimizer
            .optimize(&InferenceContext::new(), Candidate::from_prompt("p"), &dataset(1))
            .await
            .unwrap();
        assert_eq!(result.calls_used, 1);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.candidates[0].parent_id, None);
    }

    #[tokio::test]
    async fn test_improving_child_is_accepted() {
        let (reflector, _) = constant_reflector("```better```");
        let evaluator: Arc<dyn Evaluator> = Arc::new(FnEvaluator::new(
            |c: &Candidate, _: usize, _: &Value| {
                let score = if c.get("prompt") == Some("better") { 1.0 } else { 0.0 };
                Ok(EvalResult::from_score(score))
            },
        ));
        let config = OptimizerConfig::default().with_budget(12, 2).with_seed(3);
        let mut optimizer = Optimizer::new(config, evaluator, reflector);
        let result = optimizer
            .optimize(&InferenceContext::new(), Candidate::from_prompt("seed"), &dataset(4))
            .await
            .unwrap();
        assert_eq!(result.best_candidate.get("prompt"), Some("better"));
        assert_eq!(result.best_stats.mean_score, 1.0);
        assert!(result.calls_used <= 12);
        assert_eq!(result.candidates.len(), 2);
        let child = &result.candidates[1];
        assert_eq!(child.parent_id, Some(0));
        assert_eq!(child.reflection_raw.as_deref(), Some("```better```"));
        assert_eq!(child.hash, result.best_hash());
    }

    #[tokio::test]
    async fn test_evaluator_error_is_wrapped() {
        let (reflector, _) = constant_reflector("x");
        let evaluator: Arc<dyn Evaluator> = Arc::new(FnEvaluator::new(
            |_: &Candidate, i: usize, _: &Value| {
                if i == 0 {
                    Err(GepaError::evaluation(ErrorKind::PluginMissingScore, "no score"))
                } else {
                    Ok(EvalResult::from_score(1.0))
                }
            },
        ));
        let config = OptimizerConfig::default().with_budget(10, 3).with_seed(1);
        let mut optimizer = Optimizer::new(config, evaluator, reflector);
        let err = optimizer
            .optimize(&InferenceContext::new(), Candidate::from_prompt("p"), &dataset(3))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PluginMissingScore);
        assert!(err.to_string().starts_with("evaluator failed for example 0"));
    }

    #[tokio::test]
    async fn test_eval_mode_respects_budget() {
        let (reflector, calls) = constant_reflector("x");
        let config = OptimizerConfig::default().with_budget(2, 8).with_seed(1);
        let mut optimizer = Optimizer::new(config, zero_evaluator(), reflector);
        let result = optimizer
            .evaluate(&InferenceContext::new(), Candidate::from_prompt("p"), &dataset(3))
            .await
            .unwrap();
        assert_eq!(result.calls_used, 2);
        assert_eq!(result.evals.len(), 2);
        assert_eq!(result.stats.n, 2);
        assert_eq!(result.evals[0].result.objectives["score"], 0.0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_canceled_context_stops_evaluation() {
        let (reflector, _) = constant_reflector("x");
        let mut optimizer = Optimizer::new(OptimizerConfig::default(), zero_evaluator(), reflector);
        let ctx = InferenceContext::new();
        ctx.cancel();
        let err = optimizer
            .optimize(&ctx, Candidate::from_prompt("p"), &dataset(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Canceled);
        assert_eq!(optimizer.calls_used(), 0);
    }

    /// Scores each prompt on accuracy and speed; the scalar score follows accuracy
    fn two_objective_evaluator(scores: fn(&str) -> (f64, f64)) -> Arc<dyn Evaluator> {
        Arc::new(FnEvaluator::new(move |c: &Candidate, _: usize, _: &Value| {
            let (accuracy, speed) = scores(c.get("prompt").unwrap_or_default());
            Ok(EvalResult::from_score(accuracy)
                .with_objective("accuracy", accuracy)
                .with_objective("speed", speed))
        }))
    }

    #[tokio::test]
    async fn test_dominating_child_is_accepted_on_two_objectives() {
        let (reflector, calls) = constant_reflector("```better```");
        let evaluator = two_objective_evaluator(|prompt| match prompt {
            "better" => (1.0, 0.5),
            _ => (0.5, 0.5),
        });
        let config = OptimizerConfig::default().with_budget(12, 2).with_seed(5);
        let mut optimizer = Optimizer::new(config, evaluator, reflector);
        let result = optimizer
            .optimize(&InferenceContext::new(), Candidate::from_prompt("seed"), &dataset(4))
            .await
            .unwrap();

        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.candidates[1].parent_id, Some(0));
        assert_eq!(result.best_candidate.get("prompt"), Some("better"));
        assert_eq!(result.best_stats.mean_objectives["accuracy"], 1.0);
        assert_eq!(result.best_stats.mean_objectives["speed"], 0.5);
    }

    #[tokio::test]
    async fn test_trade_off_child_is_rejected_on_two_objectives() {
        let (reflector, calls) = constant_reflector("```accurate but slow```");
        let evaluator = two_objective_evaluator(|prompt| match prompt {
            "accurate but slow" => (1.0, 0.0),
            _ => (0.5, 0.5),
        });
        let config = OptimizerConfig::default().with_budget(12, 2).with_seed(5);
        let mut optimizer = Optimizer::new(config, evaluator, reflector);
        let result = optimizer
            .optimize(&InferenceContext::new(), Candidate::from_prompt("seed"), &dataset(4))
            .await
            .unwrap();

        // a higher scalar score alone does not get the child in
        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.best_candidate.get("prompt"), Some("seed"));
    }

    #[tokio::test]
    async fn test_improvement_within_epsilon_is_rejected() {
        let evaluator: Arc<dyn Evaluator> = Arc::new(FnEvaluator::new(
            |c: &Candidate, _: usize, _: &Value| {
                let score = if c.get("prompt") == Some("slightly better") { 0.6 } else { 0.5 };
                Ok(EvalResult::from_score(score))
            },
        ));

        let (reflector, calls) = constant_reflector("```slightly better```");
        let mut config = OptimizerConfig::default().with_budget(12, 2).with_seed(9);
        config.epsilon = 0.5;
        let mut optimizer = Optimizer::new(config.clone(), evaluator.clone(), reflector);
        let result = optimizer
            .optimize(&InferenceContext::new(), Candidate::from_prompt("seed"), &dataset(4))
            .await
            .unwrap();
        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(result.candidates.len(), 1);
        assert_eq!(result.best_candidate.get("prompt"), Some("seed"));

        let (reflector, _) = constant_reflector("```slightly better```");
        config.epsilon = 0.05;
        let mut optimizer = Optimizer::new(config, evaluator, reflector);
        let result = optimizer
            .optimize(&InferenceContext::new(), Candidate::from_prompt("seed"), &dataset(4))
            .await
            .unwrap();
        assert_eq!(result.candidates.len(), 2);
        assert_eq!(result.best_candidate.get("prompt"), Some("slightly better"));
    }

    #[test]
    fn test_shared_evals_keeps_common_indices_on_both_sides() {
        let evals = |indices: &[usize], score: f64| -> Vec<ExampleEval> {
            indices
                .iter()
                .map(|&example_index| ExampleEval {
                    example_index,
                    result: EvalResult::from_score(score),
                })
                .collect()
        };
        let (parent, child) = shared_evals(evals(&[0, 1, 2], 0.0), evals(&[1, 2, 3], 1.0));
        let indices = |e: &[ExampleEval]| e.iter().map(|e| e.example_index).collect::<Vec<_>>();
        assert_eq!(indices(&parent), vec![1, 2]);
        assert_eq!(indices(&child), vec![1, 2]);
        assert_eq!(aggregate_stats(&child).n, 2);
    }
}
