//! GEPA-style reflective prompt optimization
//!
//! An [`Optimizer`] evolves a [`Candidate`] (named text parameters) by asking a [`Reflector`]
//! to rewrite one parameter from formatted evaluation feedback, keeping children that beat
//! their parent on the same minibatch.

pub mod config;
pub mod error;
pub mod format;
pub mod optimizer;
pub mod pareto;
pub mod reflector;
pub mod types;

pub use config::{DEFAULT_REFLECTION_PROMPT_TEMPLATE, DEFAULT_REFLECTION_SYSTEM_PROMPT, OptimizerConfig};
pub use error::{GepaError, Result};
pub use format::format_side_info;
pub use optimizer::{CandidateEntry, EvalRunResult, Evaluator, FnEvaluator, OptimizeResult, Optimizer};
pub use pareto::{dominates, pareto_front, top_k_by_score};
pub use reflector::{Proposal, Reflector, extract_assistant_text, extract_fenced_block};
pub use types::{Candidate, CandidateStats, EvalResult, ExampleEval, ObjectiveScores, aggregate_stats};
