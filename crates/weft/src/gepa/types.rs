use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Objective vector; higher is better on every dimension
pub type ObjectiveScores = BTreeMap<String, f64>;

/// Parameter key mutated by the reflector when present
pub const PRIMARY_PARAM_KEY: &str = "prompt";

/// Named text parameters being optimized
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(BTreeMap<String, String>);

impl Candidate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-parameter candidate keyed by `prompt`
    pub fn from_prompt(prompt: impl Into<String>) -> Self {
        Self::new().with(PRIMARY_PARAM_KEY, prompt)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `prompt` if present, else the lexicographically smallest key
    pub fn primary_param_key(&self) -> &str {
        if self.0.contains_key(PRIMARY_PARAM_KEY) {
            return PRIMARY_PARAM_KEY;
        }
        self.0
            .keys()
            .next()
            .map(String::as_str)
            .unwrap_or(PRIMARY_PARAM_KEY)
    }

    /// Hex sha256 over the key-sorted `[{"k":..,"v":..}]` encoding
    pub fn hash(&self) -> String {
        #[derive(Serialize)]
        struct Pair<'a> {
            k: &'a str,
            v: &'a str,
        }
        let pairs: Vec<Pair<'_>> = self.iter().map(|(k, v)| Pair { k, v }).collect();
        let encoded = serde_json::to_string(&pairs).unwrap_or_default();
        sha256::digest(encoded)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Candidate {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for Candidate {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(&self.0) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

/// Evaluator output for one (candidate, example) pair
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub score: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub objectives: ObjectiveScores,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<Value>,
    /// Unmodified evaluator return value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluator_notes: Option<String>,
}

impl EvalResult {
    pub fn from_score(score: f64) -> Self {
        Self {
            score,
            ..Default::default()
        }
    }

    pub fn with_objective(mut self, key: impl Into<String>, value: f64) -> Self {
        self.objectives.insert(key.into(), value);
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output = Some(output);
        self
    }

    pub fn with_feedback(mut self, feedback: Value) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Objective vector, `{score}` when none were reported
    pub fn objective_vector(&self) -> ObjectiveScores {
        if self.objectives.is_empty() {
            ObjectiveScores::from([("score".to_string(), self.score)])
        } else {
            self.objectives.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExampleEval {
    pub example_index: usize,
    pub result: EvalResult,
}

/// Aggregates over a set of evaluations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateStats {
    pub mean_score: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mean_objectives: ObjectiveScores,
    pub n: usize,
}

impl CandidateStats {
    /// Objective vector used for Pareto selection
    pub fn objective_vector(&self) -> ObjectiveScores {
        if self.mean_objectives.is_empty() {
            ObjectiveScores::from([("score".to_string(), self.mean_score)])
        } else {
            self.mean_objectives.clone()
        }
    }
}

/// Mean score, per-key mean objectives and count; an empty slice gives zeroed stats
pub fn aggregate_stats(evals: &[ExampleEval]) -> CandidateStats {
    if evals.is_empty() {
        return CandidateStats::default();
    }
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut total = 0.0;
    for eval in evals {
        total += eval.result.score;
        for (key, value) in eval.result.objective_vector() {
            let entry = sums.entry(key).or_insert((0.0, 0));
            entry.0 += value;
            entry.1 += 1;
        }
    }
    CandidateStats {
        mean_score: total / evals.len() as f64,
        mean_objectives: sums
            .into_iter()
            .map(|(key, (sum, count))| (key, sum / count as f64))
            .collect(),
        n: evals.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_is_order_independent() {
        let a = Candidate::new().with("prompt", "p").with("style", "s");
        let b: Candidate = [("style", "s"), ("prompt", "p")].into_iter().collect();
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.hash().len(), 64);
        assert_ne!(a.hash(), a.clone().with("style", "t").hash());
        // the encoding is the sorted pair list
        assert_eq!(
            a.hash(),
            sha256::digest(r#"[{"k":"prompt","v":"p"},{"k":"style","v":"s"}]"#)
        );
    }

    #[test]
    fn test_primary_param_key() {
        assert_eq!(Candidate::from_prompt("x").primary_param_key(), "prompt");
        let c = Candidate::new().with("zeta", "1").with("alpha", "2");
        assert_eq!(c.primary_param_key(), "alpha");
        assert_eq!(Candidate::new().primary_param_key(), "prompt");
    }

    #[test]
    fn test_aggregate_stats() {
        let evals = vec![
            ExampleEval {
                example_index: 0,
                result: EvalResult::from_score(1.0).with_objective("acc", 1.0),
            },
            ExampleEval {
                example_index: 1,
                result: EvalResult::from_score(0.0).with_objective("acc", 0.5),
            },
        ];
        let stats = aggregate_stats(&evals);
        assert_eq!(stats.n, 2);
        assert_eq!(stats.mean_score, 0.5);
        assert_eq!(stats.mean_objectives["acc"], 0.75);
        assert_eq!(aggregate_stats(&[]), CandidateStats::default());
    }

    #[test]
    fn test_eval_result_serialization_skips_empty() {
        let value = serde_json::to_value(EvalResult::from_score(0.25)).unwrap();
        assert_eq!(value, json!({"score": 0.25}));
    }
}
