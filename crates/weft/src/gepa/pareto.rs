//! Dominance and frontier helpers; higher is better on every objective

use super::types::ObjectiveScores;
use std::collections::BTreeSet;

/// `a` dominates `b` when it is no worse on every key and strictly better on one.
/// A key missing from either side counts as negative infinity.
pub fn dominates(a: &ObjectiveScores, b: &ObjectiveScores) -> bool {
    let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
    let mut strictly_better = false;
    for key in keys {
        let av = a.get(key).copied().unwrap_or(f64::NEG_INFINITY);
        let bv = b.get(key).copied().unwrap_or(f64::NEG_INFINITY);
        if av < bv {
            return false;
        }
        if av > bv {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Indices of the non-dominated points, in input order
pub fn pareto_front(points: &[ObjectiveScores]) -> Vec<usize> {
    (0..points.len())
        .filter(|&i| {
            !points
                .iter()
                .enumerate()
                .any(|(j, other)| i != j && dominates(other, &points[i]))
        })
        .collect()
}

/// Indices sorted by descending score, at most `k` of them
pub fn top_k_by_score(scores: &[f64], k: usize) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..scores.len()).collect();
    indices.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));
    indices.truncate(k);
    indices
}
