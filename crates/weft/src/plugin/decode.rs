//! Lenient decoding of values returned by plugin code

use super::error::{PluginError, Result};
use crate::gepa::{EvalResult, ObjectiveScores};
use serde_json::{Map, Value};

/// Normalize a raw return value: null is rejected, strings holding JSON are parsed
pub fn decode_return_value(value: Value) -> Result<Value> {
    match value {
        Value::Null => Err(PluginError::InvalidReturn(
            "returned null/undefined".to_string(),
        )),
        Value::String(raw) => {
            if raw.trim().is_empty() {
                return Err(PluginError::InvalidReturn(
                    "returned empty string".to_string(),
                ));
            }
            Ok(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
        }
        other => Ok(other),
    }
}

/// Read a score from a number or a numeric string
pub fn to_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Build an [`EvalResult`] from a decoded return value.
///
/// A bare number is the score. Objects need `score` (or `value`) and may carry
/// `objectiveScores`/`objectives`, `output`, `feedback`, `trace` and `notes`/`evaluatorNotes`.
pub fn decode_eval_result(value: &Value) -> Result<EvalResult> {
    match value {
        Value::Number(_) => Ok(EvalResult::from_score(to_score(value).unwrap_or_default())),
        Value::Object(map) => decode_object(map),
        other => Err(PluginError::InvalidReturn(format!(
            "evaluator must return an object with {{score}}, got {}",
            type_name(other)
        ))),
    }
}

fn decode_object(map: &Map<String, Value>) -> Result<EvalResult> {
    let raw_score = map
        .get("score")
        .or_else(|| map.get("value"))
        .ok_or(PluginError::MissingScore)?;
    let score = to_score(raw_score)
        .ok_or_else(|| PluginError::InvalidReturn(format!("invalid score: {}", raw_score)))?;

    let objectives = ["objectiveScores", "objectives"]
        .iter()
        .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
        .map(decode_objectives)
        .unwrap_or_default();

    let present = |key: &str| map.get(key).filter(|v| !v.is_null()).cloned();
    let notes = ["notes", "evaluatorNotes"]
        .iter()
        .find_map(|key| map.get(*key).and_then(Value::as_str))
        .map(str::to_string);

    Ok(EvalResult {
        score,
        objectives,
        output: present("output"),
        feedback: present("feedback"),
        trace: present("trace"),
        raw: None,
        evaluator_notes: notes,
    })
}

/// Numeric entries only; anything else is skipped
fn decode_objectives(value: &Value) -> ObjectiveScores {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| to_score(v).map(|score| (k.clone(), score)))
                .collect()
        })
        .unwrap_or_default()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
