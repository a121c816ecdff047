use super::types::ExampleEval;
use serde_json::Value;
use std::fmt::Write;

pub const TRUNCATION_MARKER: &str = "[TRUNCATED]";

/// Render a minibatch of evaluations as the reflector's side-info.
///
/// One markdown section per evaluation, in order. `max_chars == 0` leaves the output uncapped;
/// otherwise the text is cut at the last line boundary within the cap and marked truncated.
pub fn format_side_info(examples: &[Value], evals: &[ExampleEval], max_chars: usize) -> String {
    let mut out = String::new();
    for (i, eval) in evals.iter().enumerate() {
        let _ = writeln!(out, "### Example {}", i + 1);
        if let Some(example) = examples.get(eval.example_index) {
            write_section(&mut out, "Input", &pretty_json(example));
        }
        let result = &eval.result;
        if let Some(output) = &result.output {
            write_section(&mut out, "Assistant Response", &display_value(output));
        }
        write_section(&mut out, "Score", &format!("{:.6}", result.score));
        if !result.objectives.is_empty() {
            let objectives = serde_json::to_value(&result.objectives).unwrap_or(Value::Null);
            write_section(&mut out, "Objective Scores", &pretty_json(&objectives));
        }
        if let Some(feedback) = &result.feedback {
            write_section(&mut out, "Feedback", &display_value(feedback));
        }
        if let Some(trace) = &result.trace {
            write_section(&mut out, "Trace", &display_value(trace));
        }
        out.push('\n');

        if max_chars > 0 && out.chars().count() > max_chars {
            return truncate_at_line(&out, max_chars);
        }
    }
    out
}

fn write_section(out: &mut String, title: &str, body: &str) {
    let _ = write!(out, "#### {}\n{}\n\n", title, body.trim_end());
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Strings verbatim, everything else as pretty JSON
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => pretty_json(other),
    }
}

fn truncate_at_line(text: &str, max_chars: usize) -> String {
    let cut = text
        .char_indices()
        .nth(max_chars)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len());
    let head = &text[..cut];
    let head = match head.rfind('\n') {
        Some(pos) => &head[..pos],
        None => head,
    };
    format!("{}\n\n{}\n", head.trim_end_matches('\n'), TRUNCATION_MARKER)
}
