//! Recovers a structured outcome from an agent's free-text response
//! (SPEC_FULL.md §4.5).
//!
//! Grounded on the teacher's `src/phases/json_utils.rs::extract_json_block`
//! (fence-then-brace detection), extended with the windowed last-5-lines
//! scan and the strict "find the line, then strip its fences" ordering the
//! new contract requires.

use std::collections::HashSet;

use serde_json::Value;

use crate::model::OutcomeResult;

const TAIL_WINDOW: usize = 5;

fn strip_fences(candidate: &str) -> &str {
    let mut s = candidate.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

/// Scans the last [`TAIL_WINDOW`] lines of `text`, from most recent
/// backwards, for the first line whose trimmed form both starts with `{`
/// and ends with `}`.
fn find_candidate_line(text: &str) -> Option<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(TAIL_WINDOW);
    lines[start..]
        .iter()
        .rev()
        .map(|line| line.trim())
        .find(|trimmed| trimmed.starts_with('{') && trimmed.ends_with('}'))
}

/// Extracts a structured outcome from `response_text`, validating the
/// result against `valid_outcomes`.
pub fn extract_outcome(response_text: &str, valid_outcomes: &HashSet<&str>) -> OutcomeResult {
    let Some(candidate_line) = find_candidate_line(response_text) else {
        return OutcomeResult::Failure {
            message: "No JSON block found in response".to_string(),
            malformed_candidate: None,
        };
    };

    let cleaned = strip_fences(candidate_line);

    let parsed: Value = match serde_json::from_str(cleaned) {
        Ok(v) => v,
        Err(err) => {
            return OutcomeResult::Failure {
                message: format!("could not parse JSON outcome block: {err}"),
                malformed_candidate: Some(cleaned.to_string()),
            };
        }
    };

    let Some(outcome) = parsed.get("outcome").and_then(Value::as_str) else {
        return OutcomeResult::Failure {
            message: "JSON outcome block is missing a string \"outcome\" field".to_string(),
            malformed_candidate: Some(cleaned.to_string()),
        };
    };

    if !valid_outcomes.contains(outcome) {
        return OutcomeResult::Failure {
            message: format!(
                "outcome {outcome:?} is not in valid outcomes: {valid_outcomes:?}"
            ),
            malformed_candidate: Some(cleaned.to_string()),
        };
    }

    if outcome == "other" {
        let description = parsed.get("otherDescription").and_then(Value::as_str);
        match description {
            Some(d) if !d.trim().is_empty() => OutcomeResult::Success {
                outcome: outcome.to_string(),
                other_description: Some(d.to_string()),
            },
            _ => OutcomeResult::Failure {
                message: "outcome \"other\" requires a non-blank otherDescription".to_string(),
                malformed_candidate: Some(cleaned.to_string()),
            },
        }
    } else {
        OutcomeResult::Success {
            outcome: outcome.to_string(),
            other_description: None,
        }
    }
}
