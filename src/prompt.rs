//! Deterministic construction of step prompts and retry reminders
//! (SPEC_FULL.md §4.3).

use crate::model::Step;

fn outcome_examples(step: &Step) -> Vec<String> {
    let mut non_other: Vec<&str> = step
        .outcomes
        .iter()
        .map(String::as_str)
        .filter(|o| *o != "other")
        .collect();
    non_other.sort_unstable();

    let mut lines: Vec<String> = non_other
        .into_iter()
        .map(|outcome| format!(r#"{{"outcome": "{outcome}"}}"#))
        .collect();

    if step.outcomes.iter().any(|o| o == "other") {
        lines.push(
            r#"{"outcome": "other", "otherDescription": "<brief description>"}"#.to_string(),
        );
    }

    lines
}

/// Builds the prompt sent to the agent for a fresh visit to `step`: the
/// step's own instruction text followed by two newlines and the outcome
/// format block, with non-"other" outcomes in lexicographic order and
/// "other" always last.
pub fn build_step_prompt(step: &Step) -> String {
    let mut out = String::new();
    out.push_str(&step.prompt);
    out.push_str("\n\n");
    out.push_str("End your response with one of these JSON blocks on the last line:\n\n");
    for line in outcome_examples(step) {
        out.push_str(&line);
        out.push('\n');
    }
    out
}

/// Builds the one-shot retry reminder sent after a failed outcome
/// extraction. Never sent more than once per step visit (enforced by the
/// engine, not by this function).
pub fn build_reminder_prompt(step: &Step, error: &str) -> String {
    let mut out = String::new();
    out.push_str("Your previous response did not include the required JSON outcome block.\n");
    out.push_str("Please respond now with ONLY the JSON outcome on a single line.\n");
    out.push_str(&format!("Error: {error}\n"));
    out.push_str("Valid responses:\n");
    for line in outcome_examples(step) {
        out.push_str(&line);
        out.push('\n');
    }
    out.push_str("Respond with ONLY the JSON block, nothing else.");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Transition;
    use std::collections::HashMap;

    fn step(outcomes: &[&str]) -> Step {
        let mut on_outcome = HashMap::new();
        for o in outcomes {
            on_outcome.insert(
                o.to_string(),
                Transition::Exit {
                    reason: "x".to_string(),
                },
            );
        }
        Step {
            prompt: "Review the code.".to_string(),
            outcomes: outcomes.iter().map(|s| s.to_string()).collect(),
            on_outcome,
            model: None,
        }
    }

    #[test]
    fn orders_non_other_lexicographically_and_other_last() {
        let s = step(&["zeta", "alpha", "other"]);
        let prompt = build_step_prompt(&s);
        let alpha_pos = prompt.find(r#"{"outcome": "alpha"}"#).unwrap();
        let zeta_pos = prompt.find(r#"{"outcome": "zeta"}"#).unwrap();
        let other_pos = prompt.find(r#""outcome": "other""#).unwrap();
        assert!(alpha_pos < zeta_pos);
        assert!(zeta_pos < other_pos);
    }

    #[test]
    fn is_deterministic() {
        let s = step(&["b", "a"]);
        assert_eq!(build_step_prompt(&s), build_step_prompt(&s));
    }

    #[test]
    fn separates_base_prompt_with_exactly_two_newlines() {
        let s = step(&["done"]);
        let prompt = build_step_prompt(&s);
        assert!(prompt.starts_with("Review the code.\n\nEnd your response"));
    }

    #[test]
    fn reminder_includes_the_error_and_valid_outcomes() {
        let s = step(&["done", "other"]);
        let reminder = build_reminder_prompt(&s, "No JSON block found in response");
        assert!(reminder.contains("No JSON block found in response"));
        assert!(reminder.contains(r#"{"outcome": "done"}"#));
        assert!(reminder.ends_with("Respond with ONLY the JSON block, nothing else."));
    }
}
