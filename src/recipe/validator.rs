//! Structural validation of a loaded [`Recipe`] (SPEC_FULL.md §4.2).
//!
//! Adapted from the teacher's checklist pattern in
//! `src/config/checklist.rs` (`CheckDefinition` / `HardChecklist`): a
//! sequence of named checks run in a fixed order against one value,
//! collecting every failure rather than stopping at the first.

use crate::model::{ModelTier, Recipe, Transition};

type Check = fn(&Recipe) -> Vec<String>;

const CHECKS: &[Check] = &[
    check_initial_step_exists,
    check_on_outcome_keys_are_declared_outcomes,
    check_outcomes_have_total_coverage,
    check_next_step_targets_exist,
    check_exit_and_restart_payloads_nonempty,
    check_model_tiers_are_known,
    check_steps_are_well_formed,
];

/// Runs every structural rule against `recipe`, returning an ordered list of
/// human-readable error strings. An empty result means the recipe is valid.
pub fn validate_recipe(recipe: &Recipe) -> Vec<String> {
    CHECKS.iter().flat_map(|check| check(recipe)).collect()
}

fn check_initial_step_exists(recipe: &Recipe) -> Vec<String> {
    if recipe.steps.contains_key(&recipe.initial_step) {
        Vec::new()
    } else {
        vec![format!(
            "initialStep {:?} is not a declared step",
            recipe.initial_step
        )]
    }
}

fn check_on_outcome_keys_are_declared_outcomes(recipe: &Recipe) -> Vec<String> {
    let mut errors = Vec::new();
    for (step_name, step) in &recipe.steps {
        let declared = step.outcome_set();
        for outcome in step.on_outcome.keys() {
            if !declared.contains(outcome.as_str()) {
                errors.push(format!(
                    "step {step_name:?} has an onOutcome entry for {outcome:?}, which is not in its declared outcomes"
                ));
            }
        }
    }
    errors
}

fn check_outcomes_have_total_coverage(recipe: &Recipe) -> Vec<String> {
    let mut errors = Vec::new();
    for (step_name, step) in &recipe.steps {
        for outcome in &step.outcomes {
            if !step.on_outcome.contains_key(outcome) {
                errors.push(format!(
                    "step {step_name:?} declares outcome {outcome:?} with no onOutcome entry"
                ));
            }
        }
    }
    errors
}

fn check_next_step_targets_exist(recipe: &Recipe) -> Vec<String> {
    let mut errors = Vec::new();
    for (step_name, step) in &recipe.steps {
        for transition in step.on_outcome.values() {
            if let Transition::NextStep(target) = transition {
                if !recipe.steps.contains_key(target) {
                    errors.push(format!(
                        "step {step_name:?} has a nextStep transition to {target:?}, which is not a declared step"
                    ));
                }
            }
        }
    }
    errors
}

fn check_exit_and_restart_payloads_nonempty(recipe: &Recipe) -> Vec<String> {
    let mut errors = Vec::new();
    for (step_name, step) in &recipe.steps {
        for (outcome, transition) in &step.on_outcome {
            match transition {
                Transition::Exit { reason } if reason.trim().is_empty() => {
                    errors.push(format!(
                        "step {step_name:?} outcome {outcome:?} has an exit transition with an empty reason"
                    ));
                }
                Transition::RestartNewSession { recipe_id } if recipe_id.trim().is_empty() => {
                    errors.push(format!(
                        "step {step_name:?} outcome {outcome:?} has a restart-new-session transition with an empty recipeId"
                    ));
                }
                _ => {}
            }
        }
    }
    errors
}

fn check_model_tiers_are_known(recipe: &Recipe) -> Vec<String> {
    let mut errors = Vec::new();
    if let Some(model) = &recipe.model {
        if ModelTier::parse(model).is_none() {
            errors.push(format!(
                "recipe model {model:?} is not a known tier (expected haiku, sonnet, or opus)"
            ));
        }
    }
    for (step_name, step) in &recipe.steps {
        if let Some(model) = &step.model {
            if ModelTier::parse(model).is_none() {
                errors.push(format!(
                    "step {step_name:?} model {model:?} is not a known tier (expected haiku, sonnet, or opus)"
                ));
            }
        }
    }
    errors
}

fn check_steps_are_well_formed(recipe: &Recipe) -> Vec<String> {
    let mut errors = Vec::new();
    for (step_name, step) in &recipe.steps {
        if step.prompt.trim().is_empty() {
            errors.push(format!("step {step_name:?} has a blank prompt"));
        }
        if step.outcomes.is_empty() {
            errors.push(format!("step {step_name:?} declares no outcomes"));
        }
        if step.on_outcome.is_empty() && !step.outcomes.is_empty() {
            errors.push(format!("step {step_name:?} has no onOutcome entries"));
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::loader::load_recipe_str;

    #[test]
    fn valid_recipe_has_no_errors() {
        let src = r#"
id: ok
initialStep: a
steps:
  a:
    prompt: "do it"
    outcomes: [done]
    onOutcome:
      done:
        action: exit
        reason: "finished"
"#;
        let recipe = load_recipe_str(src).unwrap();
        assert!(validate_recipe(&recipe).is_empty());
    }

    #[test]
    fn catches_missing_initial_step_and_dangling_next_step() {
        let src = r#"
id: broken
initialStep: missing
steps:
  a:
    prompt: "do it"
    outcomes: [ok]
    onOutcome:
      ok:
        nextStep: missing
"#;
        let recipe = load_recipe_str(src).unwrap();
        let errors = validate_recipe(&recipe);
        assert!(errors.iter().any(|e| e.contains("initialStep")));
        assert!(errors.iter().any(|e| e.contains("nextStep")));
        assert_eq!(errors.len(), 2, "errors: {errors:?}");
    }

    #[test]
    fn catches_partial_outcome_coverage_both_directions() {
        let src = r#"
id: broken
initialStep: a
steps:
  a:
    prompt: "do it"
    outcomes: [ok, other]
    onOutcome:
      ok:
        action: exit
        reason: "done"
      unexpected:
        action: exit
        reason: "n/a"
"#;
        let recipe = load_recipe_str(src).unwrap();
        let errors = validate_recipe(&recipe);
        assert!(errors
            .iter()
            .any(|e| e.contains("other") && e.contains("no onOutcome entry")));
        assert!(errors
            .iter()
            .any(|e| e.contains("unexpected") && e.contains("not in its declared outcomes")));
    }

    #[test]
    fn catches_unknown_model_tier_at_recipe_and_step_level() {
        let src = r#"
id: broken
model: ultra
initialStep: a
steps:
  a:
    prompt: "do it"
    outcomes: [done]
    model: sonnet-large
    onOutcome:
      done:
        action: exit
        reason: "finished"
"#;
        let recipe = load_recipe_str(src).unwrap();
        let errors = validate_recipe(&recipe);
        assert!(errors.iter().any(|e| e.contains("recipe model \"ultra\"")));
        assert!(errors
            .iter()
            .any(|e| e.contains("step \"a\" model \"sonnet-large\"")));
    }

    #[test]
    fn is_idempotent() {
        let src = r#"
id: broken
initialStep: missing
steps:
  a:
    prompt: ""
    outcomes: []
    onOutcome: {}
"#;
        let recipe = load_recipe_str(src).unwrap();
        let first = validate_recipe(&recipe);
        let second = validate_recipe(&recipe);
        assert_eq!(first, second);
    }
}
