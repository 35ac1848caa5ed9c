//! Parses a [`Recipe`](crate::model::Recipe) from its YAML representation.
//!
//! Mirrors the three-tier bundled/project/explicit resolution the teacher's
//! `recipes.rs` used for a fixed pair of recipes, generalized to an arbitrary
//! catalog directory in [`super::catalog`].

use std::collections::HashMap;

use serde::Deserialize;
use thiserror::Error;

use crate::model::{Guardrails, Recipe, Step, Transition};

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to parse recipe YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("step {step:?} declares a transition with no recognizable shape (expected nextStep, or action: exit/restart-new-session)")]
    UnknownTransitionShape { step: String, outcome: String },
    #[error("step {step:?} outcome {outcome:?}: \"exit\" transition is missing a reason")]
    ExitMissingReason { step: String, outcome: String },
    #[error("step {step:?} outcome {outcome:?}: \"restart-new-session\" transition is missing recipeId")]
    RestartMissingRecipeId { step: String, outcome: String },
    #[error("step {step:?} outcome {outcome:?}: unknown action {action:?}")]
    UnknownAction {
        step: String,
        outcome: String,
        action: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawRecipe {
    #[serde(default)]
    id: String,
    #[serde(default)]
    label: String,
    #[serde(default)]
    description: String,
    #[serde(rename = "initialStep")]
    initial_step: String,
    /// Raw tier name, checked against the closed tier set by the validator,
    /// not here — an unrecognized value must produce a `ValidationError`
    /// (exit 1), not a YAML parse failure (exit 5).
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    guardrails: RawGuardrails,
    steps: indexmap::IndexMap<String, RawStep>,
}

#[derive(Debug, Default, Deserialize)]
struct RawGuardrails {
    #[serde(rename = "maxStepVisits")]
    max_step_visits: Option<u32>,
    #[serde(rename = "maxTotalSteps")]
    max_total_steps: Option<u32>,
    #[serde(rename = "exitOnOther")]
    exit_on_other: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    prompt: String,
    #[serde(default)]
    outcomes: Vec<String>,
    #[serde(rename = "onOutcome", default)]
    on_outcome: HashMap<String, RawTransition>,
    /// Raw tier name; see [`RawRecipe::model`].
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTransition {
    #[serde(rename = "nextStep")]
    next_step: Option<String>,
    action: Option<String>,
    reason: Option<String>,
    #[serde(rename = "recipeId")]
    recipe_id: Option<String>,
}

fn convert_transition(
    step_name: &str,
    outcome: &str,
    raw: RawTransition,
) -> Result<Transition, LoaderError> {
    if let Some(next) = raw.next_step {
        return Ok(Transition::NextStep(next));
    }
    match raw.action.as_deref() {
        Some("exit") => {
            let reason = raw.reason.filter(|r| !r.is_empty()).ok_or_else(|| {
                LoaderError::ExitMissingReason {
                    step: step_name.to_string(),
                    outcome: outcome.to_string(),
                }
            })?;
            Ok(Transition::Exit { reason })
        }
        Some("restart-new-session") => {
            let recipe_id = raw.recipe_id.filter(|r| !r.is_empty()).ok_or_else(|| {
                LoaderError::RestartMissingRecipeId {
                    step: step_name.to_string(),
                    outcome: outcome.to_string(),
                }
            })?;
            Ok(Transition::RestartNewSession { recipe_id })
        }
        Some(other) => Err(LoaderError::UnknownAction {
            step: step_name.to_string(),
            outcome: outcome.to_string(),
            action: other.to_string(),
        }),
        None => Err(LoaderError::UnknownTransitionShape {
            step: step_name.to_string(),
            outcome: outcome.to_string(),
        }),
    }
}

/// Parses recipe source text into a [`Recipe`]. Does not validate it (see
/// [`super::validator::validate_recipe`]); loading only fails when the YAML
/// itself is malformed or a transition's shape is unrecognizable.
pub fn load_recipe_str(source: &str) -> Result<Recipe, LoaderError> {
    let raw: RawRecipe = serde_yaml::from_str(source)?;

    let mut step_order = Vec::with_capacity(raw.steps.len());
    let mut steps = HashMap::with_capacity(raw.steps.len());

    for (name, raw_step) in raw.steps {
        let mut on_outcome = HashMap::with_capacity(raw_step.on_outcome.len());
        for (outcome, raw_transition) in raw_step.on_outcome {
            let transition = convert_transition(&name, &outcome, raw_transition)?;
            on_outcome.insert(outcome, transition);
        }
        step_order.push(name.clone());
        steps.insert(
            name,
            Step {
                prompt: raw_step.prompt,
                outcomes: raw_step.outcomes,
                on_outcome,
                model: raw_step.model,
            },
        );
    }

    let guardrails = Guardrails {
        max_step_visits: raw
            .guardrails
            .max_step_visits
            .unwrap_or_else(|| Guardrails::default().max_step_visits),
        max_total_steps: raw
            .guardrails
            .max_total_steps
            .unwrap_or_else(|| Guardrails::default().max_total_steps),
        exit_on_other: raw
            .guardrails
            .exit_on_other
            .unwrap_or_else(|| Guardrails::default().exit_on_other),
    };

    Ok(Recipe {
        label: if raw.label.is_empty() {
            raw.id.clone()
        } else {
            raw.label
        },
        id: raw.id,
        description: raw.description,
        initial_step: raw.initial_step,
        step_order,
        steps,
        guardrails,
        model: raw.model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
id: smoke-test
initialStep: only
steps:
  only:
    prompt: "Say hello."
    outcomes: [done]
    onOutcome:
      done:
        action: exit
        reason: "said hello"
"#;

    #[test]
    fn loads_minimal_recipe() {
        let recipe = load_recipe_str(MINIMAL).expect("should parse");
        assert_eq!(recipe.id, "smoke-test");
        assert_eq!(recipe.initial_step, "only");
        assert_eq!(recipe.guardrails.max_step_visits, 3);
        let step = recipe.step("only").unwrap();
        match step.on_outcome.get("done").unwrap() {
            Transition::Exit { reason } => assert_eq!(reason, "said hello"),
            other => panic!("expected Exit, got {other:?}"),
        }
    }

    #[test]
    fn rejects_transition_with_unknown_shape() {
        let src = r#"
id: bad
initialStep: only
steps:
  only:
    prompt: "x"
    outcomes: [done]
    onOutcome:
      done: {}
"#;
        let err = load_recipe_str(src).unwrap_err();
        assert!(matches!(err, LoaderError::UnknownTransitionShape { .. }));
    }

    #[test]
    fn rejects_exit_without_reason() {
        let src = r#"
id: bad
initialStep: only
steps:
  only:
    prompt: "x"
    outcomes: [done]
    onOutcome:
      done:
        action: exit
"#;
        let err = load_recipe_str(src).unwrap_err();
        assert!(matches!(err, LoaderError::ExitMissingReason { .. }));
    }

    #[test]
    fn absent_id_parses_to_an_empty_string_rather_than_failing() {
        let src = r#"
initialStep: only
steps:
  only:
    prompt: "x"
    outcomes: [done]
    onOutcome:
      done:
        action: exit
        reason: "finished"
"#;
        let recipe = load_recipe_str(src).expect("missing id should not be a parse error");
        assert_eq!(recipe.id, "");
    }

    #[test]
    fn an_unrecognized_model_tier_string_still_loads_successfully() {
        let src = r#"
id: bad-model
model: ultra-fast
initialStep: only
steps:
  only:
    prompt: "x"
    outcomes: [done]
    onOutcome:
      done:
        action: exit
        reason: "finished"
"#;
        let recipe =
            load_recipe_str(src).expect("an unknown tier is a validator error, not a load error");
        assert_eq!(recipe.model.as_deref(), Some("ultra-fast"));
    }

    #[test]
    fn rejects_unknown_action() {
        let src = r#"
id: bad
initialStep: only
steps:
  only:
    prompt: "x"
    outcomes: [done]
    onOutcome:
      done:
        action: teleport
"#;
        let err = load_recipe_str(src).unwrap_err();
        assert!(matches!(err, LoaderError::UnknownAction { .. }));
    }
}
