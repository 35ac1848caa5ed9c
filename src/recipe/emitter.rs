//! Canonical re-emission of a [`Recipe`] back to YAML, used to test the
//! loader/emitter round-trip property (SPEC_FULL.md §8).

use indexmap::IndexMap;
use serde::Serialize;

use crate::model::{Recipe, Transition};

#[derive(Serialize)]
struct EmitRecipe<'a> {
    id: &'a str,
    label: &'a str,
    description: &'a str,
    #[serde(rename = "initialStep")]
    initial_step: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    guardrails: EmitGuardrails,
    steps: IndexMap<&'a str, EmitStep<'a>>,
}

#[derive(Serialize)]
struct EmitGuardrails {
    #[serde(rename = "maxStepVisits")]
    max_step_visits: u32,
    #[serde(rename = "maxTotalSteps")]
    max_total_steps: u32,
    #[serde(rename = "exitOnOther")]
    exit_on_other: bool,
}

#[derive(Serialize)]
struct EmitStep<'a> {
    prompt: &'a str,
    outcomes: &'a [String],
    #[serde(rename = "onOutcome")]
    on_outcome: IndexMap<&'a str, EmitTransition<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum EmitTransition<'a> {
    NextStep {
        #[serde(rename = "nextStep")]
        next_step: &'a str,
    },
    Exit {
        action: &'a str,
        reason: &'a str,
    },
    Restart {
        action: &'a str,
        #[serde(rename = "recipeId")]
        recipe_id: &'a str,
    },
}

/// Serializes `recipe` to the same YAML shape the loader accepts, preserving
/// declared step and outcome order.
pub fn emit_recipe(recipe: &Recipe) -> Result<String, serde_yaml::Error> {
    let mut steps = IndexMap::with_capacity(recipe.step_order.len());
    for name in &recipe.step_order {
        let step = recipe
            .steps
            .get(name)
            .expect("step_order entries are always keys of steps");
        let mut on_outcome = IndexMap::with_capacity(step.outcomes.len());
        for outcome in &step.outcomes {
            let transition = step
                .on_outcome
                .get(outcome)
                .expect("validated recipes have total onOutcome coverage");
            let emitted = match transition {
                Transition::NextStep(next) => EmitTransition::NextStep { next_step: next },
                Transition::Exit { reason } => EmitTransition::Exit {
                    action: "exit",
                    reason,
                },
                Transition::RestartNewSession { recipe_id } => EmitTransition::Restart {
                    action: "restart-new-session",
                    recipe_id,
                },
            };
            on_outcome.insert(outcome.as_str(), emitted);
        }
        steps.insert(
            name.as_str(),
            EmitStep {
                prompt: &step.prompt,
                outcomes: &step.outcomes,
                on_outcome,
                model: step.model.as_deref(),
            },
        );
    }

    let emit = EmitRecipe {
        id: &recipe.id,
        label: &recipe.label,
        description: &recipe.description,
        initial_step: &recipe.initial_step,
        model: recipe.model.as_deref(),
        guardrails: EmitGuardrails {
            max_step_visits: recipe.guardrails.max_step_visits,
            max_total_steps: recipe.guardrails.max_total_steps,
            exit_on_other: recipe.guardrails.exit_on_other,
        },
        steps,
    };

    serde_yaml::to_string(&emit)
}
