//! The orchestration engine: the execution loop, guardrail enforcement,
//! and session/restart lifecycle (SPEC_FULL.md §4.6, §5).
//!
//! Generalizes the teacher's `src/orchestrator/loop_controller.rs`
//! `LoopController::run()` — a `while state.should_continue() { ... }` loop
//! with phase-dispatch sub-methods fixed to a plan/review cycle — into a
//! table-driven step/transition loop over an arbitrary recipe. Guardrail
//! enforcement follows the `Result<(), GuardrailHardStop>` check pattern of
//! `src/orchestrator/guardrails.rs`, narrowed to the three purely numeric
//! bounds this spec's `Guardrails` carries.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::backend::{AgentBackend, BackendError};
use crate::model::{ExecutionState, ModelTier, OutcomeResult, Recipe, Transition};
use crate::outcome::extract_outcome;
use crate::prompt::{build_reminder_prompt, build_step_prompt};
use crate::recipe::catalog::{CatalogError, RecipeCatalog};
use crate::recipe::validator::validate_recipe;
use crate::session::{SessionBusy, SessionRegistry};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("recipe {recipe_id:?} failed validation:\n{}", .errors.join("\n"))]
    Validation {
        recipe_id: String,
        errors: Vec<String>,
    },
    #[error("orchestration error: {0}")]
    Orchestration(String),
    #[error("guardrail triggered: {0}")]
    Guardrail(String),
    #[error("backend error: {0}")]
    Backend(String),
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    /// Maps this error to the exit code mandated by SPEC_FULL.md §6.
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::Validation { .. } => 1,
            EngineError::Orchestration(_) => 2,
            EngineError::Guardrail(_) => 3,
            EngineError::Backend(_) => 4,
            EngineError::Configuration(_) => 5,
        }
    }
}

impl From<CatalogError> for EngineError {
    fn from(err: CatalogError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

impl From<BackendError> for EngineError {
    fn from(err: BackendError) -> Self {
        EngineError::Backend(err.to_string())
    }
}

/// Per-run options that come from CLI flags / config, layered over recipe
/// and step defaults (SPEC_FULL.md §6).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub working_dir: PathBuf,
    pub model_override: Option<ModelTier>,
    pub system_prompt: Option<String>,
    pub env_overrides: Vec<(String, String)>,
    /// `None` means unlimited, matching the CLI's documented default.
    pub max_restarts: Option<u32>,
    pub max_step_visits_override: Option<u32>,
    pub max_total_steps_override: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            model_override: None,
            system_prompt: None,
            env_overrides: Vec::new(),
            max_restarts: None,
            max_step_visits_override: None,
            max_total_steps_override: None,
        }
    }
}

/// The terminal result of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub final_status: String,
    pub step_count: u32,
    pub restarts: u32,
}

pub struct Engine<'a> {
    catalog: &'a RecipeCatalog,
    backend: Arc<dyn AgentBackend>,
    sessions: SessionRegistry,
    config: EngineConfig,
}

impl<'a> Engine<'a> {
    pub fn new(
        catalog: &'a RecipeCatalog,
        backend: Arc<dyn AgentBackend>,
        sessions: SessionRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            catalog,
            backend,
            sessions,
            config,
        }
    }

    fn load_and_validate(&self, recipe_id: &str) -> Result<&'a Recipe, EngineError> {
        let recipe = self.catalog.get(recipe_id)?;
        let errors = validate_recipe(recipe);
        if !errors.is_empty() {
            return Err(EngineError::Validation {
                recipe_id: recipe_id.to_string(),
                errors,
            });
        }
        Ok(recipe)
    }

    fn effective_guardrails(&self, recipe: &Recipe) -> (u32, u32) {
        let max_step_visits = self
            .config
            .max_step_visits_override
            .unwrap_or(recipe.guardrails.max_step_visits);
        let max_total_steps = self
            .config
            .max_total_steps_override
            .unwrap_or(recipe.guardrails.max_total_steps);
        (max_step_visits, max_total_steps)
    }

    /// Resolves the effective model tier for a step: a per-step override
    /// beats the CLI's `--model` flag, which in turn beats the recipe's own
    /// default (SPEC_FULL.md §6: "`--model` ... overrides the recipe default
    /// but not a per-step override"). Recipe/step values are raw strings
    /// that `load_and_validate` has already confirmed parse as a
    /// [`ModelTier`]; a value that somehow still doesn't parse is treated as
    /// absent rather than panicking.
    fn resolve_model(&self, recipe: &Recipe, step_model: Option<&str>) -> Option<String> {
        let step_tier = step_model.and_then(ModelTier::parse);
        let recipe_tier = recipe.model.as_deref().and_then(ModelTier::parse);
        let tier = step_tier.or(self.config.model_override).or(recipe_tier)?;
        self.backend.resolve_model(tier)
    }

    /// Runs `recipe_id` to completion: a terminal Exit transition, a
    /// guardrail trip, or a fatal backend/orchestration error.
    pub async fn run(&self, recipe_id: &str) -> Result<RunOutcome, EngineError> {
        let mut recipe = self.load_and_validate(recipe_id)?;
        let mut session_id = uuid::Uuid::new_v4().to_string();
        let mut state = ExecutionState::new(&recipe.id, &recipe.initial_step);
        let mut restarts = 0u32;

        let mut lock = self.acquire(&session_id)?;

        loop {
            let (max_step_visits, max_total_steps) = self.effective_guardrails(recipe);
            let step = recipe.step(&state.current_step).ok_or_else(|| {
                EngineError::Orchestration(format!(
                    "current step {:?} is not present in recipe {:?}",
                    state.current_step, recipe.id
                ))
            })?;

            let model_id = self.resolve_model(recipe, step.model.as_deref());
            let prompt = build_step_prompt(step);
            debug!(step = %state.current_step, "sending step prompt");

            let response = self
                .backend
                .send_prompt(
                    &prompt,
                    &session_id,
                    !state.session_created,
                    &self.config.working_dir,
                    model_id.as_deref(),
                    self.config.system_prompt.as_deref(),
                    &self.config.env_overrides,
                )
                .await?;

            if !response.success {
                return Err(EngineError::Backend(
                    response
                        .error
                        .unwrap_or_else(|| "agent backend reported failure".to_string()),
                ));
            }
            state.mark_session_created();

            let outcome_set = step.outcome_set();
            let mut result = extract_outcome(&response.response_text, &outcome_set);

            if let OutcomeResult::Failure { message, .. } = &result {
                if state.retry_count(&state.current_step) == 0 {
                    warn!(step = %state.current_step, error = %message, "outcome extraction failed, sending one-shot reminder");
                    state.increment_retry(&state.current_step);
                    let reminder = build_reminder_prompt(step, message);
                    let retry_response = self
                        .backend
                        .send_prompt(
                            &reminder,
                            &session_id,
                            false,
                            &self.config.working_dir,
                            model_id.as_deref(),
                            self.config.system_prompt.as_deref(),
                            &self.config.env_overrides,
                        )
                        .await?;
                    if !retry_response.success {
                        return Err(EngineError::Backend(
                            retry_response
                                .error
                                .unwrap_or_else(|| "agent backend reported failure".to_string()),
                        ));
                    }
                    result = extract_outcome(&retry_response.response_text, &outcome_set);
                }
            }

            let result = match result {
                OutcomeResult::Success { outcome, .. } => outcome,
                OutcomeResult::Failure { message, .. } => {
                    return Err(EngineError::Orchestration(message));
                }
            };

            let transition = step.on_outcome.get(&result).ok_or_else(|| {
                EngineError::Orchestration(format!(
                    "outcome {result:?} has no transition despite passing validation"
                ))
            })?;

            match transition {
                Transition::Exit { reason } => {
                    info!(reason = %reason, "run exited");
                    drop(lock);
                    return Ok(RunOutcome {
                        final_status: reason.clone(),
                        step_count: state.step_count,
                        restarts,
                    });
                }
                Transition::NextStep(name) => {
                    if state.visit_count(name) + 1 > max_step_visits {
                        return Err(EngineError::Guardrail(format!(
                            "max-step-visits-exceeded:{name}"
                        )));
                    }
                    if state.step_count >= max_total_steps {
                        return Err(EngineError::Guardrail("max-total-steps".to_string()));
                    }
                    state.transition_to(name.clone());
                }
                Transition::RestartNewSession { recipe_id: next_id } => {
                    if let Some(max) = self.config.max_restarts {
                        if restarts >= max {
                            return Err(EngineError::Guardrail(
                                "max-restarts-exceeded".to_string(),
                            ));
                        }
                    }
                    restarts += 1;
                    drop(lock);
                    recipe = self.load_and_validate(next_id)?;
                    session_id = uuid::Uuid::new_v4().to_string();
                    state = ExecutionState::new(&recipe.id, &recipe.initial_step);
                    lock = self.acquire(&session_id)?;
                }
            }
        }
    }

    fn acquire(&self, session_id: &str) -> Result<crate::session::SessionLock, EngineError> {
        self.sessions
            .acquire(session_id)
            .map_err(|SessionBusy(id)| {
                EngineError::Orchestration(format!("session {id:?} already has a run in flight"))
            })
    }
}
