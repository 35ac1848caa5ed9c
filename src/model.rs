//! Core value types for recipes, steps, transitions, and run state.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// The closed set of abstract model tiers a recipe or step may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Haiku,
    Sonnet,
    Opus,
}

impl ModelTier {
    /// Parses a model tier from its canonical name, case-insensitively.
    /// Returns `None` for anything outside {haiku, sonnet, opus}; callers
    /// that need a hard error (the validator, CLI flag parsing) report one
    /// themselves rather than this returning a `Result`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_lowercase().as_str() {
            "haiku" => Some(ModelTier::Haiku),
            "sonnet" => Some(ModelTier::Sonnet),
            "opus" => Some(ModelTier::Opus),
            _ => None,
        }
    }
}

/// One edge out of a step, chosen by the outcome the agent reports.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Advance to a sibling step in the same recipe.
    NextStep(String),
    /// Terminate the run, reporting `reason` as the final status.
    Exit { reason: String },
    /// Discard the current session and begin a fresh one against `recipe_id`.
    RestartNewSession { recipe_id: String },
}

/// One node of the recipe's state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub prompt: String,
    /// The declared outcome alphabet, in the order the recipe author wrote it.
    pub outcomes: Vec<String>,
    pub on_outcome: HashMap<String, Transition>,
    /// Raw model tier name as written in the recipe source, not yet checked
    /// against the closed tier set. [`crate::recipe::validator::validate_recipe`]
    /// rejects an unknown value; only after validation passes should this be
    /// parsed with [`ModelTier::parse`].
    pub model: Option<String>,
}

impl Step {
    pub fn outcome_set(&self) -> HashSet<&str> {
        self.outcomes.iter().map(String::as_str).collect()
    }
}

/// A validated (or not-yet-validated) finite state machine of steps.
#[derive(Debug, Clone, PartialEq)]
pub struct Recipe {
    pub id: String,
    pub label: String,
    pub description: String,
    pub initial_step: String,
    /// Step keys, in the order the recipe author declared them.
    pub step_order: Vec<String>,
    pub steps: HashMap<String, Step>,
    pub guardrails: Guardrails,
    /// Raw model tier name, unvalidated; see [`Step::model`].
    pub model: Option<String>,
}

impl Recipe {
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.get(name)
    }
}

/// Hard, numeric bounds on a run's control flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Guardrails {
    pub max_step_visits: u32,
    pub max_total_steps: u32,
    pub exit_on_other: bool,
}

impl Default for Guardrails {
    fn default() -> Self {
        Self {
            max_step_visits: 3,
            max_total_steps: 100,
            exit_on_other: true,
        }
    }
}

/// The outcome of a completed (or attempted) extraction from an agent response.
#[derive(Debug, Clone, PartialEq)]
pub enum OutcomeResult {
    Success {
        outcome: String,
        other_description: Option<String>,
    },
    Failure {
        message: String,
        malformed_candidate: Option<String>,
    },
}

impl OutcomeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeResult::Success { .. })
    }
}

/// What an agent backend returns from a single invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentResponse {
    pub success: bool,
    pub response_text: String,
    pub error: Option<String>,
    pub session_id: String,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost_usd: Option<f64>,
}

impl AgentResponse {
    pub fn failure(session_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            response_text: String::new(),
            error: Some(error.into()),
            session_id: session_id.into(),
            input_tokens: None,
            output_tokens: None,
            cost_usd: None,
        }
    }
}

/// Per-run mutable bookkeeping, exclusively owned by the engine.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    pub recipe_id: String,
    pub current_step: String,
    pub step_count: u32,
    visit_counts: HashMap<String, u32>,
    retry_counts: HashMap<String, u32>,
    pub session_created: bool,
    pub started_at: Instant,
}

impl ExecutionState {
    pub fn new(recipe_id: impl Into<String>, initial_step: impl Into<String>) -> Self {
        let initial_step = initial_step.into();
        let mut visit_counts = HashMap::new();
        visit_counts.insert(initial_step.clone(), 1);
        Self {
            recipe_id: recipe_id.into(),
            current_step: initial_step,
            step_count: 1,
            visit_counts,
            retry_counts: HashMap::new(),
            session_created: false,
            started_at: Instant::now(),
        }
    }

    pub fn visit_count(&self, step: &str) -> u32 {
        self.visit_counts.get(step).copied().unwrap_or(0)
    }

    pub fn retry_count(&self, step: &str) -> u32 {
        self.retry_counts.get(step).copied().unwrap_or(0)
    }

    pub fn increment_retry(&mut self, step: &str) {
        *self.retry_counts.entry(step.to_string()).or_insert(0) += 1;
    }

    /// Advance to `name`, incrementing the total step count and that step's
    /// visit count, and clearing its retry count (a fresh entry, not a
    /// repeated check of the same visit).
    pub fn transition_to(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.step_count += 1;
        *self.visit_counts.entry(name.clone()).or_insert(0) += 1;
        self.retry_counts.remove(&name);
        self.current_step = name;
    }

    pub fn mark_session_created(&mut self) {
        self.session_created = true;
    }
}
