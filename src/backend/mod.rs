//! The pluggable capability that turns a prompt into an [`AgentResponse`] by
//! driving an opaque agent CLI (SPEC_FULL.md §4.4).
//!
//! Shaped after the teacher's `Planner`/`Reviewer` async traits in
//! `src/phases/mod.rs`, generalized from two fixed roles to a single
//! backend capability selected by name.

pub mod registry;
pub mod subprocess;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{AgentResponse, ModelTier};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("agent CLI not found: {0}")]
    CliNotFound(String),
    #[error("failed to spawn agent process: {0}")]
    SpawnFailed(String),
    #[error("agent process timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("agent process produced no parseable result record")]
    UnparseableOutput,
    #[error("i/o error communicating with agent process: {0}")]
    Io(#[from] std::io::Error),
}

/// A polymorphic capability driving an agent CLI. Implementations own
/// process-lifecycle concerns; the engine only ever calls `send_prompt`.
#[async_trait]
pub trait AgentBackend: Send + Sync {
    /// Sends `prompt` to the agent, creating a new session when
    /// `is_new_session` is true and resuming `session_id` otherwise.
    /// `system_prompt`, when present, is passed as a distinct
    /// append-system-prompt parameter — never concatenated into `prompt`.
    #[allow(clippy::too_many_arguments)]
    async fn send_prompt(
        &self,
        prompt: &str,
        session_id: &str,
        is_new_session: bool,
        working_dir: &Path,
        model_id: Option<&str>,
        system_prompt: Option<&str>,
        env_overrides: &[(String, String)],
    ) -> Result<AgentResponse, BackendError>;

    /// The backend's registry name, e.g. `"claude-cli"`.
    fn name(&self) -> &str;

    /// Maps an abstract model tier to this backend's concrete model
    /// identifier, or `None` to omit any model flag and use the backend's
    /// own default.
    fn resolve_model(&self, tier: ModelTier) -> Option<String>;
}
