//! Layered configuration: file < environment < CLI flags
//! (SPEC_FULL.md §6, "Configuration precedence").
//!
//! Mirrors the teacher's `src/config/settings.rs` almost directly:
//! `CliConfig::load_with_env` / `apply_env_overrides` become
//! `RecipeForgeConfig::load_with_env` / `apply_env_overrides` below, with
//! the `PLAN_FORGE_*` env prefix renamed to `RECIPE_FORGE_*` and the fields
//! narrowed to what the orchestration engine actually needs.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::model::ModelTier;

/// File-backed, env-overridable, CLI-overridable configuration for the
/// whole crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipeForgeConfig {
    #[serde(default = "default_recipes_dir")]
    pub recipes_dir: PathBuf,
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub model: Option<ModelTier>,
    #[serde(default)]
    pub guardrails: GuardrailOverrides,
    /// `None` means unlimited.
    #[serde(default)]
    pub max_restarts: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GuardrailOverrides {
    pub max_step_visits: Option<u32>,
    pub max_total_steps: Option<u32>,
}

fn default_recipes_dir() -> PathBuf {
    PathBuf::from("recipes")
}

fn default_backend() -> String {
    "agent-cli".to_string()
}

impl Default for RecipeForgeConfig {
    fn default() -> Self {
        Self {
            recipes_dir: default_recipes_dir(),
            backend: default_backend(),
            model: None,
            guardrails: GuardrailOverrides::default(),
            max_restarts: None,
        }
    }
}

impl RecipeForgeConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: &PathBuf) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RecipeForgeConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Loads configuration, falling back to defaults if `path` is absent
    /// or doesn't point at an existing file.
    pub fn load_or_default(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// Applies `RECIPE_FORGE_*` environment variable overrides.
    ///
    /// Priority: Config file > Env vars > Defaults
    /// (CLI args override everything, applied separately by the CLI layer.)
    ///
    /// Supported environment variables:
    /// - RECIPE_FORGE_RECIPES_DIR: directory to search for recipe files
    /// - RECIPE_FORGE_BACKEND: name of the backend to resolve from the registry
    /// - RECIPE_FORGE_MODEL: default model tier (haiku/sonnet/opus)
    /// - RECIPE_FORGE_MAX_STEP_VISITS: guardrail override
    /// - RECIPE_FORGE_MAX_TOTAL_STEPS: guardrail override
    /// - RECIPE_FORGE_MAX_RESTARTS: restart cap override
    pub fn apply_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("RECIPE_FORGE_RECIPES_DIR")
            && !val.is_empty()
        {
            self.recipes_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var("RECIPE_FORGE_BACKEND")
            && !val.is_empty()
        {
            self.backend = val;
        }

        if let Ok(val) = std::env::var("RECIPE_FORGE_MODEL")
            && !val.is_empty()
        {
            if let Some(tier) = ModelTier::parse(&val) {
                self.model = Some(tier);
            }
        }

        if let Ok(val) = std::env::var("RECIPE_FORGE_MAX_STEP_VISITS")
            && let Ok(max) = val.parse::<u32>()
        {
            self.guardrails.max_step_visits = Some(max);
        }

        if let Ok(val) = std::env::var("RECIPE_FORGE_MAX_TOTAL_STEPS")
            && let Ok(max) = val.parse::<u32>()
        {
            self.guardrails.max_total_steps = Some(max);
        }

        if let Ok(val) = std::env::var("RECIPE_FORGE_MAX_RESTARTS")
            && let Ok(max) = val.parse::<u32>()
        {
            self.max_restarts = Some(max);
        }

        self
    }

    /// Loads configuration with environment variable overrides applied.
    pub fn load_with_env(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        Self::load_or_default(path).map(|c| c.apply_env_overrides())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = RecipeForgeConfig::default();
        assert_eq!(config.recipes_dir, PathBuf::from("recipes"));
        assert_eq!(config.backend, "agent-cli");
        assert_eq!(config.max_restarts, None);
    }

    #[test]
    fn load_or_default_falls_back_when_path_is_absent() {
        let config = RecipeForgeConfig::load_or_default(None).unwrap();
        assert_eq!(config.backend, "agent-cli");
    }
}
