//! Resolves a named backend without the engine needing to know concrete
//! backend types (SPEC_FULL.md §4.4, "Backend registry").

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use super::AgentBackend;
use crate::backend::subprocess::SubprocessBackend;

#[derive(Debug, Error)]
#[error("unknown backend {0:?}")]
pub struct UnknownBackend(pub String);

pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn AgentBackend>>,
}

impl BackendRegistry {
    /// A registry pre-populated with the reference subprocess backend,
    /// matching what the CLI defaults to when `--backend` is omitted.
    pub fn with_default() -> Self {
        let mut registry = Self {
            backends: HashMap::new(),
        };
        let default_backend = SubprocessBackend::from_env();
        registry.register(Arc::new(default_backend));
        registry
    }

    pub fn register(&mut self, backend: Arc<dyn AgentBackend>) {
        self.backends.insert(backend.name().to_string(), backend);
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn AgentBackend>, UnknownBackend> {
        self.backends
            .get(name)
            .cloned()
            .ok_or_else(|| UnknownBackend(name.to_string()))
    }

    pub fn default_backend_name(&self) -> &str {
        SubprocessBackend::NAME
    }
}
