//! At-most-one-in-flight-run-per-session-id enforcement (SPEC_FULL.md §5).
//!
//! Grounded on the "registry keyed by session id" shape of the teacher's
//! `src/orchestrator/client.rs::SessionRegistry`, which tracked active
//! sessions for an in-process MCP extension; here it guards exclusive
//! access to a session id across concurrent engine runs instead.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// A guard that releases its session lock when dropped, whether the run
/// exited normally, hit a guardrail, or returned early on a backend error.
/// Dropping never blocks and never requires a runtime, since the lock set
/// is a plain `std::sync::Mutex`.
pub struct SessionLock {
    active: Arc<Mutex<HashSet<String>>>,
    session_id: String,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        if let Ok(mut active) = self.active.lock() {
            active.remove(&self.session_id);
        }
    }
}

/// Shared, cloneable handle to the set of currently locked session ids.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

#[derive(Debug, thiserror::Error)]
#[error("session {0:?} already has a run in flight")]
pub struct SessionBusy(pub String);

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the exclusive lock for `session_id`, failing if another
    /// run already holds it.
    pub fn acquire(&self, session_id: &str) -> Result<SessionLock, SessionBusy> {
        let mut active = self.active.lock().expect("session registry lock poisoned");
        if !active.insert(session_id.to_string()) {
            return Err(SessionBusy(session_id.to_string()));
        }
        drop(active);
        Ok(SessionLock {
            active: self.active.clone(),
            session_id: session_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_acquire_on_same_session_fails_while_first_is_held() {
        let registry = SessionRegistry::new();
        let lock = registry.acquire("s1").unwrap();
        let err = registry.acquire("s1").unwrap_err();
        assert_eq!(err.0, "s1");
        drop(lock);
    }

    #[test]
    fn releasing_allows_reacquire() {
        let registry = SessionRegistry::new();
        let lock = registry.acquire("s1").unwrap();
        drop(lock);
        assert!(registry.acquire("s1").is_ok());
    }

    #[test]
    fn disjoint_sessions_do_not_contend() {
        let registry = SessionRegistry::new();
        let a = registry.acquire("a").unwrap();
        let b = registry.acquire("b").unwrap();
        drop(a);
        drop(b);
    }
}
