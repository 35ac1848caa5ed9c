//! Reference agent backend: spawns an external agent CLI as a subprocess,
//! captures its output through temp files (never pipes), and enforces a
//! two-stage graceful-then-forced shutdown (SPEC_FULL.md §4.4, §5).
//!
//! The teacher drives an in-process `goose::Agent` and has no subprocess
//! code of its own; the spawn mechanics here (temp-file capture,
//! `kill_on_drop`, env stripping, stdin closed immediately) are grounded on
//! `examples/other_examples/d47a9f3e_BloopAI-vibe-kanban__crates-executors-src-executors-codex.rs.rs`'s
//! `Codex::spawn`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::fs::File as AsyncFile;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use super::{AgentBackend, BackendError};
use crate::model::{AgentResponse, ModelTier};

/// Environment variables that would let the agent CLI detect it is being
/// driven by an already-active outer session of itself. Stripped before
/// every spawn, applied before caller-provided overrides.
const NESTED_SESSION_ENV_VARS: &[&str] = &["AGENT_SESSION_ACTIVE", "AGENT_PARENT_SESSION_ID"];

const ENV_CLI_PATH: &str = "RECIPE_FORGE_AGENT_CLI";
const GRACE_PERIOD: Duration = Duration::from_millis(200);
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// One record of the agent CLI's JSON-lines wire format. Only the record
/// tagged `"type": "result"` carries the final response; other record
/// types (tool calls, intermediate thinking, etc.) are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireRecord {
    Result {
        #[serde(default)]
        is_error: bool,
        result: Option<String>,
        error: Option<String>,
        session_id: Option<String>,
        #[serde(default)]
        usage: Option<WireUsage>,
        #[serde(default)]
        total_cost_usd: Option<f64>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize, Default)]
struct WireUsage {
    input_tokens: Option<u64>,
    output_tokens: Option<u64>,
}

/// Spawns and tracks the external agent CLI. Safe to share across
/// concurrent runs on disjoint session ids: the in-flight map is the only
/// shared mutable state.
pub struct SubprocessBackend {
    cli_path: PathBuf,
    step_timeout: Duration,
    in_flight: Arc<Mutex<HashMap<String, u32>>>,
}

impl SubprocessBackend {
    pub const NAME: &'static str = "agent-cli";

    /// Resolves the CLI path from `RECIPE_FORGE_AGENT_CLI`, falling back to
    /// the canonical per-user installation path.
    pub fn from_env() -> Self {
        let cli_path = std::env::var(ENV_CLI_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| Self::canonical_install_path());
        Self {
            cli_path,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn canonical_install_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".local")
            .join("bin")
            .join("agent-cli")
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    /// Cancels the in-flight process for `session_id`, if any, using the
    /// same two-stage kill the deadline path uses.
    pub async fn cancel(&self, session_id: &str) {
        let pid = { self.in_flight.lock().await.remove(session_id) };
        if let Some(pid) = pid {
            terminate_pid(pid).await;
        }
    }

    fn build_argv(
        &self,
        session_id: &str,
        is_new_session: bool,
        model_id: Option<&str>,
        system_prompt: Option<&str>,
        prompt: &str,
    ) -> Vec<String> {
        let mut argv = vec![
            "--print".to_string(),
            "--output-format".to_string(),
            "json".to_string(),
            "--dangerously-skip-permissions".to_string(),
        ];
        if is_new_session {
            argv.push("--session-id".to_string());
        } else {
            argv.push("--resume".to_string());
        }
        argv.push(session_id.to_string());
        if let Some(model) = model_id {
            argv.push("--model".to_string());
            argv.push(model.to_string());
        }
        if let Some(system_prompt) = system_prompt {
            argv.push("--append-system-prompt".to_string());
            argv.push(system_prompt.to_string());
        }
        argv.push(prompt.to_string());
        argv
    }
}

async fn terminate_pid(pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
        tokio::time::sleep(GRACE_PERIOD).await;
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        tokio::time::sleep(GRACE_PERIOD).await;
    }
}

async fn kill_child(child: &mut Child) {
    if let Some(pid) = child.id() {
        terminate_pid(pid).await;
    }
    let _ = child.kill().await;
}

#[async_trait::async_trait]
impl AgentBackend for SubprocessBackend {
    async fn send_prompt(
        &self,
        prompt: &str,
        session_id: &str,
        is_new_session: bool,
        working_dir: &Path,
        model_id: Option<&str>,
        system_prompt: Option<&str>,
        env_overrides: &[(String, String)],
    ) -> Result<AgentResponse, BackendError> {
        if !self.cli_path.exists() {
            return Err(BackendError::CliNotFound(
                self.cli_path.display().to_string(),
            ));
        }

        let argv = self.build_argv(session_id, is_new_session, model_id, system_prompt, prompt);

        let stdout_path = unique_temp_path(session_id, "stdout");
        let stderr_path = unique_temp_path(session_id, "stderr");
        let stdout_file = create_owner_only_file(&stdout_path).await?;
        let stderr_file = create_owner_only_file(&stderr_path).await?;

        let mut command = Command::new(&self.cli_path);
        command
            .args(&argv)
            .current_dir(working_dir)
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file.into_std().await))
            .stderr(Stdio::from(stderr_file.into_std().await));

        for var in NESTED_SESSION_ENV_VARS {
            command.env_remove(var);
        }
        for (key, value) in env_overrides {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| BackendError::SpawnFailed(e.to_string()))?;

        if let Some(pid) = child.id() {
            self.in_flight
                .lock()
                .await
                .insert(session_id.to_string(), pid);
        }

        let wait_result = tokio::time::timeout(self.step_timeout, child.wait()).await;
        self.in_flight.lock().await.remove(session_id);

        let status = match wait_result {
            Ok(status) => status.map_err(BackendError::Io)?,
            Err(_) => {
                kill_child(&mut child).await;
                cleanup_files(&stdout_path, &stderr_path).await;
                return Err(BackendError::Timeout(self.step_timeout));
            }
        };

        // Read (and delete) both files unconditionally before propagating
        // either error, so a failure reading stdout never leaks the stderr
        // temp file (or vice versa).
        let stdout_result = read_and_delete(&stdout_path).await;
        let stderr_result = read_and_delete(&stderr_path).await;
        let stdout = stdout_result?;
        let stderr = stderr_result?;

        if !status.success() && stdout.trim().is_empty() {
            return Ok(AgentResponse::failure(
                session_id,
                format!("agent process exited with {status}: {stderr}"),
            ));
        }

        parse_wire_output(&stdout, session_id)
    }

    fn name(&self) -> &str {
        Self::NAME
    }

    fn resolve_model(&self, tier: ModelTier) -> Option<String> {
        match tier {
            ModelTier::Haiku => Some("haiku".to_string()),
            ModelTier::Sonnet => None,
            ModelTier::Opus => Some("opus".to_string()),
        }
    }
}

fn unique_temp_path(session_id: &str, suffix: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "recipe-forge-{session_id}-{}-{suffix}.json",
        uuid::Uuid::new_v4()
    ))
}

async fn create_owner_only_file(path: &Path) -> Result<AsyncFile, BackendError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o600)
            .open(path)
            .await?;
        Ok(file)
    }
    #[cfg(not(unix))]
    {
        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        Ok(file)
    }
}

async fn cleanup_files(stdout_path: &Path, stderr_path: &Path) {
    let _ = tokio::fs::remove_file(stdout_path).await;
    let _ = tokio::fs::remove_file(stderr_path).await;
}

async fn read_and_delete(path: &Path) -> Result<String, BackendError> {
    let mut contents = String::new();
    let result = async {
        let mut file = AsyncFile::open(path).await?;
        file.read_to_string(&mut contents).await
    }
    .await;
    let _ = tokio::fs::remove_file(path).await;
    result?;
    Ok(contents)
}

fn parse_wire_output(stdout: &str, session_id: &str) -> Result<AgentResponse, BackendError> {
    for line in stdout.lines().rev() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(record) = serde_json::from_str::<WireRecord>(line) else {
            continue;
        };
        if let WireRecord::Result {
            is_error,
            result,
            error,
            session_id: returned_session_id,
            usage,
            total_cost_usd,
        } = record
        {
            let usage = usage.unwrap_or_default();
            return Ok(AgentResponse {
                success: !is_error,
                response_text: result.unwrap_or_default(),
                error,
                session_id: returned_session_id.unwrap_or_else(|| session_id.to_string()),
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
                cost_usd: total_cost_usd,
            });
        }
    }
    Err(BackendError::UnparseableOutput)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_argv_for_new_session_with_model() {
        let backend = SubprocessBackend {
            cli_path: PathBuf::from("/bin/true"),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        };
        let argv = backend.build_argv("sess-1", true, Some("opus"), None, "do the thing");
        assert_eq!(
            argv,
            vec![
                "--print",
                "--output-format",
                "json",
                "--dangerously-skip-permissions",
                "--session-id",
                "sess-1",
                "--model",
                "opus",
                "do the thing",
            ]
        );
    }

    #[test]
    fn builds_argv_for_resumed_session_without_model() {
        let backend = SubprocessBackend {
            cli_path: PathBuf::from("/bin/true"),
            step_timeout: DEFAULT_STEP_TIMEOUT,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        };
        let argv = backend.build_argv("sess-1", false, None, None, "continue");
        assert_eq!(
            argv,
            vec![
                "--print",
                "--output-format",
                "json",
                "--dangerously-skip-permissions",
                "--resume",
                "sess-1",
                "continue",
            ]
        );
    }

    #[test]
    fn parses_final_result_record_ignoring_preceding_lines() {
        let stdout = "{\"type\": \"tool_call\", \"name\": \"bash\"}\n\
             {\"type\": \"result\", \"is_error\": false, \"result\": \"done\", \"session_id\": \"s1\", \"usage\": {\"input_tokens\": 10, \"output_tokens\": 20}, \"total_cost_usd\": 0.01}";
        let response = parse_wire_output(stdout, "s1").unwrap();
        assert!(response.success);
        assert_eq!(response.response_text, "done");
        assert_eq!(response.input_tokens, Some(10));
        assert_eq!(response.cost_usd, Some(0.01));
    }

    #[test]
    fn unparseable_output_is_an_error() {
        let err = parse_wire_output("not json at all", "s1").unwrap_err();
        assert!(matches!(err, BackendError::UnparseableOutput));
    }

    #[test]
    fn resolve_model_maps_tiers() {
        let backend = SubprocessBackend::from_env();
        assert_eq!(backend.resolve_model(ModelTier::Haiku), Some("haiku".to_string()));
        assert_eq!(backend.resolve_model(ModelTier::Sonnet), None);
        assert_eq!(backend.resolve_model(ModelTier::Opus), Some("opus".to_string()));
    }
}
