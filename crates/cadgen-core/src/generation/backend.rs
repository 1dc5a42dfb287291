//! Raw text completion over a model CLI subprocess.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::domain::{AdapterError, AdapterResult};

/// Environment variable that makes the CLI refuse to start inside another
/// session.
const NESTED_SESSION_VAR: &str = "CLAUDECODE";

/// Characters of stderr kept in transport errors.
const STDERR_EXCERPT: usize = 500;

/// Prompt in, text out.
#[async_trait]
pub trait TextBackend: Send + Sync {
    fn model_id(&self) -> &str;

    /// Complete `prompt` under `system`, giving up after `timeout`.
    async fn complete(&self, system: &str, prompt: &str, timeout: Duration) -> AdapterResult<String>;
}

/// Runs the model CLI in print mode, one process per completion.
#[derive(Debug, Clone)]
pub struct CliBackend {
    program: String,
    model: String,
}

impl CliBackend {
    pub fn new(program: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            model: model.into(),
        }
    }

    fn command(&self, system: &str, prompt: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--print")
            .arg("--system-prompt")
            .arg(system)
            .arg("--model")
            .arg(&self.model)
            .arg("--tools")
            .arg("")
            .arg("--no-session-persistence")
            .arg(prompt)
            .env_remove(NESTED_SESSION_VAR)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl TextBackend for CliBackend {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, prompt: &str, timeout: Duration) -> AdapterResult<String> {
        let child = self
            .command(system, prompt)
            .spawn()
            .map_err(|e| AdapterError::Spawn {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        // Dropping the future on timeout drops the child, which kills it.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout {
                stage: "model CLI".to_string(),
                limit_ms: timeout.as_millis() as u64,
            })?
            .map_err(|e| AdapterError::Transport(format!("Model CLI error: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt: String = stderr.chars().take(STDERR_EXCERPT).collect();
            return Err(AdapterError::Transport(format!(
                "Model CLI error (exit {}): {}",
                output.status.code().unwrap_or(-1),
                excerpt
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).to_string();
        debug!(model = %self.model, chars = text.len(), "model completion received");
        Ok(text)
    }
}
