//! Readiness probe for the two external programs a run depends on.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::debug;

/// Limit per probed program.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    /// The Python interpreter can import CadQuery.
    pub cadquery: bool,
    /// The generator program answered `--version`.
    pub generator: bool,
    pub generator_version: Option<String>,
}

impl HealthReport {
    pub fn is_ready(&self) -> bool {
        self.cadquery && self.generator
    }
}

/// Run `program args..` under [`PROBE_TIMEOUT`]; stdout on exit status 0.
async fn probe_command(program: &str, args: &[&str]) -> Option<String> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn();
    let child = match child {
        Ok(c) => c,
        Err(e) => {
            debug!(program = %program, error = %e, "probe spawn failed");
            return None;
        }
    };
    match tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output()).await {
        Ok(Ok(output)) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        Ok(Ok(output)) => {
            debug!(program = %program, code = ?output.status.code(), "probe exited non-zero");
            None
        }
        Ok(Err(e)) => {
            debug!(program = %program, error = %e, "probe wait failed");
            None
        }
        Err(_) => {
            debug!(program = %program, "probe timed out");
            None
        }
    }
}

/// Probe the interpreter and the generator concurrently.
pub async fn probe(python_program: &str, generator_program: &str) -> HealthReport {
    let (cadquery, version) = tokio::join!(
        probe_command(python_program, &["-c", "import cadquery; print('ok')"]),
        probe_command(generator_program, &["--version"]),
    );
    let cadquery = cadquery.is_some();
    let generator = version.is_some();
    let status = if cadquery && generator { "ok" } else { "degraded" };
    HealthReport {
        status: status.to_string(),
        cadquery,
        generator,
        generator_version: version.filter(|v| !v.is_empty()),
    }
}
