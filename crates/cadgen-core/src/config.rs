//! Pipeline configuration from `CADGEN_*` environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{CadgenError, Result, DEFAULT_EXPECTED_SOLIDS};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model CLI executable.
    pub generator_program: String,
    pub model: String,
    pub generation_timeout_secs: u64,
    pub lookup_timeout_secs: u64,
    pub critic_timeout_secs: u64,
    pub python_program: String,
    pub execution_timeout_secs: u64,
    pub skills_dir: PathBuf,
    /// Reference library file; the embedded library when unset.
    pub reference_library: Option<PathBuf>,
    /// Material catalog file; the embedded catalog when unset.
    pub materials_file: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub expected_solid_count: u32,
    pub visual_check: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            generator_program: "claude".to_string(),
            model: "sonnet".to_string(),
            generation_timeout_secs: 120,
            lookup_timeout_secs: 30,
            critic_timeout_secs: 60,
            python_program: "python3".to_string(),
            execution_timeout_secs: 60,
            skills_dir: PathBuf::from("skills"),
            reference_library: None,
            materials_file: None,
            output_dir: PathBuf::from("cadgen-out"),
            expected_solid_count: DEFAULT_EXPECTED_SOLIDS,
            visual_check: true,
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut cfg = Self::default();

        if let Some(v) = get("CADGEN_CLAUDE_CLI") {
            cfg.generator_program = v;
        }
        if let Some(v) = get("CADGEN_MODEL") {
            cfg.model = v;
        }
        if let Some(v) = get("CADGEN_GENERATION_TIMEOUT") {
            cfg.generation_timeout_secs = parse_secs("CADGEN_GENERATION_TIMEOUT", &v)?;
        }
        if let Some(v) = get("CADGEN_LOOKUP_TIMEOUT") {
            cfg.lookup_timeout_secs = parse_secs("CADGEN_LOOKUP_TIMEOUT", &v)?;
        }
        if let Some(v) = get("CADGEN_CRITIC_TIMEOUT") {
            cfg.critic_timeout_secs = parse_secs("CADGEN_CRITIC_TIMEOUT", &v)?;
        }
        if let Some(v) = get("CADGEN_PYTHON") {
            cfg.python_program = v;
        }
        if let Some(v) = get("CADGEN_EXEC_TIMEOUT") {
            cfg.execution_timeout_secs = parse_secs("CADGEN_EXEC_TIMEOUT", &v)?;
        }
        if let Some(v) = get("CADGEN_SKILLS_DIR") {
            cfg.skills_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CADGEN_REFERENCE_LIBRARY") {
            cfg.reference_library = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CADGEN_MATERIALS_FILE") {
            cfg.materials_file = Some(PathBuf::from(v));
        }
        if let Some(v) = get("CADGEN_OUTPUT_DIR") {
            cfg.output_dir = PathBuf::from(v);
        }
        if let Some(v) = get("CADGEN_VISUAL_CHECK") {
            cfg.visual_check = parse_bool("CADGEN_VISUAL_CHECK", &v)?;
        }

        Ok(cfg)
    }

    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    pub fn critic_timeout(&self) -> Duration {
        Duration::from_secs(self.critic_timeout_secs)
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.execution_timeout_secs)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    let secs = u64::from_str(value.trim())
        .map_err(|e| CadgenError::Config(format!("{key}={value:?}: {e}")))?;
    if secs == 0 {
        return Err(CadgenError::Config(format!("{key} must be at least 1 second")));
    }
    Ok(secs)
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CadgenError::Config(format!("{key}={value:?}: expected a boolean"))),
    }
}
