//! Generation context assembled from skill documents.
//!
//! Each skill is a directory holding a `SKILL.md`. Front-matter is stripped,
//! each document gets a `# === SKILL: <name> ===` heading, and documents are
//! joined with a horizontal rule. The context is read once per process and
//! shared read-only across runs.

use std::path::Path;
use std::sync::OnceLock;

use tracing::{info, warn};

/// Skills loaded into the context, in order.
pub const SKILL_NAMES: &[&str] = &["spatial-reasoning", "cadquery-codegen"];

const SKILL_FILE: &str = "SKILL.md";
const SEPARATOR: &str = "\n\n---\n\n";
const DEFAULT_CONTEXT: &str = include_str!("../data/default_context.md");

/// System context passed to every generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillContext {
    text: String,
    loaded: Vec<String>,
}

impl SkillContext {
    /// Load [`SKILL_NAMES`] from `skills_dir`, falling back to the embedded
    /// context when none are readable.
    pub fn load(skills_dir: &Path) -> Self {
        let mut parts = Vec::new();
        let mut loaded = Vec::new();
        for name in SKILL_NAMES {
            let path = skills_dir.join(name).join(SKILL_FILE);
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    parts.push(format!("# === SKILL: {name} ===\n\n{}", strip_front_matter(&content)));
                    loaded.push((*name).to_string());
                }
                Err(e) => warn!(path = %path.display(), error = %e, "skill file not loaded"),
            }
        }

        if parts.is_empty() {
            info!(skills_dir = %skills_dir.display(), "no skill files found; using built-in context");
            return Self::embedded();
        }
        info!(skills = ?loaded, "loaded generation context");
        Self {
            text: parts.join(SEPARATOR),
            loaded,
        }
    }

    /// The built-in context.
    pub fn embedded() -> Self {
        Self {
            text: DEFAULT_CONTEXT.trim_end().to_string(),
            loaded: Vec::new(),
        }
    }

    /// Process-wide context, loaded from `skills_dir` on first call.
    ///
    /// Later calls return the first context regardless of `skills_dir`.
    pub fn shared(skills_dir: &Path) -> &'static SkillContext {
        static SHARED: OnceLock<SkillContext> = OnceLock::new();
        SHARED.get_or_init(|| Self::load(skills_dir))
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Skills read from disk; empty when the built-in context is in use.
    pub fn loaded_skills(&self) -> &[String] {
        &self.loaded
    }
}

/// Drop a leading `---` delimited front-matter block.
pub fn strip_front_matter(content: &str) -> &str {
    let Some(rest) = content.strip_prefix("---") else {
        return content;
    };
    match rest.find("---") {
        Some(end) => rest[end + 3..].trim(),
        None => content,
    }
}
