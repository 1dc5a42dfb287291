//! On-disk run artifacts with digest verification.
//!
//! Layout per run:
//!
//! ```text
//! <root>/<run_id>/<slug>.step
//! <root>/<run_id>/<slug>.stl      (when exported)
//! <root>/<run_id>/<slug>.py       (final source)
//! <root>/<run_id>/result.json
//! <root>/<run_id>/result.digest   (SHA-256 hex of result.json)
//! ```

use std::path::PathBuf;

use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::domain::{CadgenError, GenerationResult, Result};

const RESULT_FILE: &str = "result.json";
const DIGEST_FILE: &str = "result.digest";
const SLUG_CHARS: usize = 40;
const FALLBACK_SLUG: &str = "model";

/// SHA-256 hex digest of `data`.
pub fn content_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// File stem derived from the task text.
///
/// First 40 characters, lower-cased, spaces to underscores, anything that is
/// not alphanumeric or an underscore dropped.
pub fn slug(task_text: &str) -> String {
    let s: String = task_text
        .chars()
        .take(SLUG_CHARS)
        .flat_map(char::to_lowercase)
        .map(|c| if c == ' ' { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    if s.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        s
    }
}

/// Files written for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRun {
    pub dir: PathBuf,
    pub result: PathBuf,
    pub step: Option<PathBuf>,
    pub stl: Option<PathBuf>,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn run_dir(&self, run_id: &Uuid) -> PathBuf {
        self.root.join(run_id.to_string())
    }

    /// Persist a finished run.
    pub fn write(&self, result: &GenerationResult, task_text: &str) -> Result<StoredRun> {
        let dir = self.run_dir(&result.run_id);
        std::fs::create_dir_all(&dir)?;
        let stem = slug(task_text);

        let mut stored = StoredRun {
            result: dir.join(RESULT_FILE),
            dir: dir.clone(),
            step: None,
            stl: None,
            source: None,
        };

        if let Some(exports) = &result.exports {
            let step = dir.join(format!("{stem}.step"));
            std::fs::write(&step, &exports.step)?;
            stored.step = Some(step);
            if let Some(stl_bytes) = &exports.stl {
                let stl = dir.join(format!("{stem}.stl"));
                std::fs::write(&stl, stl_bytes)?;
                stored.stl = Some(stl);
            }
        }
        if let Some(code) = &result.code {
            let source = dir.join(format!("{stem}.py"));
            std::fs::write(&source, code)?;
            stored.source = Some(source);
        }

        let json = serde_json::to_vec_pretty(result)?;
        std::fs::write(&stored.result, &json)?;
        std::fs::write(dir.join(DIGEST_FILE), content_digest(&json).as_bytes())?;

        info!(run_id = %result.run_id, dir = %dir.display(), "run artifacts written");
        Ok(stored)
    }

    /// Read a run result back, verifying its digest.
    pub fn read_result(&self, run_id: &Uuid) -> Result<GenerationResult> {
        let dir = self.run_dir(run_id);
        let json = std::fs::read(dir.join(RESULT_FILE))?;
        let expected = std::fs::read_to_string(dir.join(DIGEST_FILE))?;
        let actual = content_digest(&json);
        if expected.trim() != actual {
            return Err(CadgenError::DigestMismatch {
                expected: expected.trim().to_string(),
                actual,
            });
        }
        Ok(serde_json::from_slice(&json)?)
    }
}
