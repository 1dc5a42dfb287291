//! Inbound generation request.

use serde::{Deserialize, Serialize};

use super::error::{CadgenError, Result};

/// Shortest accepted task description, in characters.
pub const MIN_TASK_CHARS: usize = 3;

/// Longest accepted task description, in characters.
pub const MAX_TASK_CHARS: usize = 2000;

/// Longest accepted previous artifact source, in characters.
pub const MAX_PREVIOUS_SOURCE_CHARS: usize = 50_000;

/// Material used when the caller does not name one.
pub const DEFAULT_MATERIAL: &str = "PLA";

/// One inbound call to the pipeline.
///
/// Immutable once constructed; the constructor enforces the length bounds.
/// When `previous_source` is present the run is a modify-mode run: the task
/// text is the change the caller wants applied to that source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    task_text: String,
    material_id: String,
    previous_source: Option<String>,
}

impl GenerationRequest {
    /// Build a fresh-generation request.
    pub fn new(task_text: impl Into<String>, material_id: impl Into<String>) -> Result<Self> {
        let task_text = task_text.into();
        let trimmed = task_text.trim();
        if trimmed.is_empty() {
            return Err(CadgenError::InvalidRequest(
                "task text must not be empty".to_string(),
            ));
        }
        let chars = trimmed.chars().count();
        if chars < MIN_TASK_CHARS {
            return Err(CadgenError::InvalidRequest(format!(
                "task text must be at least {MIN_TASK_CHARS} characters"
            )));
        }
        if task_text.chars().count() > MAX_TASK_CHARS {
            return Err(CadgenError::InvalidRequest(format!(
                "task text exceeds {MAX_TASK_CHARS} characters"
            )));
        }

        let material_id = material_id.into();
        let material_id = if material_id.trim().is_empty() {
            DEFAULT_MATERIAL.to_string()
        } else {
            material_id
        };

        Ok(Self {
            task_text,
            material_id,
            previous_source: None,
        })
    }

    /// Turn this into a modify-mode request against `source`.
    pub fn with_previous_source(mut self, source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        if source.chars().count() > MAX_PREVIOUS_SOURCE_CHARS {
            return Err(CadgenError::InvalidRequest(format!(
                "previous source exceeds {MAX_PREVIOUS_SOURCE_CHARS} characters"
            )));
        }
        if source.trim().is_empty() {
            return Err(CadgenError::InvalidRequest(
                "previous source must not be empty".to_string(),
            ));
        }
        self.previous_source = Some(source);
        Ok(self)
    }

    pub fn task_text(&self) -> &str {
        &self.task_text
    }

    pub fn material_id(&self) -> &str {
        &self.material_id
    }

    pub fn previous_source(&self) -> Option<&str> {
        self.previous_source.as_deref()
    }

    /// `true` when this request edits an existing artifact.
    pub fn is_modify(&self) -> bool {
        self.previous_source.is_some()
    }
}
