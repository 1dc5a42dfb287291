//! Per-run bookkeeping and the caller-facing result.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::artifact::{ExecutionOutcome, ExportedFiles, GeneratedArtifact, Measurements};
use super::verdict::VisualCheck;

/// Named states of the repair orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Enriching,
    Generating,
    Executing,
    Diagnosing,
    Succeeded,
    VisualChecking,
    VisualRetry,
    VisualRetryExecuting,
    Exhausted,
    GenerationFailed,
    Done,
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Enriching => "enriching",
            Self::Generating => "generating",
            Self::Executing => "executing",
            Self::Diagnosing => "diagnosing",
            Self::Succeeded => "succeeded",
            Self::VisualChecking => "visual_checking",
            Self::VisualRetry => "visual_retry",
            Self::VisualRetryExecuting => "visual_retry_executing",
            Self::Exhausted => "exhausted",
            Self::GenerationFailed => "generation_failed",
            Self::Done => "done",
        };
        f.write_str(s)
    }
}

/// Final disposition of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// Structurally valid artifact kept after a failed visual repair.
    SucceededWithWarning,
    /// Retry bound reached without a passing execution.
    Exhausted,
    /// The first generation call failed; nothing was executed.
    GenerationFailed,
}

impl RunStatus {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Succeeded | Self::SucceededWithWarning)
    }
}

/// One recorded state transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: PipelineState,
    pub to: PipelineState,
    /// Structural repair count at the time of the transition.
    pub repairs: u32,
}

/// External calls made during one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCounts {
    pub generation: u32,
    pub enrichment_lookup: u32,
    pub execution: u32,
    pub critic: u32,
    pub visual_repair_generation: u32,
    pub visual_repair_execution: u32,
}

/// Ordered (artifact, outcome) pairs of the structural loop.
///
/// Bounded: pushes past `capacity` are refused.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptRecord {
    entries: Vec<(GeneratedArtifact, ExecutionOutcome)>,
    capacity: usize,
}

impl AttemptRecord {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an attempt. Returns `false` if the record is already full.
    pub fn push(&mut self, artifact: GeneratedArtifact, outcome: ExecutionOutcome) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }
        self.entries.push((artifact, outcome));
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    pub fn last(&self) -> Option<&(GeneratedArtifact, ExecutionOutcome)> {
        self.entries.last()
    }
}

/// What the caller receives when a run reaches DONE.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub run_id: Uuid,
    pub success: bool,
    pub status: RunStatus,
    /// Final source: the accepted artifact, or the last failing one.
    pub code: Option<String>,
    pub model: String,
    pub measurements: Option<Measurements>,
    pub error: Option<String>,
    /// Execution attempts, including a visual-repair execution.
    pub attempts: u32,
    pub visual_check: Option<VisualCheck>,
    pub filename: Option<String>,
    pub calls: CallCounts,
    pub transitions: Vec<Transition>,
    pub finished_at: DateTime<Utc>,
    #[serde(skip)]
    pub exports: Option<ExportedFiles>,
}
