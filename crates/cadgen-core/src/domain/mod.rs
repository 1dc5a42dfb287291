//! Domain models for cadgen.
//!
//! Canonical definitions for the entities a pipeline run passes around:
//! - `GenerationRequest`: validated inbound call
//! - `GeneratedArtifact` / `ExecutionOutcome`: one attempt and its result
//! - `VisualVerdict` / `VisualCheck`: advisory visual assessment
//! - `GenerationResult`: caller-facing record produced at DONE

pub mod artifact;
pub mod error;
pub mod request;
pub mod run;
pub mod verdict;

pub use artifact::{
    BoundingBox, ExecutionOutcome, ExportedFiles, GeneratedArtifact, Measurements, RenderedViews,
    DEFAULT_EXPECTED_SOLIDS,
};
pub use error::{AdapterError, AdapterResult, CadgenError, Result};
pub use request::{GenerationRequest, DEFAULT_MATERIAL, MAX_TASK_CHARS};
pub use run::{
    AttemptRecord, CallCounts, GenerationResult, PipelineState, RunStatus, Transition,
};
pub use verdict::{VisualCheck, VisualVerdict, PASSING_CONFIDENCE};
