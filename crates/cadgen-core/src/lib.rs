//! cadgen core library
//!
//! Turns a natural-language part description into a validated CadQuery
//! solid through a bounded generate, execute, diagnose and repair loop, with
//! an optional visual check on the result.

pub mod adapters;
pub mod config;
pub mod context;
pub mod critic;
pub mod diagnose;
pub mod domain;
pub mod enrich;
pub mod executor;
pub mod extract;
pub mod fakes;
pub mod generation;
pub mod health;
pub mod materials;
pub mod obs;
pub mod orchestrator;
pub mod store;
pub mod telemetry;

pub use adapters::{
    bounded, ArtifactExecutor, DimensionLookup, GenerationAdapter, ReferenceLookup, VisualCritic,
};
pub use config::PipelineConfig;
pub use context::SkillContext;
pub use critic::{parse_verdict, ModelCritic};
pub use diagnose::{diagnose, Diagnoser, DiagnosisRule, FixDirective, STANDARD_RULES};
pub use domain::{
    AdapterError, AdapterResult, AttemptRecord, CadgenError, CallCounts, ExecutionOutcome,
    ExportedFiles, GeneratedArtifact, GenerationRequest, GenerationResult, Measurements,
    PipelineState, RenderedViews, Result, RunStatus, Transition, VisualCheck, VisualVerdict,
};
pub use enrich::{Enricher, Enrichment, ModelDimensionLookup, ReferenceLibrary};
pub use executor::{CadQueryExecutor, ExecutorConfig};
pub use extract::extract_source;
pub use generation::{CliBackend, ModelGenerator, TextBackend};
pub use health::{probe, HealthReport};
pub use materials::{MaterialCatalog, MaterialSummary};
pub use orchestrator::{Pipeline, PipelinePolicy, MAX_AUTO_RETRIES};
pub use store::{ArtifactStore, StoredRun};
pub use telemetry::init_tracing;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
