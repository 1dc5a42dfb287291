//! Contracts for the external collaborators the pipeline drives.
//!
//! All traits are async and backend-agnostic. Concrete implementations live
//! in [`crate::generation`], [`crate::executor`], [`crate::critic`] and
//! [`crate::enrich`]; scripted fakes for tests live in [`crate::fakes`].

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{
    AdapterError, AdapterResult, ExecutionOutcome, Measurements, RenderedViews, VisualVerdict,
};

/// Text generation model producing script source.
///
/// Both "no response" and "response without extractable code" are reported
/// through the error channel.
#[async_trait]
pub trait GenerationAdapter: Send + Sync {
    /// Identifier of the model behind this adapter.
    fn model_id(&self) -> &str;

    /// Create a new artifact from a task description.
    async fn generate(&self, context: &str, task_text: &str, material: &str)
        -> AdapterResult<String>;

    /// Rewrite `previous_source` according to `directive`.
    async fn modify(
        &self,
        context: &str,
        previous_source: &str,
        directive: &str,
        material: &str,
    ) -> AdapterResult<String>;
}

/// Isolated runner for generated scripts.
///
/// Failures, including timeouts, are reported as failed outcomes.
#[async_trait]
pub trait ArtifactExecutor: Send + Sync {
    async fn run(&self, source_text: &str) -> ExecutionOutcome;
}

/// Assesses whether rendered geometry matches the task.
#[async_trait]
pub trait VisualCritic: Send + Sync {
    async fn assess(
        &self,
        task_text: &str,
        views: &RenderedViews,
        measurements: &Measurements,
    ) -> AdapterResult<VisualVerdict>;
}

/// Fast keyword-scored lookup of reference dimensions.
pub trait ReferenceLookup: Send + Sync {
    /// Formatted reference text, or an empty string when nothing matches.
    fn lookup_by_keyword(&self, task_text: &str) -> String;
}

/// Slower generative lookup of real-world dimensions.
#[async_trait]
pub trait DimensionLookup: Send + Sync {
    /// `Ok(None)` when the task mentions nothing worth looking up.
    async fn lookup_generative(&self, task_text: &str) -> AdapterResult<Option<String>>;
}

/// Await `fut` for at most `limit`; elapsing is reported as
/// [`AdapterError::Timeout`] naming `stage`.
pub async fn bounded<T, Fut>(stage: &str, limit: Duration, fut: Fut) -> AdapterResult<T>
where
    Fut: Future<Output = AdapterResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_elapsed) => Err(AdapterError::Timeout {
            stage: stage.to_string(),
            limit_ms: limit.as_millis() as u64,
        }),
    }
}
