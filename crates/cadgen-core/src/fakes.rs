//! Scripted fakes for the adapter traits (testing only)
//!
//! Every fake replays a queue of canned responses and records the calls it
//! received, so tests can assert both what the pipeline decided and what it
//! asked for.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::adapters::{
    ArtifactExecutor, DimensionLookup, GenerationAdapter, ReferenceLookup, VisualCritic,
};
use crate::domain::{
    AdapterError, AdapterResult, ExecutionOutcome, ExportedFiles, Measurements, RenderedViews,
    VisualVerdict,
};
use crate::generation::TextBackend;

// ---------------------------------------------------------------------------
// CannedBackend
// ---------------------------------------------------------------------------

/// [`TextBackend`] that answers every prompt with the same text.
#[derive(Debug)]
pub struct CannedBackend {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl CannedBackend {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextBackend for CannedBackend {
    fn model_id(&self) -> &str {
        "canned"
    }

    async fn complete(&self, _system: &str, prompt: &str, _timeout: Duration) -> AdapterResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

// ---------------------------------------------------------------------------
// ScriptedGenerator
// ---------------------------------------------------------------------------

/// One call received by [`ScriptedGenerator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratorCall {
    Generate {
        context: String,
        task_text: String,
    },
    Modify {
        previous_source: String,
        directive: String,
    },
}

/// [`GenerationAdapter`] that pops one scripted reply per call.
///
/// An exhausted script answers with [`AdapterError::NoCode`]. An optional
/// delay makes every call sleep first, for timeout tests.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    replies: Mutex<VecDeque<AdapterResult<String>>>,
    calls: Mutex<Vec<GeneratorCall>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(replies: impl IntoIterator<Item = AdapterResult<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Shorthand for a script of successful replies.
    pub fn with_sources<S: Into<String>>(sources: impl IntoIterator<Item = S>) -> Self {
        Self::new(sources.into_iter().map(|s| Ok(s.into())))
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<GeneratorCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn next(&self, call: GeneratorCall) -> AdapterResult<String> {
        self.calls.lock().unwrap().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(AdapterError::NoCode))
    }
}

#[async_trait]
impl GenerationAdapter for ScriptedGenerator {
    fn model_id(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, context: &str, task_text: &str, _material: &str) -> AdapterResult<String> {
        self.next(GeneratorCall::Generate {
            context: context.to_string(),
            task_text: task_text.to_string(),
        })
        .await
    }

    async fn modify(
        &self,
        _context: &str,
        previous_source: &str,
        directive: &str,
        _material: &str,
    ) -> AdapterResult<String> {
        self.next(GeneratorCall::Modify {
            previous_source: previous_source.to_string(),
            directive: directive.to_string(),
        })
        .await
    }
}

// ---------------------------------------------------------------------------
// ScriptedExecutor
// ---------------------------------------------------------------------------

/// Measurements of a single 10 mm cube.
pub fn cube_measurements() -> Measurements {
    Measurements {
        size: Some([10.0, 10.0, 10.0]),
        volume: Some(1000.0),
        solid_count: Some(1),
        bounding_box: None,
    }
}

/// A passing outcome with STEP bytes and both views rendered.
pub fn passing_outcome() -> ExecutionOutcome {
    ExecutionOutcome::succeeded(
        cube_measurements(),
        ExportedFiles {
            step: b"ISO-10303-21;".to_vec(),
            stl: Some(b"solid cube".to_vec()),
            views: RenderedViews {
                iso_svg: Some("<svg>iso</svg>".to_string()),
                front_svg: Some("<svg>front</svg>".to_string()),
            },
        },
    )
}

/// [`ArtifactExecutor`] that pops one scripted outcome per run.
///
/// An exhausted script answers with a failed outcome.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    outcomes: Mutex<VecDeque<ExecutionOutcome>>,
    sources: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedExecutor {
    pub fn new(outcomes: impl IntoIterator<Item = ExecutionOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into_iter().collect()),
            ..Default::default()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sources executed so far, in order.
    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactExecutor for ScriptedExecutor {
    async fn run(&self, source_text: &str) -> ExecutionOutcome {
        self.sources.lock().unwrap().push(source_text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| ExecutionOutcome::failed("no scripted outcome left", None))
    }
}

// ---------------------------------------------------------------------------
// ScriptedCritic
// ---------------------------------------------------------------------------

/// [`VisualCritic`] that pops one scripted verdict per assessment.
#[derive(Debug, Default)]
pub struct ScriptedCritic {
    verdicts: Mutex<VecDeque<AdapterResult<VisualVerdict>>>,
    calls: Mutex<u32>,
}

impl ScriptedCritic {
    pub fn new(verdicts: impl IntoIterator<Item = AdapterResult<VisualVerdict>>) -> Self {
        Self {
            verdicts: Mutex::new(verdicts.into_iter().collect()),
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl VisualCritic for ScriptedCritic {
    async fn assess(
        &self,
        _task_text: &str,
        _views: &RenderedViews,
        _measurements: &Measurements,
    ) -> AdapterResult<VisualVerdict> {
        *self.calls.lock().unwrap() += 1;
        self.verdicts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AdapterError::Transport("no scripted verdict left".to_string())))
    }
}

// ---------------------------------------------------------------------------
// StaticLookup / ScriptedDimensionLookup
// ---------------------------------------------------------------------------

/// [`ReferenceLookup`] that returns fixed text for every task.
#[derive(Debug, Default)]
pub struct StaticLookup {
    text: String,
}

impl StaticLookup {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl ReferenceLookup for StaticLookup {
    fn lookup_by_keyword(&self, _task_text: &str) -> String {
        self.text.clone()
    }
}

/// [`DimensionLookup`] with a single scripted answer and optional delay.
#[derive(Debug)]
pub struct ScriptedDimensionLookup {
    answer: AdapterResult<Option<String>>,
    delay: Option<Duration>,
    calls: Mutex<u32>,
}

impl ScriptedDimensionLookup {
    pub fn new(answer: AdapterResult<Option<String>>) -> Self {
        Self {
            answer,
            delay: None,
            calls: Mutex::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl DimensionLookup for ScriptedDimensionLookup {
    async fn lookup_generative(&self, _task_text: &str) -> AdapterResult<Option<String>> {
        *self.calls.lock().unwrap() += 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.answer.clone()
    }
}
