//! Repair orchestrator: the bounded generate/execute/diagnose state machine.
//!
//! A run moves through [`PipelineState`]s one transition at a time. The
//! structural loop is bounded by [`MAX_AUTO_RETRIES`]; the visual stage is
//! advisory and allows at most one critique-driven repair. Adapter failures
//! never escape: each one becomes a state transition and ends up as a value
//! on the [`GenerationResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use crate::adapters::{bounded, ArtifactExecutor, GenerationAdapter, VisualCritic};
use crate::config::PipelineConfig;
use crate::context::SkillContext;
use crate::critic::ModelCritic;
use crate::diagnose::{Diagnoser, FixDirective};
use crate::domain::{
    AttemptRecord, CallCounts, ExecutionOutcome, GeneratedArtifact, GenerationRequest,
    GenerationResult, PipelineState, Result, RunStatus, Transition, VisualCheck,
    DEFAULT_EXPECTED_SOLIDS,
};
use crate::enrich::{Enricher, ModelDimensionLookup, ReferenceLibrary};
use crate::executor::{CadQueryExecutor, ExecutorConfig};
use crate::generation::{CliBackend, ModelGenerator, TextBackend};
use crate::obs;
use crate::store::slug;

/// Diagnosis-driven regenerations per run.
pub const MAX_AUTO_RETRIES: u32 = 2;

/// Slack the orchestrator allows past the executor's own timeout.
pub const EXECUTION_GRACE: Duration = Duration::from_secs(5);

/// Limits and switches for one pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePolicy {
    pub max_auto_retries: u32,
    pub expected_solids: u32,
    pub visual_check: bool,
    pub generation_timeout: Duration,
    pub critic_timeout: Duration,
    /// Outer guard around each executor call.
    pub execution_timeout: Duration,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            max_auto_retries: MAX_AUTO_RETRIES,
            expected_solids: DEFAULT_EXPECTED_SOLIDS,
            visual_check: true,
            generation_timeout: Duration::from_secs(120),
            critic_timeout: Duration::from_secs(60),
            execution_timeout: Duration::from_secs(60) + EXECUTION_GRACE,
        }
    }
}

impl PipelinePolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_auto_retries: MAX_AUTO_RETRIES,
            expected_solids: config.expected_solid_count,
            visual_check: config.visual_check,
            generation_timeout: config.generation_timeout(),
            critic_timeout: config.critic_timeout(),
            execution_timeout: config.execution_timeout() + EXECUTION_GRACE,
        }
    }

    /// Upper bound on execution attempts in one run.
    pub fn max_attempts(&self) -> u32 {
        self.max_auto_retries + 2
    }
}

/// The generation-repair pipeline.
#[derive(Clone)]
pub struct Pipeline {
    generator: Arc<dyn GenerationAdapter>,
    executor: Arc<dyn ArtifactExecutor>,
    critic: Option<Arc<dyn VisualCritic>>,
    enricher: Option<Enricher>,
    context: Arc<str>,
    diagnoser: Diagnoser,
    policy: PipelinePolicy,
}

impl Pipeline {
    pub fn new(
        generator: Arc<dyn GenerationAdapter>,
        executor: Arc<dyn ArtifactExecutor>,
        context: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            generator,
            executor,
            critic: None,
            enricher: None,
            context: context.into(),
            diagnoser: Diagnoser::default(),
            policy: PipelinePolicy::default(),
        }
    }

    pub fn with_critic(mut self, critic: Arc<dyn VisualCritic>) -> Self {
        self.critic = Some(critic);
        self
    }

    pub fn with_enricher(mut self, enricher: Enricher) -> Self {
        self.enricher = Some(enricher);
        self
    }

    pub fn with_policy(mut self, policy: PipelinePolicy) -> Self {
        self.diagnoser = Diagnoser::standard(policy.expected_solids);
        self.policy = policy;
        self
    }

    /// Wire the production adapters described by `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let backend: Arc<dyn TextBackend> = Arc::new(CliBackend::new(
            config.generator_program.clone(),
            config.model.clone(),
        ));
        let generator = ModelGenerator::new(backend.clone(), config.generation_timeout());
        let executor = CadQueryExecutor::new(ExecutorConfig {
            python_program: config.python_program.clone(),
            timeout: config.execution_timeout(),
            expected_solids: config.expected_solid_count,
        });

        let library = match &config.reference_library {
            Some(path) => ReferenceLibrary::from_path(path)?,
            None => ReferenceLibrary::embedded().clone(),
        };
        let enricher = Enricher::new(Arc::new(library), config.lookup_timeout())
            .with_dimension_lookup(Arc::new(ModelDimensionLookup::new(
                backend.clone(),
                config.lookup_timeout(),
            )));

        let context = SkillContext::shared(&config.skills_dir);

        let mut pipeline = Self::new(Arc::new(generator), Arc::new(executor), context.text())
            .with_enricher(enricher)
            .with_policy(PipelinePolicy::from_config(config));
        if config.visual_check {
            pipeline = pipeline.with_critic(Arc::new(ModelCritic::new(
                backend,
                config.critic_timeout(),
            )));
        }
        Ok(pipeline)
    }

    pub fn policy(&self) -> &PipelinePolicy {
        &self.policy
    }

    pub fn model_id(&self) -> &str {
        self.generator.model_id()
    }

    /// Drive one request to DONE.
    pub async fn run(&self, request: &GenerationRequest) -> GenerationResult {
        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string());
        self.run_with_id(run_id, request).instrument(span).await
    }

    async fn run_with_id(&self, run_id: Uuid, request: &GenerationRequest) -> GenerationResult {
        let started = Instant::now();
        obs::emit_run_started(&run_id.to_string(), request.material_id(), request.is_modify());

        let mut run = Run::new(run_id, request, &self.policy);
        while run.state != PipelineState::Done {
            let next = self.step(&mut run).await;
            run.transition(next);
        }

        let result = run.into_result(self.generator.model_id());
        obs::emit_run_finished(
            &run_id.to_string(),
            result.status,
            result.attempts,
            started.elapsed().as_millis() as u64,
        );
        result
    }

    /// Perform the work of the current state and return the next one.
    async fn step(&self, run: &mut Run<'_>) -> PipelineState {
        match run.state {
            PipelineState::Enriching => self.enrich(run).await,
            PipelineState::Generating => self.generate(run).await,
            PipelineState::Executing => self.execute_attempt(run).await,
            PipelineState::Diagnosing => self.diagnose(run),
            PipelineState::Succeeded => self.after_success(run),
            PipelineState::VisualChecking => self.visual_check(run).await,
            PipelineState::VisualRetry => self.visual_retry(run).await,
            PipelineState::VisualRetryExecuting => self.visual_retry_execute(run).await,
            PipelineState::Exhausted => run.finish(RunStatus::Exhausted),
            PipelineState::GenerationFailed => run.finish(RunStatus::GenerationFailed),
            PipelineState::Done => PipelineState::Done,
        }
    }

    async fn enrich(&self, run: &mut Run<'_>) -> PipelineState {
        if let Some(enricher) = &self.enricher {
            let enrichment = enricher.enrich(run.request.task_text()).await;
            if enrichment.lookup_called {
                run.calls.enrichment_lookup += 1;
            }
            if let Some(err) = &enrichment.lookup_error {
                obs::emit_stage_degraded(&run.id(), "enrichment", err);
            }
            run.prompt = enrichment.compose(run.request.task_text());
        }
        PipelineState::Generating
    }

    async fn generate(&self, run: &mut Run<'_>) -> PipelineState {
        let material = run.request.material_id();
        run.calls.generation += 1;

        // Repair of the last failing artifact.
        if let Some(directive) = run.pending_directive.take() {
            let previous = run
                .current
                .as_ref()
                .map(|a| a.source_text.clone())
                .unwrap_or_default();
            let reply = bounded(
                "generation",
                self.policy.generation_timeout,
                self.generator
                    .modify(&self.context, &previous, &directive.text, material),
            )
            .await;
            return match reply {
                Ok(source) => {
                    run.current = Some(GeneratedArtifact::new(source, self.generator.model_id()));
                    PipelineState::Executing
                }
                Err(e) => {
                    warn!(error = %e, rule = %directive.rule, "repair generation failed");
                    run.repair_error = Some(e.to_string());
                    PipelineState::Exhausted
                }
            };
        }

        let reply = match run.request.previous_source() {
            Some(previous) => {
                bounded(
                    "generation",
                    self.policy.generation_timeout,
                    self.generator
                        .modify(&self.context, previous, run.request.task_text(), material),
                )
                .await
            }
            None => {
                bounded(
                    "generation",
                    self.policy.generation_timeout,
                    self.generator.generate(&self.context, &run.prompt, material),
                )
                .await
            }
        };

        match reply {
            Ok(source) => {
                run.current = Some(GeneratedArtifact::new(source, self.generator.model_id()));
                PipelineState::Executing
            }
            Err(e) => {
                warn!(error = %e, "generation failed");
                run.error = Some(e.to_string());
                PipelineState::GenerationFailed
            }
        }
    }

    /// Run `source` under the outer guard and enforce the success invariant.
    async fn execute(&self, source: &str) -> ExecutionOutcome {
        let limit = self.policy.execution_timeout;
        match tokio::time::timeout(limit, self.executor.run(source)).await {
            Ok(outcome) => outcome.validated(self.policy.expected_solids),
            Err(_) => ExecutionOutcome::failed(
                format!("Execution timed out after {}s", limit.as_secs()),
                None,
            ),
        }
    }

    async fn execute_attempt(&self, run: &mut Run<'_>) -> PipelineState {
        let Some(artifact) = run.current.clone() else {
            run.error = Some("no artifact to execute".to_string());
            return PipelineState::GenerationFailed;
        };
        run.calls.execution += 1;
        let outcome = self.execute(&artifact.source_text).await;
        debug!(
            attempt = run.record.len() + 1,
            success = outcome.success,
            "execution attempt finished"
        );

        let success = outcome.success;
        if !run.record.push(artifact.clone(), outcome.clone()) {
            warn!("attempt record full; attempt not recorded");
        }
        if success {
            run.accepted = Some((artifact, outcome));
            PipelineState::Succeeded
        } else {
            PipelineState::Diagnosing
        }
    }

    fn diagnose(&self, run: &mut Run<'_>) -> PipelineState {
        if run.repairs >= self.policy.max_auto_retries {
            return PipelineState::Exhausted;
        }
        let Some((_, outcome)) = run.record.last() else {
            return PipelineState::Exhausted;
        };
        let directive = self.diagnoser.diagnose(
            outcome.diagnostic_text.as_deref().unwrap_or_default(),
            outcome.measurements.as_ref(),
        );
        run.repairs += 1;
        obs::emit_diagnosed(&run.id(), &directive.rule, run.repairs);
        run.pending_directive = Some(directive);
        PipelineState::Generating
    }

    fn after_success(&self, run: &mut Run<'_>) -> PipelineState {
        let has_views = run
            .accepted
            .as_ref()
            .and_then(|(_, o)| o.exports.as_ref())
            .is_some_and(|e| !e.views.is_empty());
        if !run.request.is_modify() && self.policy.visual_check && self.critic.is_some() && has_views
        {
            PipelineState::VisualChecking
        } else {
            run.finish(RunStatus::Succeeded)
        }
    }

    async fn visual_check(&self, run: &mut Run<'_>) -> PipelineState {
        let Some(critic) = self.critic.clone() else {
            return run.finish(RunStatus::Succeeded);
        };
        let Some((views, measurements)) = run.accepted.as_ref().map(|(_, o)| {
            (
                o.exports.as_ref().map(|e| e.views.clone()).unwrap_or_default(),
                o.measurements.clone().unwrap_or_default(),
            )
        }) else {
            return run.finish(RunStatus::Succeeded);
        };

        run.calls.critic += 1;
        let verdict = bounded(
            "visual critic",
            self.policy.critic_timeout,
            critic.assess(run.request.task_text(), &views, &measurements),
        )
        .await;

        match verdict {
            Err(e) => {
                obs::emit_stage_degraded(&run.id(), "visual critic", &e);
                run.visual = Some(VisualCheck::from_error(e.to_string()));
                run.finish(RunStatus::Succeeded)
            }
            Ok(verdict) => {
                obs::emit_visual_verdict(&run.id(), verdict.valid, verdict.confidence);
                let retry = !verdict.valid && verdict.critique.is_some();
                run.visual = Some(VisualCheck::from_verdict(verdict));
                if retry {
                    PipelineState::VisualRetry
                } else {
                    run.finish(RunStatus::Succeeded)
                }
            }
        }
    }

    async fn visual_retry(&self, run: &mut Run<'_>) -> PipelineState {
        let critique = run
            .visual
            .as_ref()
            .and_then(|v| v.verdict.as_ref())
            .and_then(|v| v.critique.clone())
            .unwrap_or_default();
        let Some(original) = run.accepted.as_ref().map(|(a, _)| a.source_text.clone()) else {
            return run.finish(RunStatus::Succeeded);
        };
        info!(critique = %critique, "visual repair requested");

        run.calls.visual_repair_generation += 1;
        let reply = bounded(
            "generation",
            self.policy.generation_timeout,
            self.generator.modify(
                &self.context,
                &original,
                &critique,
                run.request.material_id(),
            ),
        )
        .await;

        match reply {
            Ok(source) => {
                run.visual_candidate =
                    Some(GeneratedArtifact::new(source, self.generator.model_id()));
                PipelineState::VisualRetryExecuting
            }
            Err(e) => {
                run.reject_visual_repair(e.to_string());
                run.finish(RunStatus::SucceededWithWarning)
            }
        }
    }

    async fn visual_retry_execute(&self, run: &mut Run<'_>) -> PipelineState {
        let Some(candidate) = run.visual_candidate.take() else {
            return run.finish(RunStatus::SucceededWithWarning);
        };
        run.calls.visual_repair_execution += 1;
        run.extra_attempts += 1;
        let outcome = self.execute(&candidate.source_text).await;

        if outcome.success {
            info!("visual repair accepted");
            run.accepted = Some((candidate, outcome));
            if let Some(visual) = run.visual.as_mut() {
                visual.retried = Some(true);
            }
            run.finish(RunStatus::Succeeded)
        } else {
            let diag = outcome
                .diagnostic_text
                .unwrap_or_else(|| "visual repair failed".to_string());
            info!(error = %diag, "visual repair failed; keeping original artifact");
            run.reject_visual_repair(diag);
            run.finish(RunStatus::SucceededWithWarning)
        }
    }
}

/// Mutable state of one run.
struct Run<'a> {
    run_id: Uuid,
    request: &'a GenerationRequest,
    state: PipelineState,
    /// Task text as sent to the generator, enriched on fresh runs.
    prompt: String,
    repairs: u32,
    record: AttemptRecord,
    current: Option<GeneratedArtifact>,
    pending_directive: Option<FixDirective>,
    accepted: Option<(GeneratedArtifact, ExecutionOutcome)>,
    visual: Option<VisualCheck>,
    visual_candidate: Option<GeneratedArtifact>,
    extra_attempts: u32,
    calls: CallCounts,
    transitions: Vec<Transition>,
    status: Option<RunStatus>,
    error: Option<String>,
    repair_error: Option<String>,
}

impl<'a> Run<'a> {
    fn new(run_id: Uuid, request: &'a GenerationRequest, policy: &PipelinePolicy) -> Self {
        let state = if request.is_modify() {
            PipelineState::Generating
        } else {
            PipelineState::Enriching
        };
        Self {
            run_id,
            request,
            state,
            prompt: request.task_text().to_string(),
            repairs: 0,
            record: AttemptRecord::with_capacity(policy.max_auto_retries as usize + 1),
            current: None,
            pending_directive: None,
            accepted: None,
            visual: None,
            visual_candidate: None,
            extra_attempts: 0,
            calls: CallCounts::default(),
            transitions: Vec::new(),
            status: None,
            error: None,
            repair_error: None,
        }
    }

    fn id(&self) -> String {
        self.run_id.to_string()
    }

    fn transition(&mut self, to: PipelineState) {
        let from = self.state;
        obs::emit_transition(&self.id(), from, to, self.repairs);
        self.transitions.push(Transition {
            from,
            to,
            repairs: self.repairs,
        });
        self.state = to;
    }

    fn finish(&mut self, status: RunStatus) -> PipelineState {
        self.status = Some(status);
        PipelineState::Done
    }

    fn reject_visual_repair(&mut self, reason: String) {
        let visual = self.visual.get_or_insert_with(VisualCheck::default);
        visual.retried = Some(false);
        visual.retry_error = Some(reason);
    }

    fn into_result(self, model: &str) -> GenerationResult {
        let status = self.status.unwrap_or(RunStatus::GenerationFailed);
        let attempts = self.record.len() as u32 + self.extra_attempts;

        let (code, measurements, error, exports) = match (status, self.accepted) {
            (s, Some((artifact, outcome))) if s.is_success() => (
                Some(artifact.source_text),
                outcome.measurements,
                None,
                outcome.exports,
            ),
            (RunStatus::Exhausted, _) => {
                let last = self.record.last();
                let error = last
                    .and_then(|(_, o)| o.diagnostic_text.clone())
                    .or(self.repair_error);
                (
                    self.current.map(|a| a.source_text),
                    last.and_then(|(_, o)| o.measurements.clone()),
                    error,
                    None,
                )
            }
            _ => (None, None, self.error, None),
        };

        let filename = status
            .is_success()
            .then(|| format!("{}.step", slug(self.request.task_text())));

        GenerationResult {
            run_id: self.run_id,
            success: status.is_success(),
            status,
            code,
            model: model.to_string(),
            measurements,
            error,
            attempts,
            visual_check: self.visual,
            filename,
            calls: self.calls,
            transitions: self.transitions,
            finished_at: Utc::now(),
            exports,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AdapterError;
    use crate::fakes::{passing_outcome, ScriptedExecutor, ScriptedGenerator};

    fn request() -> GenerationRequest {
        GenerationRequest::new("a 20 mm cube", "PLA").unwrap()
    }

    fn pipeline(generator: ScriptedGenerator, executor: ScriptedExecutor) -> Pipeline {
        Pipeline::new(Arc::new(generator), Arc::new(executor), "ctx")
    }

    #[test]
    fn test_policy_from_config_adds_grace() {
        let policy = PipelinePolicy::from_config(&PipelineConfig::default());
        assert_eq!(policy.execution_timeout, Duration::from_secs(65));
        assert_eq!(policy.max_auto_retries, MAX_AUTO_RETRIES);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[tokio::test]
    async fn test_first_try_success_without_critic() {
        let p = pipeline(
            ScriptedGenerator::with_sources(["import cadquery as cq"]),
            ScriptedExecutor::new([passing_outcome()]),
        );
        let result = p.run(&request()).await;
        assert!(result.success);
        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.filename.as_deref(), Some("a_20_mm_cube.step"));
        assert!(result.exports.is_some());
        assert!(result.visual_check.is_none());
        assert_eq!(
            result.transitions.last().map(|t| t.to),
            Some(PipelineState::Done)
        );
    }

    #[tokio::test]
    async fn test_generation_failure_ends_run() {
        let p = pipeline(
            ScriptedGenerator::new([Err(AdapterError::Transport("boom".to_string()))]),
            ScriptedExecutor::default(),
        );
        let result = p.run(&request()).await;
        assert_eq!(result.status, RunStatus::GenerationFailed);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.attempts, 0);
        assert!(result.code.is_none());
        assert_eq!(result.calls.execution, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_executor_guard_timeout_is_failed_outcome() {
        let executor = ScriptedExecutor::new([passing_outcome()]).with_delay(Duration::from_secs(600));
        let policy = PipelinePolicy {
            max_auto_retries: 0,
            execution_timeout: Duration::from_secs(2),
            ..Default::default()
        };
        let p = pipeline(ScriptedGenerator::with_sources(["src"]), executor).with_policy(policy);
        let result = p.run(&request()).await;
        assert_eq!(result.status, RunStatus::Exhausted);
        assert_eq!(result.error.as_deref(), Some("Execution timed out after 2s"));
    }

    #[tokio::test]
    async fn test_success_without_enough_solids_is_downgraded() {
        let mut bad = passing_outcome();
        if let Some(m) = bad.measurements.as_mut() {
            m.solid_count = Some(2);
        }
        let p = pipeline(
            ScriptedGenerator::with_sources(["one", "two"]),
            ScriptedExecutor::new([bad, passing_outcome()]),
        );
        let result = p.run(&request()).await;
        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(result.attempts, 2);
        assert_eq!(result.code.as_deref(), Some("two"));
    }
}
