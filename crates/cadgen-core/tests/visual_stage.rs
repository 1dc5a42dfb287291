use std::sync::Arc;

use cadgen_core::fakes::{
    cube_measurements, passing_outcome, GeneratorCall, ScriptedCritic, ScriptedExecutor,
    ScriptedGenerator,
};
use cadgen_core::{
    AdapterError, ExecutionOutcome, ExportedFiles, GenerationRequest, Measurements, Pipeline,
    PipelinePolicy, PipelineState, RenderedViews, RunStatus, VisualVerdict,
};

fn request() -> GenerationRequest {
    GenerationRequest::new("a phone stand with a cable slot", "PLA").unwrap()
}

fn rejecting(critique: &str) -> VisualVerdict {
    VisualVerdict::new(false, 4)
        .with_category("wedge")
        .with_missing("cable slot")
        .with_critique(critique)
}

fn bigger_outcome() -> ExecutionOutcome {
    let mut outcome = passing_outcome();
    outcome.measurements = Some(Measurements {
        size: Some([80.0, 60.0, 10.0]),
        volume: Some(48_000.0),
        solid_count: Some(1),
        bounding_box: None,
    });
    outcome
}

#[tokio::test]
async fn critic_error_is_fail_open() {
    let generator = Arc::new(ScriptedGenerator::with_sources(["v1"]));
    let critic = Arc::new(ScriptedCritic::new([Err(AdapterError::Transport(
        "critic unavailable".to_string(),
    ))]));
    let pipeline = Pipeline::new(
        generator.clone(),
        Arc::new(ScriptedExecutor::new([passing_outcome()])),
        "ctx",
    )
    .with_critic(critic.clone());

    let result = pipeline.run(&request()).await;

    assert!(result.success);
    assert_eq!(result.status, RunStatus::Succeeded);
    let visual = result.visual_check.expect("visual check recorded");
    assert_eq!(visual.error.as_deref(), Some("critic unavailable"));
    assert!(visual.retried.is_none());
    assert_eq!(critic.calls(), 1);
    assert_eq!(generator.calls().len(), 1);
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn visual_repair_success_replaces_artifact() {
    let generator = Arc::new(ScriptedGenerator::with_sources(["v1", "v1-bigger-base"]));
    let executor = Arc::new(ScriptedExecutor::new([passing_outcome(), bigger_outcome()]));
    let critic = Arc::new(ScriptedCritic::new([Ok(rejecting("enlarge base"))]));
    let pipeline = Pipeline::new(generator.clone(), executor.clone(), "ctx").with_critic(critic);

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.code.as_deref(), Some("v1-bigger-base"));
    assert_eq!(result.measurements.as_ref().and_then(|m| m.volume), Some(48_000.0));
    assert_eq!(result.attempts, 2);
    let visual = result.visual_check.expect("visual check recorded");
    assert_eq!(visual.retried, Some(true));
    assert_eq!(visual.verdict.as_ref().map(|v| v.confidence), Some(4));

    assert_eq!(
        generator.calls()[1],
        GeneratorCall::Modify {
            previous_source: "v1".to_string(),
            directive: "enlarge base".to_string(),
        }
    );
    assert_eq!(result.calls.visual_repair_generation, 1);
    assert_eq!(result.calls.visual_repair_execution, 1);
}

#[tokio::test]
async fn failed_visual_repair_keeps_original_artifact() {
    let original = passing_outcome();
    let generator = Arc::new(ScriptedGenerator::with_sources(["v1", "v1-broken"]));
    let executor = Arc::new(ScriptedExecutor::new([
        original.clone(),
        ExecutionOutcome::failed(
            "Expected 1 solid, got 2",
            Some(Measurements {
                solid_count: Some(2),
                ..cube_measurements()
            }),
        ),
    ]));
    let critic = Arc::new(ScriptedCritic::new([Ok(rejecting("add a cable slot"))]));
    let pipeline = Pipeline::new(generator, executor.clone(), "ctx").with_critic(critic);

    let result = pipeline.run(&request()).await;

    assert!(result.success);
    assert_eq!(result.status, RunStatus::SucceededWithWarning);
    assert_eq!(result.code.as_deref(), Some("v1"));
    assert_eq!(result.measurements, original.measurements);
    assert_eq!(result.exports, original.exports);
    assert_eq!(result.attempts, 2);
    assert_eq!(executor.sources(), vec!["v1".to_string(), "v1-broken".to_string()]);

    let visual = result.visual_check.expect("visual check recorded");
    assert_eq!(visual.retried, Some(false));
    assert_eq!(visual.retry_error.as_deref(), Some("Expected 1 solid, got 2"));
}

#[tokio::test]
async fn visual_repair_without_code_counts_no_attempt() {
    let generator = ScriptedGenerator::new([Ok("v1".to_string()), Err(AdapterError::NoCode)]);
    let executor = Arc::new(ScriptedExecutor::new([passing_outcome()]));
    let critic = Arc::new(ScriptedCritic::new([Ok(rejecting("thicker walls"))]));
    let pipeline =
        Pipeline::new(Arc::new(generator), executor.clone(), "ctx").with_critic(critic);

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::SucceededWithWarning);
    assert_eq!(result.code.as_deref(), Some("v1"));
    assert_eq!(result.attempts, 1);
    assert_eq!(executor.sources().len(), 1);
    let visual = result.visual_check.expect("visual check recorded");
    assert_eq!(visual.retried, Some(false));
    assert!(visual.retry_error.unwrap().contains("No Python code"));
}

#[tokio::test]
async fn rejection_without_critique_ends_succeeded() {
    let critic = Arc::new(ScriptedCritic::new([Ok(VisualVerdict::new(false, 3))]));
    let generator = Arc::new(ScriptedGenerator::with_sources(["v1"]));
    let pipeline = Pipeline::new(
        generator.clone(),
        Arc::new(ScriptedExecutor::new([passing_outcome()])),
        "ctx",
    )
    .with_critic(critic);

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert!(!result.visual_check.as_ref().unwrap().is_valid());
    assert_eq!(generator.calls().len(), 1);
}

#[tokio::test]
async fn valid_verdict_passes_through() {
    let critic = Arc::new(ScriptedCritic::new([Ok(VisualVerdict::new(true, 9))]));
    let pipeline = Pipeline::new(
        Arc::new(ScriptedGenerator::with_sources(["v1"])),
        Arc::new(ScriptedExecutor::new([passing_outcome()])),
        "ctx",
    )
    .with_critic(critic);

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert!(result.visual_check.unwrap().is_valid());
    assert!(result
        .transitions
        .iter()
        .any(|t| t.to == PipelineState::VisualChecking));
}

#[tokio::test]
async fn missing_views_skip_the_critic() {
    let no_views = ExecutionOutcome::succeeded(
        cube_measurements(),
        ExportedFiles {
            step: b"ISO-10303-21;".to_vec(),
            stl: None,
            views: RenderedViews::default(),
        },
    );
    let critic = Arc::new(ScriptedCritic::new([Ok(VisualVerdict::new(true, 9))]));
    let pipeline = Pipeline::new(
        Arc::new(ScriptedGenerator::with_sources(["v1"])),
        Arc::new(ScriptedExecutor::new([no_views])),
        "ctx",
    )
    .with_critic(critic.clone());

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(critic.calls(), 0);
    assert!(result.visual_check.is_none());
}

#[tokio::test]
async fn disabled_visual_check_skips_the_critic() {
    let critic = Arc::new(ScriptedCritic::new([Ok(VisualVerdict::new(true, 9))]));
    let pipeline = Pipeline::new(
        Arc::new(ScriptedGenerator::with_sources(["v1"])),
        Arc::new(ScriptedExecutor::new([passing_outcome()])),
        "ctx",
    )
    .with_critic(critic.clone())
    .with_policy(PipelinePolicy {
        visual_check: false,
        ..Default::default()
    });

    let result = pipeline.run(&request()).await;

    assert!(result.success);
    assert_eq!(critic.calls(), 0);
}

#[tokio::test]
async fn worst_case_call_budget_holds() {
    // Two structural failures, then success, then a rejected verdict whose
    // repair fails: every branch that issues calls is taken once.
    let generator = Arc::new(ScriptedGenerator::with_sources(["v1", "v2", "v3", "v4"]));
    let executor = Arc::new(ScriptedExecutor::new([
        ExecutionOutcome::failed("boom", None),
        ExecutionOutcome::failed("boom", None),
        passing_outcome(),
        ExecutionOutcome::failed("boom", None),
    ]));
    let critic = Arc::new(ScriptedCritic::new([Ok(rejecting("wider"))]));
    let pipeline = Pipeline::new(generator.clone(), executor.clone(), "ctx").with_critic(critic.clone());

    let result = pipeline.run(&request()).await;
    let policy = pipeline.policy();

    assert_eq!(result.status, RunStatus::SucceededWithWarning);
    assert_eq!(result.code.as_deref(), Some("v3"));
    assert_eq!(result.calls.generation, policy.max_auto_retries + 1);
    assert_eq!(result.calls.critic, 1);
    assert_eq!(result.calls.visual_repair_generation, 1);
    assert_eq!(result.calls.visual_repair_execution, 1);
    assert_eq!(generator.calls().len() as u32, policy.max_auto_retries + 2);
    assert_eq!(executor.sources().len() as u32, policy.max_attempts());
    assert_eq!(result.attempts, policy.max_attempts());
    assert_eq!(critic.calls(), 1);
}
