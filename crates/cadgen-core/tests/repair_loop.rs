use std::sync::Arc;
use std::time::Duration;

use cadgen_core::fakes::{
    passing_outcome, GeneratorCall, ScriptedCritic, ScriptedExecutor, ScriptedGenerator,
};
use cadgen_core::{
    AdapterError, ExecutionOutcome, GenerationRequest, Measurements, Pipeline, PipelinePolicy,
    PipelineState, RunStatus, MAX_AUTO_RETRIES,
};

fn request() -> GenerationRequest {
    GenerationRequest::new("a wall bracket with two M4 holes", "PETG").unwrap()
}

fn failing(diag: &str) -> ExecutionOutcome {
    ExecutionOutcome::failed(diag, None)
}

#[tokio::test]
async fn always_failing_execution_is_bounded() {
    let generator = Arc::new(ScriptedGenerator::with_sources(["v1", "v2", "v3", "v4", "v5"]));
    let executor = Arc::new(ScriptedExecutor::new([
        failing("NameError: name 'w' is not defined"),
        failing("NameError: name 'x' is not defined"),
        failing("NameError: name 'y' is not defined"),
        failing("NameError: name 'z' is not defined"),
    ]));
    let pipeline = Pipeline::new(generator.clone(), executor.clone(), "ctx");

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::Exhausted);
    assert!(!result.success);
    assert_eq!(result.attempts, MAX_AUTO_RETRIES + 1);
    assert_eq!(executor.sources().len() as u32, MAX_AUTO_RETRIES + 1);
    assert_eq!(result.calls.execution, MAX_AUTO_RETRIES + 1);

    let modifies = generator
        .calls()
        .iter()
        .filter(|c| matches!(c, GeneratorCall::Modify { .. }))
        .count() as u32;
    assert_eq!(modifies, MAX_AUTO_RETRIES);
    assert_eq!(result.calls.generation, MAX_AUTO_RETRIES + 1);
}

#[tokio::test]
async fn exhausted_run_surfaces_last_failure() {
    let last_measurements = Measurements {
        size: Some([40.0, 20.0, 5.0]),
        volume: Some(3200.0),
        solid_count: Some(2),
        bounding_box: None,
    };
    let executor = ScriptedExecutor::new([
        failing("SyntaxError: invalid syntax"),
        failing("StdFail_NotDone"),
        ExecutionOutcome::failed("Expected 1 solid, got 2", Some(last_measurements.clone())),
    ]);
    let pipeline = Pipeline::new(
        Arc::new(ScriptedGenerator::with_sources(["v1", "v2", "v3"])),
        Arc::new(executor),
        "ctx",
    );

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.error.as_deref(), Some("Expected 1 solid, got 2"));
    assert_eq!(result.measurements, Some(last_measurements));
    assert_eq!(result.code.as_deref(), Some("v3"));
    assert!(result.filename.is_none());
    assert!(result.exports.is_none());
}

#[tokio::test]
async fn repairs_feed_directive_and_failing_source_back() {
    let generator = Arc::new(ScriptedGenerator::with_sources(["v1", "v2"]));
    let executor = ScriptedExecutor::new([
        failing("Standard_Failure: StdFail_NotDone"),
        passing_outcome(),
    ]);
    let pipeline = Pipeline::new(generator.clone(), Arc::new(executor), "ctx");

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.code.as_deref(), Some("v2"));

    let calls = generator.calls();
    assert_eq!(calls.len(), 2);
    match &calls[1] {
        GeneratorCall::Modify {
            previous_source,
            directive,
        } => {
            assert_eq!(previous_source, "v1");
            assert!(directive.to_lowercase().contains("fillet"));
        }
        other => panic!("expected a modify call, got {:?}", other),
    }
}

#[tokio::test]
async fn failed_repair_generation_ends_exhausted() {
    let generator = ScriptedGenerator::new([
        Ok("v1".to_string()),
        Err(AdapterError::NoCode),
    ]);
    let executor = ScriptedExecutor::new([failing("IndentationError: unexpected indent")]);
    let pipeline = Pipeline::new(Arc::new(generator), Arc::new(executor), "ctx");

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.error.as_deref(), Some("IndentationError: unexpected indent"));
    assert_eq!(result.code.as_deref(), Some("v1"));
    assert_eq!(result.calls.generation, 2);
}

#[tokio::test(start_paused = true)]
async fn generation_timeout_fails_the_run() {
    let generator = ScriptedGenerator::with_sources(["v1"]).with_delay(Duration::from_secs(600));
    let executor = Arc::new(ScriptedExecutor::default());
    let policy = PipelinePolicy {
        generation_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let pipeline =
        Pipeline::new(Arc::new(generator), executor.clone(), "ctx").with_policy(policy);

    let result = pipeline.run(&request()).await;

    assert_eq!(result.status, RunStatus::GenerationFailed);
    assert_eq!(result.error.as_deref(), Some("generation timed out after 5000ms"));
    assert!(executor.sources().is_empty());
}

#[tokio::test]
async fn modify_request_skips_enrichment_and_visual_stage() {
    let generator = Arc::new(ScriptedGenerator::with_sources(["v2"]));
    let critic = Arc::new(ScriptedCritic::default());
    let pipeline = Pipeline::new(
        generator.clone(),
        Arc::new(ScriptedExecutor::new([passing_outcome()])),
        "ctx",
    )
    .with_critic(critic.clone());

    let request = GenerationRequest::new("make it 5 mm taller", "PLA")
        .unwrap()
        .with_previous_source("import cadquery as cq\nresult = cq.Workplane().box(1, 1, 1)")
        .unwrap();
    let result = pipeline.run(&request).await;

    assert_eq!(result.status, RunStatus::Succeeded);
    assert_eq!(critic.calls(), 0);
    assert!(result.visual_check.is_none());
    assert_eq!(
        generator.calls(),
        vec![GeneratorCall::Modify {
            previous_source: "import cadquery as cq\nresult = cq.Workplane().box(1, 1, 1)"
                .to_string(),
            directive: "make it 5 mm taller".to_string(),
        }]
    );
    assert!(result
        .transitions
        .iter()
        .all(|t| t.from != PipelineState::Enriching));
}

#[tokio::test]
async fn transitions_follow_the_repair_path() {
    let pipeline = Pipeline::new(
        Arc::new(ScriptedGenerator::with_sources(["v1", "v2"])),
        Arc::new(ScriptedExecutor::new([failing("boom"), passing_outcome()])),
        "ctx",
    );

    let result = pipeline.run(&request()).await;

    let path: Vec<PipelineState> = result.transitions.iter().map(|t| t.to).collect();
    assert_eq!(
        path,
        vec![
            PipelineState::Generating,
            PipelineState::Executing,
            PipelineState::Diagnosing,
            PipelineState::Generating,
            PipelineState::Executing,
            PipelineState::Succeeded,
            PipelineState::Done,
        ]
    );
    assert_eq!(result.transitions[3].repairs, 1);
}
