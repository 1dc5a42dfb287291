use std::sync::Arc;

use cadgen_core::fakes::{passing_outcome, ScriptedExecutor, ScriptedGenerator};
use cadgen_core::{ArtifactStore, CadgenError, GenerationRequest, Pipeline, RunStatus};
use tempfile::tempdir;

async fn finished_run() -> (GenerationRequest, cadgen_core::GenerationResult) {
    let request = GenerationRequest::new("Cable Clip for 6mm cable", "PLA").unwrap();
    let pipeline = Pipeline::new(
        Arc::new(ScriptedGenerator::with_sources(["import cadquery as cq\nresult = None"])),
        Arc::new(ScriptedExecutor::new([passing_outcome()])),
        "ctx",
    );
    let result = pipeline.run(&request).await;
    (request, result)
}

#[tokio::test]
async fn write_then_read_round_trips() {
    let dir = tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let (request, result) = finished_run().await;

    let stored = store.write(&result, request.task_text()).unwrap();

    assert!(stored.dir.ends_with(result.run_id.to_string()));
    let step = stored.step.expect("step written");
    assert!(step.ends_with("cable_clip_for_6mm_cable.step"));
    assert_eq!(std::fs::read(&step).unwrap(), b"ISO-10303-21;");
    assert!(stored.stl.is_some());
    let source = std::fs::read_to_string(stored.source.unwrap()).unwrap();
    assert_eq!(Some(source.as_str()), result.code.as_deref());

    let back = store.read_result(&result.run_id).unwrap();
    assert_eq!(back.status, RunStatus::Succeeded);
    assert_eq!(back.code, result.code);
    assert_eq!(back.filename.as_deref(), Some("cable_clip_for_6mm_cable.step"));
    assert_eq!(back.transitions, result.transitions);
    assert!(back.exports.is_none());
}

#[tokio::test]
async fn tampered_result_fails_digest_check() {
    let dir = tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let (request, result) = finished_run().await;
    let stored = store.write(&result, request.task_text()).unwrap();

    let mut json = std::fs::read_to_string(&stored.result).unwrap();
    json = json.replace("\"succeeded\"", "\"exhausted\"");
    std::fs::write(&stored.result, json).unwrap();

    let err = store.read_result(&result.run_id).unwrap_err();
    assert!(matches!(err, CadgenError::DigestMismatch { .. }));
}

#[test]
fn missing_run_is_io_error() {
    let dir = tempdir().unwrap();
    let store = ArtifactStore::new(dir.path());
    let err = store.read_result(&uuid::Uuid::nil()).unwrap_err();
    assert!(matches!(err, CadgenError::Io(_)));
}
