//! Structured lifecycle events for pipeline runs.
//!
//! Every run executes inside a [`run_span`]; state changes and outcomes are
//! emitted as `info!` events with an `event` field so they can be filtered
//! from JSON logs.

use tracing::{info, warn};

use crate::domain::{PipelineState, RunStatus};

/// The `cadgen.run` span for one run; attach with `tracing::Instrument`.
pub fn run_span(run_id: &str) -> tracing::Span {
    tracing::info_span!("cadgen.run", run_id = %run_id)
}

pub fn emit_run_started(run_id: &str, material: &str, modify: bool) {
    info!(event = "run.started", run_id = %run_id, material = %material, modify = modify);
}

pub fn emit_transition(run_id: &str, from: PipelineState, to: PipelineState, repairs: u32) {
    info!(
        event = "run.transition",
        run_id = %run_id,
        from = %from,
        to = %to,
        repairs = repairs,
    );
}

/// A failed attempt was classified and a repair directive chosen.
pub fn emit_diagnosed(run_id: &str, rule: &str, attempt: u32) {
    info!(event = "run.diagnosed", run_id = %run_id, rule = %rule, attempt = attempt);
}

pub fn emit_visual_verdict(run_id: &str, valid: bool, confidence: u8) {
    info!(
        event = "run.visual_verdict",
        run_id = %run_id,
        valid = valid,
        confidence = confidence,
    );
}

/// Emitted at warn level: an advisory stage failed and the run went on.
pub fn emit_stage_degraded(run_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.stage_degraded", run_id = %run_id, stage = %stage, error = %error);
}

pub fn emit_run_finished(run_id: &str, status: RunStatus, attempts: u32, duration_ms: u64) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        status = ?status,
        attempts = attempts,
        duration_ms = duration_ms,
        success = status.is_success(),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_span_create() {
        run_span("test-run-id").in_scope(|| {
            emit_transition("test-run-id", PipelineState::Generating, PipelineState::Executing, 0);
        });
    }
}
