//! Structured observability hooks for playground lifecycle events.
//!
//! A run-scoped tracing span via [`run_span`], plus emission functions for
//! the key lifecycle events: bootstrap, run start/finish, example selection.

use tracing::{info, Span};

use crate::error::PlaygroundError;

/// Span covering one execution; every session step inherits the run id.
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("playground.run", run_id = %run_id)
}

/// Emit event: bootstrap started for the given package requirement.
pub fn emit_bootstrap_started(package: &str) {
    info!(event = "bootstrap.started", package = %package);
}

/// Emit event: runtime booted and provisioned.
pub fn emit_bootstrap_ready(package: &str) {
    info!(event = "bootstrap.ready", package = %package);
}

/// Emit event: bootstrap or installation failure (warning level).
pub fn emit_bootstrap_failed(error: &PlaygroundError) {
    tracing::warn!(event = "bootstrap.failed", error = %error);
}

/// Emit event: a run started against the named example (when one is selected).
pub fn emit_run_started(run_id: &str, example: &str) {
    info!(event = "run.started", run_id = %run_id, example = %example);
}

/// Emit event: a run concluded.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, output_bytes: usize, raised: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        output_bytes = output_bytes,
        raised = raised,
    );
}

/// Emit event: a run request was dropped because the stage was not ready.
pub fn emit_run_skipped(stage: &str) {
    info!(event = "run.skipped", stage = %stage);
}

/// Emit event: session buffers replaced from an example.
pub fn emit_example_selected(key: &str) {
    info!(event = "example.selected", key = %key);
}
