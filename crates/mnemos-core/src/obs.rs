//! Structured lifecycle events for the memory layer.
//!
//! Every emitter logs an `event = "memory.*"` field so log pipelines can
//! filter on it without parsing messages.

use tracing::{info, warn};

/// Emit event: a recall finished.
pub fn emit_recall_completed(
    datasets_queried: usize,
    total_before_filter: usize,
    returned: usize,
    duration_ms: u64,
) {
    info!(
        event = "memory.recall.completed",
        datasets_queried = datasets_queried,
        total_before_filter = total_before_filter,
        returned = returned,
        duration_ms = duration_ms,
    );
}

/// Emit event: one dataset's search failed or timed out and was skipped.
pub fn emit_dataset_search_failed(dataset: &str, error: &dyn std::fmt::Display) {
    warn!(event = "memory.dataset_search.failed", dataset = %dataset, error = %error);
}

/// Emit event: a consolidation or reflection run ended.
pub fn emit_pipeline_finished(
    pipeline: &str,
    items_parsed: usize,
    items_stored: usize,
    duration_ms: u64,
) {
    info!(
        event = "memory.pipeline.finished",
        pipeline = %pipeline,
        items_parsed = items_parsed,
        items_stored = items_stored,
        duration_ms = duration_ms,
    );
}

/// Emit event: a state file could not be written.
pub fn emit_persist_failed(target: &str, error: &dyn std::fmt::Display) {
    warn!(event = "memory.persist.failed", target_file = %target, error = %error);
}

/// Emit event: a prune pass ended.
pub fn emit_prune_finished(
    candidates: usize,
    removed: usize,
    backend_failures: usize,
    dry_run: bool,
) {
    info!(
        event = "memory.prune.finished",
        candidates = candidates,
        removed = removed,
        backend_failures = backend_failures,
        dry_run = dry_run,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emitters_do_not_panic_without_subscriber() {
        emit_recall_completed(3, 10, 5, 42);
        emit_dataset_search_failed("team-shared", &"timeout");
        emit_pipeline_finished("consolidation", 2, 2, 100);
        emit_persist_failed("activation-index.json", &"disk full");
        emit_prune_finished(4, 4, 1, false);
    }
}
