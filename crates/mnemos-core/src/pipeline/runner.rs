//! Generic batch pipeline: prepare, reason, parse, write back, advance.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use mnemos_backend::normalize::text_digest;
use mnemos_backend::{BackendResult, KnowledgeBackend};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, instrument, warn};

use super::knowledge::{source_ref, KnowledgeEntryMetadata};
use super::parse::{parse_memory_items, ParsedMemory};
use super::reasoner::Reasoner;
use super::{PipelineKind, PipelineOutcome, PipelineReport};
use crate::config::MemoryConfig;
use crate::datasets::DatasetRegistry;
use crate::memory::{ActivationIndex, RegisterOptions, StmBuffer};
use crate::metrics::METRICS;
use crate::obs;
use crate::scope::{resolve_write_dataset, ScopeContext};

/// Everything a pipeline run may touch.
pub struct PipelineContext<'a> {
    pub backend: &'a dyn KnowledgeBackend,
    pub reasoner: &'a dyn Reasoner,
    pub index: &'a RwLock<ActivationIndex>,
    pub stm: &'a Mutex<StmBuffer>,
    pub registry: &'a DatasetRegistry,
    pub config: &'a MemoryConfig,
    pub scope: &'a ScopeContext,
}

/// A batch ready for the reasoner.
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    pub prompt: String,
    /// Ids of the inputs the batch covers.
    pub source_ids: Vec<String>,
    /// Scope whose write dataset receives the batch's items. `None` writes
    /// with the triggering session's scope.
    pub scope: Option<ScopeContext>,
}

/// Result of [`PipelineSource::prepare`].
#[derive(Debug)]
pub enum Preparation {
    /// Batches to run in order. Empty means there is nothing to ask, but the
    /// source still advances.
    Ready(Vec<PreparedBatch>),
    /// Leave all state untouched.
    Skip(String),
}

/// Input side of a pipeline.
#[async_trait]
pub trait PipelineSource: Send + Sync {
    fn kind(&self) -> PipelineKind;

    async fn prepare(&self, ctx: &PipelineContext<'_>) -> Preparation;

    /// Move counters and buffers forward. Runs whatever the reasoner returned.
    async fn advance(&self, ctx: &PipelineContext<'_>, batches: &[PreparedBatch]);
}

/// Run every batch `source` prepares to completion.
#[instrument(skip_all, fields(pipeline = %source.kind(), user_id = %ctx.scope.user_id))]
pub async fn run_pipeline(
    source: &dyn PipelineSource,
    ctx: &PipelineContext<'_>,
) -> PipelineOutcome {
    let started = Instant::now();
    let kind = source.kind();

    let batches = match source.prepare(ctx).await {
        Preparation::Ready(batches) => batches,
        Preparation::Skip(reason) => {
            debug!(%reason, "pipeline skipped");
            return PipelineOutcome::Skipped { reason };
        }
    };

    let mut report = PipelineReport::default();
    for batch in &batches {
        let items = call_reasoner(ctx, &batch.prompt)
            .await
            .map(|raw| parse_memory_items(&raw, ctx.config.max_items_per_batch))
            .unwrap_or_default();
        report.items_parsed += items.len();
        if items.is_empty() {
            continue;
        }
        let stored = store_items(
            ctx.backend,
            ctx.index,
            ctx.registry,
            batch.scope.as_ref().unwrap_or(ctx.scope),
            &items,
            source_ref(&batch.source_ids),
            ctx.config.cognify_after_write,
        )
        .await;
        report.items_stored += stored.items_stored;
        report.write_failures += stored.write_failures;
        report.memory_ids.extend(stored.memory_ids);
    }
    report.empty_response = report.items_parsed == 0;

    source.advance(ctx, &batches).await;

    match kind {
        PipelineKind::Consolidation => METRICS.inc_consolidations(),
        PipelineKind::Reflection => METRICS.inc_reflections(),
    }
    obs::emit_pipeline_finished(
        &kind.to_string(),
        report.items_parsed,
        report.items_stored,
        started.elapsed().as_millis() as u64,
    );
    PipelineOutcome::Completed(report)
}

async fn call_reasoner(ctx: &PipelineContext<'_>, prompt: &str) -> Option<String> {
    let limit = ctx.config.reasoning_timeout();
    match tokio::time::timeout(limit, ctx.reasoner.reason(prompt, limit)).await {
        Ok(Some(text)) if !text.trim().is_empty() => Some(text),
        Ok(_) => {
            warn!("reasoner returned no output");
            None
        }
        Err(_) => {
            warn!(timeout_ms = limit.as_millis() as u64, "reasoner timed out");
            None
        }
    }
}

/// Write one item and register it in the index. Returns the memory id.
///
/// `dataset_id` is read as the id to write with and replaced by the id the
/// backend reports, so the latest successful write wins for the rest of a batch.
pub async fn store_one(
    backend: &dyn KnowledgeBackend,
    index: &RwLock<ActivationIndex>,
    registry: &DatasetRegistry,
    scope: &ScopeContext,
    item: &ParsedMemory,
    source_ref: Option<String>,
    dataset_id: &mut Option<String>,
) -> BackendResult<String> {
    let dataset_name = resolve_write_dataset(scope);
    let meta = KnowledgeEntryMetadata::for_item(item, scope, source_ref, Utc::now());
    let doc = meta.render(&item.text);
    let receipt = backend
        .add(&doc, &dataset_name, dataset_id.as_deref())
        .await?;

    if dataset_id.as_deref() != Some(receipt.dataset_id.as_str()) {
        debug!(
            dataset = %dataset_name,
            dataset_id = %receipt.dataset_id,
            "using dataset id from latest write"
        );
    }
    registry.record_receipt(&receipt);
    *dataset_id = Some(receipt.dataset_id.clone());

    let memory_id = receipt.data_id.unwrap_or_else(|| text_digest(&doc));
    let opts = RegisterOptions {
        pinned: item.pinned,
        label: Some(item.label.clone().unwrap_or(meta.title)),
        dataset_name: Some(dataset_name),
    };
    index
        .write()
        .await
        .register_memory(&memory_id, item.memory_type, opts, Utc::now());
    Ok(memory_id)
}

/// Trigger backend re-indexing, logging failures.
pub async fn trigger_cognify(backend: &dyn KnowledgeBackend, dataset_id: &str) {
    if let Err(e) = backend.cognify(&[dataset_id.to_string()]).await {
        warn!(dataset_id = %dataset_id, error = %e, "cognify trigger failed");
    }
}

/// Write items to the scope's write dataset and register them in the index.
/// A failed write is logged and skipped.
pub async fn store_items(
    backend: &dyn KnowledgeBackend,
    index: &RwLock<ActivationIndex>,
    registry: &DatasetRegistry,
    scope: &ScopeContext,
    items: &[ParsedMemory],
    source_ref: Option<String>,
    cognify: bool,
) -> PipelineReport {
    let mut dataset_id = registry.id_for(&resolve_write_dataset(scope));
    let mut report = PipelineReport {
        items_parsed: items.len(),
        ..PipelineReport::default()
    };

    for item in items {
        let source_ref = source_ref.clone();
        match store_one(backend, index, registry, scope, item, source_ref, &mut dataset_id).await {
            Ok(memory_id) => {
                report.items_stored += 1;
                report.memory_ids.push(memory_id);
            }
            Err(e) => {
                warn!(error = %e, "memory write failed, skipping item");
                report.write_failures += 1;
            }
        }
    }

    METRICS.add_memories_stored(report.items_stored as u64);

    if cognify && report.items_stored > 0 {
        if let Some(id) = &dataset_id {
            trigger_cognify(backend, id).await;
        }
    }
    report
}
