//! Consolidation: promote pending STM excerpts into long-term memory.

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::prompts::build_consolidation_prompt;
use super::runner::{PipelineContext, PipelineSource, PreparedBatch, Preparation};
use super::PipelineKind;
use crate::memory::StmEntry;

/// Batches every unconsolidated STM entry, one batch per write dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsolidationSource;

#[async_trait]
impl PipelineSource for ConsolidationSource {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Consolidation
    }

    async fn prepare(&self, ctx: &PipelineContext<'_>) -> Preparation {
        let stm = ctx.stm.lock().await;
        let pending: Vec<&StmEntry> = stm.pending().collect();
        if pending.is_empty() {
            // nothing to promote, but counters and eviction still advance
            return Preparation::Ready(Vec::new());
        }
        if !stm.worth_consolidating() {
            return Preparation::Skip(format!(
                "single pending entry with {} excerpts",
                pending[0].excerpt_count()
            ));
        }
        // one batch per write dataset so excerpts never cross into a wider scope
        let batches = stm
            .pending_by_write_target(&ctx.scope.user_id)
            .into_iter()
            .map(|(scope, entries)| PreparedBatch {
                prompt: build_consolidation_prompt(&entries, &scope),
                source_ids: entries.iter().map(|e| e.id.clone()).collect(),
                scope: Some(scope),
            })
            .collect();
        Preparation::Ready(batches)
    }

    async fn advance(&self, ctx: &PipelineContext<'_>, batches: &[PreparedBatch]) {
        let now = Utc::now();
        let ids: Vec<String> = batches
            .iter()
            .flat_map(|b| b.source_ids.iter().cloned())
            .collect();
        let mut stm = ctx.stm.lock().await;
        let marked = stm.mark_consolidated(&ids);
        let evicted = stm.evict_old_entries(ctx.config.stm_max_age_days, now);
        stm.reset_consolidation(now);
        debug!(marked, evicted, remaining = stm.entries.len(), "stm buffer advanced");
    }
}
