//! Reflection: meta-analysis over the whole activation index.

use async_trait::async_trait;
use chrono::Utc;

use super::prompts::build_reflection_prompt;
use super::runner::{PipelineContext, PipelineSource, PreparedBatch, Preparation};
use super::PipelineKind;

/// Summarises the index (type and tier histogram plus recently used labelled
/// entries). Always advances the reflection counter, even with no insights.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReflectionSource;

#[async_trait]
impl PipelineSource for ReflectionSource {
    fn kind(&self) -> PipelineKind {
        PipelineKind::Reflection
    }

    async fn prepare(&self, ctx: &PipelineContext<'_>) -> Preparation {
        let now = Utc::now();
        let index = ctx.index.read().await;
        if index.is_empty() {
            return Preparation::Ready(Vec::new());
        }
        let stats = index.stats(now, &ctx.config.type_weights, ctx.config.decay_rate);
        let recent = index.recently_accessed(ctx.config.reflection_recent_limit);
        Preparation::Ready(vec![PreparedBatch {
            prompt: build_reflection_prompt(&stats, &recent, now),
            source_ids: recent.iter().map(|e| e.memory_id.clone()).collect(),
            scope: None,
        }])
    }

    async fn advance(&self, ctx: &PipelineContext<'_>, _batches: &[PreparedBatch]) {
        ctx.stm.lock().await.reset_reflection(Utc::now());
    }
}
