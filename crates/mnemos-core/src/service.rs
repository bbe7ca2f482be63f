//! `MemoryService`: the single owner of memory state for one process.
//!
//! Holds the activation index and STM buffer in memory (authoritative for the
//! process lifetime), persists them through a background [`SaveQueue`], and
//! wires recall, writes, the promotion pipelines and pruning to the injected
//! backend and reasoner.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use mnemos_backend::KnowledgeBackend;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::MemoryConfig;
use crate::datasets::DatasetRegistry;
use crate::error::{MemoryError, MemoryResult};
use crate::memory::{
    detect_memory_type, prune_index, ActivationIndex, ActivationStats, MemoryType, PruneReport,
    StmBuffer,
};
use crate::metrics::{MetricsSnapshot, METRICS};
use crate::obs;
use crate::persist::{load_index, load_stm, SaveQueue};
use crate::pipeline::{
    run_pipeline, store_one, trigger_cognify, ConsolidationSource, InFlightGuard, ParsedMemory,
    PipelineContext, PipelineOutcome, PipelineSource, Reasoner, ReflectionSource,
};
use crate::recall::{fan_out, rank, DecayView, RouteRequest, RoutedResults};
use crate::scope::{resolve_recall_datasets, resolve_write_dataset, ScopeContext};

/// Options for [`MemoryService::remember`].
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    /// Detected from the text when unset.
    pub memory_type: Option<MemoryType>,
    pub pinned: Option<bool>,
    pub label: Option<String>,
    pub tags: Vec<String>,
}

/// What a completed turn set in motion.
#[derive(Debug, Default)]
pub struct TurnTriggers {
    /// False when the turn carried no excerpts.
    pub appended: bool,
    pub consolidation: Option<JoinHandle<PipelineOutcome>>,
    pub reflection: Option<JoinHandle<PipelineOutcome>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryStats {
    pub activation: ActivationStats,
    pub stm_entries: usize,
    pub stm_pending: usize,
    pub turns_since_consolidation: u32,
    pub turns_since_reflection: u32,
    pub datasets_known: usize,
    pub metrics: MetricsSnapshot,
}

pub struct MemoryService {
    backend: Arc<dyn KnowledgeBackend>,
    reasoner: Arc<dyn Reasoner>,
    config: MemoryConfig,
    index: RwLock<ActivationIndex>,
    stm: Mutex<StmBuffer>,
    registry: DatasetRegistry,
    saver: SaveQueue,
    consolidating: AtomicBool,
    reflecting: AtomicBool,
}

impl MemoryService {
    /// Start with empty state. Must be called inside a tokio runtime.
    pub fn new(
        backend: Arc<dyn KnowledgeBackend>,
        reasoner: Arc<dyn Reasoner>,
        config: MemoryConfig,
    ) -> MemoryResult<Self> {
        Self::with_state(backend, reasoner, config, ActivationIndex::new(), StmBuffer::new())
    }

    /// Start from the state files under `config.state_dir`. Missing files
    /// load as empty state.
    pub fn load(
        backend: Arc<dyn KnowledgeBackend>,
        reasoner: Arc<dyn Reasoner>,
        config: MemoryConfig,
    ) -> MemoryResult<Self> {
        let index = load_index(&config.index_path())?;
        let stm = load_stm(&config.stm_path())?;
        info!(
            state_dir = %config.state_dir.display(),
            memories = index.len(),
            stm_entries = stm.entries.len(),
            "memory state loaded"
        );
        Self::with_state(backend, reasoner, config, index, stm)
    }

    fn with_state(
        backend: Arc<dyn KnowledgeBackend>,
        reasoner: Arc<dyn Reasoner>,
        config: MemoryConfig,
        index: ActivationIndex,
        stm: StmBuffer,
    ) -> MemoryResult<Self> {
        config.validate()?;
        let registry = DatasetRegistry::with_datasets(config.datasets.clone());
        Ok(Self {
            backend,
            reasoner,
            config,
            index: RwLock::new(index),
            stm: Mutex::new(stm),
            registry,
            saver: SaveQueue::spawn(),
            consolidating: AtomicBool::new(false),
            reflecting: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    /// Read access to the activation index.
    pub async fn index(&self) -> tokio::sync::RwLockReadGuard<'_, ActivationIndex> {
        self.index.read().await
    }

    /// Read access to the STM buffer.
    pub async fn stm(&self) -> tokio::sync::MutexGuard<'_, StmBuffer> {
        self.stm.lock().await
    }

    async fn save_index(&self) {
        let index = self.index.read().await;
        self.saver.save(&self.config.index_path(), &*index);
    }

    async fn save_stm(&self) {
        let stm = self.stm.lock().await;
        self.saver.save(&self.config.stm_path(), &*stm);
    }

    fn pipeline_context<'a>(&'a self, scope: &'a ScopeContext) -> PipelineContext<'a> {
        PipelineContext {
            backend: self.backend.as_ref(),
            reasoner: self.reasoner.as_ref(),
            index: &self.index,
            stm: &self.stm,
            registry: &self.registry,
            config: &self.config,
            scope,
        }
    }

    /// Search every dataset `scope` may read and return ranked results.
    ///
    /// Fails with [`MemoryError::NoDatasetIndexed`] when none of those
    /// datasets has a backend id yet.
    #[instrument(
        skip(self, query),
        fields(user_id = %scope.user_id, tier = %scope.tier, group = scope.is_group_session)
    )]
    pub async fn recall(&self, scope: &ScopeContext, query: &str) -> MemoryResult<RoutedResults> {
        let started = Instant::now();
        let names = resolve_recall_datasets(scope);
        let datasets = self.registry.resolve(&names);
        if datasets.is_empty() {
            return Err(MemoryError::NoDatasetIndexed { datasets: names });
        }

        let request = RouteRequest {
            query,
            search_type: self.config.search_type,
            top_k: self.config.top_k,
            max_results: self.config.max_results,
            min_score: self.config.min_score,
            datasets: &datasets,
            search_timeout: self.config.search_timeout(),
            overall_timeout: Some(self.config.recall_timeout()),
        };
        let fan = fan_out(self.backend.as_ref(), &request).await;

        let now = Utc::now();
        let routed = {
            let index = self.index.read().await;
            let view = DecayView {
                index: &index,
                weights: &self.config.type_weights,
                decay_rate: self.config.decay_rate,
                now,
            };
            rank(fan, &request, scope, &view)
        };

        if !routed.results.is_empty() {
            let mut index = self.index.write().await;
            for hit in &routed.results {
                let detected = detect_memory_type(&hit.text, hit.metadata.as_ref());
                index.record_access(&hit.id, Some(detected), now);
                if let Some(entry) = index.get_mut(&hit.id) {
                    if entry.dataset_name.is_none() {
                        entry.dataset_name = hit.dataset_name.clone();
                    }
                }
            }
        }
        self.save_index().await;

        METRICS.inc_recalls();
        obs::emit_recall_completed(
            routed.datasets_queried,
            routed.total_before_filter,
            routed.results.len(),
            started.elapsed().as_millis() as u64,
        );
        Ok(routed)
    }

    /// Store `text` directly in the scope's write dataset. Returns the memory id.
    #[instrument(skip(self, text, opts), fields(user_id = %scope.user_id, tier = %scope.tier))]
    pub async fn remember(
        &self,
        scope: &ScopeContext,
        text: &str,
        opts: RememberOptions,
    ) -> MemoryResult<String> {
        let text = text.trim();
        let item = ParsedMemory {
            text: text.to_string(),
            memory_type: opts
                .memory_type
                .unwrap_or_else(|| detect_memory_type(text, None)),
            label: opts.label,
            pinned: opts.pinned,
            tags: opts.tags,
            confidence: None,
            supersedes: None,
        };
        let mut dataset_id = self.registry.id_for(&resolve_write_dataset(scope));
        let memory_id = store_one(
            self.backend.as_ref(),
            &self.index,
            &self.registry,
            scope,
            &item,
            None,
            &mut dataset_id,
        )
        .await?;
        METRICS.add_memories_stored(1);
        if self.config.cognify_after_write {
            if let Some(id) = &dataset_id {
                trigger_cognify(self.backend.as_ref(), id).await;
            }
        }
        self.save_index().await;
        Ok(memory_id)
    }

    /// Remove a memory locally and, best-effort, from the backend.
    pub async fn forget(&self, memory_id: &str) -> MemoryResult<()> {
        let entry = self.index.write().await.forget(memory_id)?;
        if let Some(dataset_id) = entry
            .dataset_name
            .as_deref()
            .and_then(|name| self.registry.id_for(name))
        {
            if let Err(e) = self.backend.delete(memory_id, &dataset_id).await {
                warn!(memory_id = %memory_id, error = %e, "backend delete failed during forget");
            }
        }
        self.save_index().await;
        Ok(())
    }

    pub async fn pin(&self, memory_id: &str, pinned: bool) -> MemoryResult<()> {
        self.index.write().await.set_pinned(memory_id, pinned)?;
        self.save_index().await;
        Ok(())
    }

    /// Record a finished turn and start any pipeline whose threshold it crossed.
    ///
    /// Pipelines run on spawned tasks so the next recall is never blocked.
    pub async fn on_turn_complete(
        self: &Arc<Self>,
        scope: &ScopeContext,
        session_key: Option<String>,
        user_excerpts: Vec<String>,
        assistant_excerpts: Vec<String>,
    ) -> TurnTriggers {
        let has_text = user_excerpts
            .iter()
            .chain(assistant_excerpts.iter())
            .any(|e| !e.trim().is_empty());
        if !has_text {
            debug!("turn carried no excerpts, ignoring");
            return TurnTriggers::default();
        }

        let (consolidate, reflect) = {
            let mut stm = self.stm.lock().await;
            stm.append(
                Some(scope.clone()),
                session_key,
                user_excerpts,
                assistant_excerpts,
                self.config.max_excerpt_chars,
                Utc::now(),
            );
            (
                stm.should_consolidate(self.config.consolidation_threshold),
                stm.should_reflect(self.config.reflection_threshold),
            )
        };
        self.save_stm().await;

        let mut triggers = TurnTriggers {
            appended: true,
            ..TurnTriggers::default()
        };
        if consolidate {
            let svc = Arc::clone(self);
            let scope = scope.clone();
            triggers.consolidation =
                Some(tokio::spawn(async move { svc.consolidate_now(&scope).await }));
        }
        if reflect {
            let svc = Arc::clone(self);
            let scope = scope.clone();
            triggers.reflection = Some(tokio::spawn(async move { svc.reflect_now(&scope).await }));
        }
        triggers
    }

    /// Run consolidation now. A second concurrent call returns
    /// [`PipelineOutcome::AlreadyRunning`].
    pub async fn consolidate_now(&self, scope: &ScopeContext) -> PipelineOutcome {
        let outcome = self
            .run_guarded(&self.consolidating, &ConsolidationSource, scope)
            .await;
        if self.config.auto_prune && matches!(outcome, PipelineOutcome::Completed(_)) {
            self.prune(None, false).await;
        }
        outcome
    }

    pub async fn reflect_now(&self, scope: &ScopeContext) -> PipelineOutcome {
        self.run_guarded(&self.reflecting, &ReflectionSource, scope)
            .await
    }

    async fn run_guarded(
        &self,
        flag: &AtomicBool,
        source: &dyn PipelineSource,
        scope: &ScopeContext,
    ) -> PipelineOutcome {
        let Some(_guard) = InFlightGuard::try_acquire(flag) else {
            debug!(pipeline = %source.kind(), "pipeline already running");
            return PipelineOutcome::AlreadyRunning;
        };
        let ctx = self.pipeline_context(scope);
        let outcome = run_pipeline(source, &ctx).await;
        if matches!(outcome, PipelineOutcome::Completed(_)) {
            self.save_stm().await;
            self.save_index().await;
        }
        outcome
    }

    /// Prune entries scoring below `threshold` (configured default when `None`).
    pub async fn prune(&self, threshold: Option<f64>, dry_run: bool) -> PruneReport {
        let mut policy = self.config.prune_policy();
        if let Some(t) = threshold {
            policy.threshold = t;
        }
        let report = prune_index(
            &self.index,
            self.backend.as_ref(),
            &self.registry,
            &policy,
            dry_run,
            Utc::now(),
        )
        .await;
        if report.removed > 0 {
            self.save_index().await;
        }
        report
    }

    pub async fn stats(&self) -> MemoryStats {
        let activation = self.index.read().await.stats(
            Utc::now(),
            &self.config.type_weights,
            self.config.decay_rate,
        );
        let stm = self.stm.lock().await;
        MemoryStats {
            activation,
            stm_entries: stm.entries.len(),
            stm_pending: stm.pending().count(),
            turns_since_consolidation: stm.turns_since_consolidation,
            turns_since_reflection: stm.turns_since_reflection,
            datasets_known: self.registry.len(),
            metrics: METRICS.snapshot(),
        }
    }

    /// Persist both state files and wait for every queued write.
    pub async fn flush(&self) {
        self.save_index().await;
        self.save_stm().await;
        self.saver.flush().await;
        METRICS.flush();
    }
}
