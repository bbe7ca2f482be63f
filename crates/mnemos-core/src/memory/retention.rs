//! Decay-driven pruning of the activation index and the backend.

use chrono::{DateTime, Duration, Utc};
use mnemos_backend::KnowledgeBackend;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use super::activation::ActivationIndex;
use super::decay::{TypeWeights, DEFAULT_DECAY_RATE};
use crate::datasets::DatasetRegistry;
use crate::metrics::METRICS;
use crate::obs;

/// Entries scoring below `threshold` are eligible for removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrunePolicy {
    pub threshold: f64,
    pub decay_rate: f64,
    pub type_weights: TypeWeights,
    /// Entries created less than this many days ago are kept. A freshly
    /// registered memory has zero accesses and therefore scores zero.
    pub min_age_days: i64,
}

impl Default for PrunePolicy {
    fn default() -> Self {
        Self {
            threshold: 0.05,
            decay_rate: DEFAULT_DECAY_RATE,
            type_weights: TypeWeights::default(),
            min_age_days: 1,
        }
    }
}

/// Outcome of a prune pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneReport {
    /// Ids that scored below the threshold.
    pub candidates: Vec<String>,
    /// Entries removed from the index.
    pub removed: usize,
    /// Backend deletes that failed. The local entry is removed regardless.
    pub backend_failures: usize,
    pub remaining: usize,
    pub dry_run: bool,
}

/// Eligible `(id, dataset_name)` pairs: below threshold and past the grace period.
fn select_candidates(
    idx: &ActivationIndex,
    policy: &PrunePolicy,
    now: DateTime<Utc>,
) -> Vec<(String, Option<String>)> {
    let grace_cutoff = now - Duration::days(policy.min_age_days);
    idx.identify_prune_candidates(
        policy.threshold,
        now,
        &policy.type_weights,
        policy.decay_rate,
    )
    .into_iter()
    .filter_map(|id| {
        let entry = idx.get(&id)?;
        (entry.created_at <= grace_cutoff).then(|| (id.clone(), entry.dataset_name.clone()))
    })
    .collect()
}

/// Prune low-scoring entries.
///
/// Selection and removal happen under one write lock. Backend deletion is
/// best-effort, runs afterwards without the lock, and only covers entries that
/// were actually removed.
#[instrument(skip(index, backend, registry, policy), fields(threshold = policy.threshold))]
pub async fn prune_index(
    index: &RwLock<ActivationIndex>,
    backend: &dyn KnowledgeBackend,
    registry: &DatasetRegistry,
    policy: &PrunePolicy,
    dry_run: bool,
    now: DateTime<Utc>,
) -> PruneReport {
    if dry_run {
        let idx = index.read().await;
        let ids: Vec<String> = select_candidates(&idx, policy, now)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        obs::emit_prune_finished(ids.len(), 0, 0, true);
        return PruneReport {
            candidates: ids,
            remaining: idx.len(),
            dry_run: true,
            ..PruneReport::default()
        };
    }

    let (removed, remaining) = {
        let mut idx = index.write().await;
        let removed: Vec<(String, Option<String>)> = select_candidates(&idx, policy, now)
            .into_iter()
            .filter(|(id, _)| idx.forget(id).is_ok())
            .collect();
        (removed, idx.len())
    };
    let ids: Vec<String> = removed.iter().map(|(id, _)| id.clone()).collect();

    let mut backend_failures = 0;
    for (id, dataset) in &removed {
        let Some(dataset_id) = dataset.as_deref().and_then(|name| registry.id_for(name)) else {
            debug!(memory_id = %id, "no dataset id known, removed locally only");
            continue;
        };
        if let Err(e) = backend.delete(id, &dataset_id).await {
            warn!(memory_id = %id, dataset_id = %dataset_id, error = %e, "backend delete failed");
            backend_failures += 1;
        }
    }

    METRICS.add_entries_pruned(ids.len() as u64);
    obs::emit_prune_finished(ids.len(), ids.len(), backend_failures, false);

    PruneReport {
        removed: ids.len(),
        candidates: ids,
        backend_failures,
        remaining,
        dry_run: false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::memory::{MemoryType, RegisterOptions};
    use async_trait::async_trait;
    use mnemos_backend::fakes::MemoryKnowledgeBackend;
    use mnemos_backend::{
        BackendError, BackendResult, CognifyStatus, SearchHit, SearchType, WriteReceipt,
    };

    type Seeded = (
        RwLock<ActivationIndex>,
        MemoryKnowledgeBackend,
        DatasetRegistry,
        String,
    );

    async fn seeded() -> Seeded {
        let backend = MemoryKnowledgeBackend::new();
        let receipt = backend.add("old fact", "u-private", None).await.unwrap();
        let registry = DatasetRegistry::new();
        registry.record_receipt(&receipt);
        let data_id = receipt.data_id.unwrap();

        let mut idx = ActivationIndex::new();
        let long_ago = Utc::now() - Duration::days(200);
        idx.register_memory(
            &data_id,
            MemoryType::Semantic,
            RegisterOptions::default().with_dataset("u-private"),
            long_ago,
        );
        idx.register_memory("vault", MemoryType::Vault, RegisterOptions::default(), long_ago);
        idx.record_access("fresh", None, Utc::now());
        (RwLock::new(idx), backend, registry, data_id)
    }

    async fn prune(seeded: &Seeded, dry_run: bool) -> PruneReport {
        let (index, backend, registry, _) = seeded;
        let policy = PrunePolicy::default();
        prune_index(index, backend, registry, &policy, dry_run, Utc::now()).await
    }

    #[tokio::test]
    async fn test_prune_removes_from_backend_and_index() {
        let s = seeded().await;
        let report = prune(&s, false).await;
        let (index, backend, _, data_id) = &s;
        assert_eq!(report.candidates, vec![data_id.clone()]);
        assert_eq!(report.removed, 1);
        assert_eq!(report.remaining, 2);
        assert!(!backend.contains_data(data_id));
        assert!(index.read().await.contains("vault"));
    }

    #[tokio::test]
    async fn test_dry_run_touches_nothing() {
        let s = seeded().await;
        let report = prune(&s, true).await;
        let (index, backend, _, data_id) = &s;
        assert!(report.dry_run);
        assert_eq!(report.removed, 0);
        assert_eq!(report.candidates.len(), 1);
        assert!(backend.contains_data(data_id));
        assert_eq!(index.read().await.len(), 3);
        assert_eq!(backend.delete_calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_does_not_block_local_cleanup() {
        let s = seeded().await;
        s.1.fail_deletes();
        let report = prune(&s, false).await;
        assert_eq!(report.backend_failures, 1);
        assert_eq!(report.removed, 1);
        assert!(!s.0.read().await.contains(&s.3));
    }

    #[tokio::test]
    async fn test_recent_registrations_survive_grace_period() {
        let index = RwLock::new(ActivationIndex::new());
        index.write().await.register_memory(
            "new",
            MemoryType::Episodic,
            RegisterOptions::default(),
            Utc::now(),
        );
        let backend = MemoryKnowledgeBackend::new();
        let report = prune_index(
            &index,
            &backend,
            &DatasetRegistry::new(),
            &PrunePolicy::default(),
            false,
            Utc::now(),
        )
        .await;
        assert!(report.candidates.is_empty());
        assert_eq!(report.remaining, 1);
    }

    /// Records, for each delete, whether the id was still in the index.
    struct IndexWatchingBackend {
        index: Arc<RwLock<ActivationIndex>>,
        still_indexed: Mutex<Vec<bool>>,
    }

    #[async_trait]
    impl KnowledgeBackend for IndexWatchingBackend {
        async fn add(
            &self,
            _data: &str,
            _dataset_name: &str,
            _dataset_id: Option<&str>,
        ) -> BackendResult<WriteReceipt> {
            Err(BackendError::Transport("add not expected".into()))
        }

        async fn update(
            &self,
            _data_id: &str,
            _dataset_id: &str,
            _data: &str,
        ) -> BackendResult<WriteReceipt> {
            Err(BackendError::Transport("update not expected".into()))
        }

        async fn delete(&self, data_id: &str, _dataset_id: &str) -> BackendResult<()> {
            let indexed = match self.index.try_read() {
                Ok(idx) => idx.contains(data_id),
                Err(_) => true,
            };
            self.still_indexed.lock().unwrap().push(indexed);
            Ok(())
        }

        async fn search(
            &self,
            _query: &str,
            _search_type: SearchType,
            _dataset_ids: &[String],
            _top_k: usize,
        ) -> BackendResult<Vec<SearchHit>> {
            Ok(Vec::new())
        }

        async fn cognify(&self, _dataset_ids: &[String]) -> BackendResult<CognifyStatus> {
            Ok(CognifyStatus { status: None })
        }
    }

    #[tokio::test]
    async fn test_backend_deletes_follow_local_removal() {
        let long_ago = Utc::now() - Duration::days(200);
        let mut idx = ActivationIndex::new();
        for id in ["cold-1", "cold-2"] {
            idx.register_memory(
                id,
                MemoryType::Episodic,
                RegisterOptions::default().with_dataset("u-private"),
                long_ago,
            );
        }
        let index = Arc::new(RwLock::new(idx));
        let backend = IndexWatchingBackend {
            index: Arc::clone(&index),
            still_indexed: Mutex::new(Vec::new()),
        };
        let registry = DatasetRegistry::with_datasets([("u-private", "ds-1")]);

        let report = prune_index(
            &index,
            &backend,
            &registry,
            &PrunePolicy::default(),
            false,
            Utc::now(),
        )
        .await;

        assert_eq!(report.removed, 2);
        assert_eq!(*backend.still_indexed.lock().unwrap(), vec![false, false]);
    }
}
