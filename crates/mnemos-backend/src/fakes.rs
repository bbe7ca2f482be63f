//! In-memory fake knowledge backend (testing only)
//!
//! `MemoryKnowledgeBackend` satisfies the [`KnowledgeBackend`] contract without
//! any network: datasets live in a `HashMap`, search scores by token overlap,
//! and failures or latency can be injected per dataset.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::backend_traits::{CognifyStatus, KnowledgeBackend, SearchHit, SearchType, WriteReceipt};
use crate::error::{BackendError, BackendResult};

#[derive(Debug, Default)]
struct FakeDataset {
    name: String,
    items: Vec<(String, String)>,
    canned: Vec<SearchHit>,
}

#[derive(Debug, Default)]
struct FakeState {
    datasets: HashMap<String, FakeDataset>,
    failing_searches: HashSet<String>,
    failing_writes: HashSet<String>,
    fail_deletes: bool,
    search_delays: HashMap<String, Duration>,
    next_id: u64,
    add_calls: usize,
    delete_calls: usize,
    search_calls: usize,
    cognify_calls: Vec<Vec<String>>,
}

impl FakeState {
    fn allocate(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }
}

/// In-memory backend keyed by dataset id.
#[derive(Debug, Default)]
pub struct MemoryKnowledgeBackend {
    state: Mutex<FakeState>,
}

impl MemoryKnowledgeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create an empty dataset with a fixed id.
    pub fn create_dataset(&self, name: &str, id: &str) {
        self.lock().datasets.insert(
            id.to_string(),
            FakeDataset {
                name: name.to_string(),
                ..FakeDataset::default()
            },
        );
    }

    /// Return these hits verbatim (before stored items) for searches on `dataset_id`.
    pub fn seed_hits(&self, dataset_id: &str, hits: Vec<SearchHit>) {
        self.lock()
            .datasets
            .entry(dataset_id.to_string())
            .or_default()
            .canned
            .extend(hits);
    }

    /// Make every search touching `dataset_id` fail with HTTP 500.
    pub fn fail_searches_for(&self, dataset_id: &str) {
        self.lock().failing_searches.insert(dataset_id.to_string());
    }

    /// Make `add` fail for the named dataset.
    pub fn fail_writes_for(&self, dataset_name: &str) {
        self.lock().failing_writes.insert(dataset_name.to_string());
    }

    /// Make every `delete` fail.
    pub fn fail_deletes(&self) {
        self.lock().fail_deletes = true;
    }

    /// Delay searches on `dataset_id` by `delay`.
    pub fn delay_searches_for(&self, dataset_id: &str, delay: Duration) {
        self.lock()
            .search_delays
            .insert(dataset_id.to_string(), delay);
    }

    /// Texts stored in a dataset, in insertion order.
    pub fn stored_texts(&self, dataset_id: &str) -> Vec<String> {
        self.lock()
            .datasets
            .get(dataset_id)
            .map(|d| d.items.iter().map(|(_, t)| t.clone()).collect())
            .unwrap_or_default()
    }

    /// Dataset id currently registered under `name`.
    pub fn dataset_id_for(&self, name: &str) -> Option<String> {
        self.lock()
            .datasets
            .iter()
            .find(|(_, d)| d.name == name)
            .map(|(id, _)| id.clone())
    }

    pub fn contains_data(&self, data_id: &str) -> bool {
        self.lock()
            .datasets
            .values()
            .any(|d| d.items.iter().any(|(id, _)| id == data_id))
    }

    pub fn add_calls(&self) -> usize {
        self.lock().add_calls
    }

    pub fn delete_calls(&self) -> usize {
        self.lock().delete_calls
    }

    pub fn search_calls(&self) -> usize {
        self.lock().search_calls
    }

    /// Dataset id lists passed to each `cognify` call.
    pub fn cognify_calls(&self) -> Vec<Vec<String>> {
        self.lock().cognify_calls.clone()
    }
}

/// Fraction of query tokens present in `text`.
fn overlap_score(query: &str, text: &str) -> f64 {
    let text_lower = text.to_lowercase();
    let tokens: Vec<String> = query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect();
    if tokens.is_empty() {
        return 0.0;
    }
    let matched = tokens.iter().filter(|t| text_lower.contains(t.as_str())).count();
    matched as f64 / tokens.len() as f64
}

#[async_trait]
impl KnowledgeBackend for MemoryKnowledgeBackend {
    async fn add(
        &self,
        data: &str,
        dataset_name: &str,
        dataset_id: Option<&str>,
    ) -> BackendResult<WriteReceipt> {
        let mut state = self.lock();
        state.add_calls += 1;
        if state.failing_writes.contains(dataset_name) {
            return Err(BackendError::Http {
                status: 500,
                body: format!("write to {dataset_name} rejected"),
            });
        }

        let existing = match dataset_id {
            Some(id) if state.datasets.contains_key(id) => Some(id.to_string()),
            Some(_) => None,
            None => state
                .datasets
                .iter()
                .find(|(_, d)| d.name == dataset_name)
                .map(|(id, _)| id.clone()),
        };
        let id = match existing {
            Some(id) => id,
            None => {
                let id = dataset_id
                    .map(str::to_string)
                    .unwrap_or_else(|| state.allocate("ds"));
                state.datasets.insert(
                    id.clone(),
                    FakeDataset {
                        name: dataset_name.to_string(),
                        ..FakeDataset::default()
                    },
                );
                id
            }
        };

        let data_id = state.allocate("data");
        if let Some(ds) = state.datasets.get_mut(&id) {
            ds.items.push((data_id.clone(), data.to_string()));
        }

        Ok(WriteReceipt {
            dataset_id: id,
            dataset_name: dataset_name.to_string(),
            data_id: Some(data_id),
        })
    }

    async fn update(
        &self,
        data_id: &str,
        dataset_id: &str,
        data: &str,
    ) -> BackendResult<WriteReceipt> {
        let mut state = self.lock();
        let ds = state
            .datasets
            .get_mut(dataset_id)
            .ok_or_else(|| BackendError::Http {
                status: 404,
                body: format!("dataset {dataset_id} not found"),
            })?;
        let item = ds
            .items
            .iter_mut()
            .find(|(id, _)| id == data_id)
            .ok_or_else(|| BackendError::Http {
                status: 404,
                body: format!("data {data_id} not found"),
            })?;
        item.1 = data.to_string();
        Ok(WriteReceipt {
            dataset_id: dataset_id.to_string(),
            dataset_name: ds.name.clone(),
            data_id: Some(data_id.to_string()),
        })
    }

    async fn delete(&self, data_id: &str, dataset_id: &str) -> BackendResult<()> {
        let mut state = self.lock();
        state.delete_calls += 1;
        if state.fail_deletes {
            return Err(BackendError::Http {
                status: 500,
                body: "delete rejected".into(),
            });
        }
        if let Some(ds) = state.datasets.get_mut(dataset_id) {
            ds.items.retain(|(id, _)| id != data_id);
        }
        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        _search_type: SearchType,
        dataset_ids: &[String],
        top_k: usize,
    ) -> BackendResult<Vec<SearchHit>> {
        let delay = {
            let mut state = self.lock();
            state.search_calls += 1;
            if let Some(id) = dataset_ids.iter().find(|id| state.failing_searches.contains(*id)) {
                return Err(BackendError::Http {
                    status: 500,
                    body: format!("search on {id} failed"),
                });
            }
            dataset_ids
                .iter()
                .filter_map(|id| state.search_delays.get(id))
                .max()
                .copied()
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.lock();
        let mut hits = Vec::new();
        for id in dataset_ids {
            let Some(ds) = state.datasets.get(id) else {
                continue;
            };
            hits.extend(ds.canned.iter().cloned());
            for (data_id, text) in &ds.items {
                let score = overlap_score(query, text);
                if score > 0.0 {
                    hits.push(SearchHit::new(data_id.clone(), text.clone(), score));
                }
            }
        }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn cognify(&self, dataset_ids: &[String]) -> BackendResult<CognifyStatus> {
        self.lock().cognify_calls.push(dataset_ids.to_vec());
        Ok(CognifyStatus {
            status: Some("started".into()),
        })
    }
}
