//! Shared fixtures for service-level tests.
#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mnemos_backend::fakes::MemoryKnowledgeBackend;
use mnemos_backend::{
    BackendError, BackendResult, CognifyStatus, KnowledgeBackend, SearchHit, SearchType,
    WriteReceipt,
};
use mnemos_core::fakes::ScriptedReasoner;
use mnemos_core::{MemoryConfig, MemoryService};

/// Config rooted in `dir` with thresholds high enough that nothing triggers
/// unless a test lowers them.
pub fn config(dir: &Path) -> MemoryConfig {
    MemoryConfig::default()
        .with_state_dir(dir)
        .with_thresholds(1_000, 1_000)
}

pub fn service(
    backend: Arc<dyn KnowledgeBackend>,
    reasoner: Arc<ScriptedReasoner>,
    config: MemoryConfig,
) -> Arc<MemoryService> {
    Arc::new(MemoryService::new(backend, reasoner, config).unwrap())
}

pub fn excerpts(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Wraps the in-memory backend to script `add` behaviour by call number
/// (1-based) and record the dataset id each `add` was given.
#[derive(Default)]
pub struct ScriptedWrites {
    pub inner: MemoryKnowledgeBackend,
    pub fail_add_at: Option<usize>,
    pub reassign_at: Option<(usize, String)>,
    pub(crate) adds: AtomicUsize,
    pub(crate) dataset_args: Mutex<Vec<Option<String>>>,
}

impl ScriptedWrites {
    pub fn dataset_args(&self) -> Vec<Option<String>> {
        self.dataset_args.lock().unwrap().clone()
    }
}

#[async_trait]
impl KnowledgeBackend for ScriptedWrites {
    async fn add(
        &self,
        data: &str,
        dataset_name: &str,
        dataset_id: Option<&str>,
    ) -> BackendResult<WriteReceipt> {
        let n = self.adds.fetch_add(1, Ordering::SeqCst) + 1;
        self.dataset_args
            .lock()
            .unwrap()
            .push(dataset_id.map(str::to_string));
        if self.fail_add_at == Some(n) {
            return Err(BackendError::Http {
                status: 500,
                body: "scripted failure".into(),
            });
        }
        let mut receipt = self.inner.add(data, dataset_name, dataset_id).await?;
        if let Some((at, id)) = &self.reassign_at {
            if *at == n {
                receipt.dataset_id = id.clone();
            }
        }
        Ok(receipt)
    }

    async fn update(
        &self,
        data_id: &str,
        dataset_id: &str,
        data: &str,
    ) -> BackendResult<WriteReceipt> {
        self.inner.update(data_id, dataset_id, data).await
    }

    async fn delete(&self, data_id: &str, dataset_id: &str) -> BackendResult<()> {
        self.inner.delete(data_id, dataset_id).await
    }

    async fn search(
        &self,
        query: &str,
        search_type: SearchType,
        dataset_ids: &[String],
        top_k: usize,
    ) -> BackendResult<Vec<SearchHit>> {
        self.inner.search(query, search_type, dataset_ids, top_k).await
    }

    async fn cognify(&self, dataset_ids: &[String]) -> BackendResult<CognifyStatus> {
        self.inner.cognify(dataset_ids).await
    }
}
