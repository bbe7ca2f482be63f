//! Knowledge backend trait definitions
//!
//! The backend owns the stored text and its vectors. Mnemos addresses it
//! only by dataset id and data id:
//! - `add` / `update` / `delete`: write path
//! - `search`: semantic retrieval over one or more datasets
//! - `cognify`: asynchronous re-indexing trigger
//!
//! The trait is async and transport-agnostic. An HTTP implementation lives in
//! [`crate::http`], an in-memory fake for tests in [`crate::fakes`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendResult;

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

/// Retrieval strategy requested from the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Raw text chunks ranked by similarity.
    #[default]
    Chunks,
    /// Pre-computed document summaries.
    Summaries,
    /// Answers synthesised over the knowledge graph.
    GraphCompletion,
    /// Retrieval-augmented completion over chunks.
    RagCompletion,
    /// Graph relationship insights.
    Insights,
}

impl SearchType {
    /// Wire name understood by the backend.
    pub fn as_wire(&self) -> &'static str {
        match self {
            Self::Chunks => "CHUNKS",
            Self::Summaries => "SUMMARIES",
            Self::GraphCompletion => "GRAPH_COMPLETION",
            Self::RagCompletion => "RAG_COMPLETION",
            Self::Insights => "INSIGHTS",
        }
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_wire())
    }
}

/// One normalized search match.
///
/// Every backend response shape is reduced to this before it leaves the
/// adapter (see [`crate::normalize`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl SearchHit {
    pub fn new(id: impl Into<String>, text: impl Into<String>, score: f64) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            score,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Dataset name the backend attached to this hit, if any.
    pub fn annotated_dataset(&self) -> Option<&str> {
        let meta = self.metadata.as_ref()?;
        meta.get("dataset_name")
            .or_else(|| meta.get("datasetName"))
            .and_then(|v| v.as_str())
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Outcome of an `add` or `update` call.
///
/// `dataset_id` may differ from the one supplied: the backend allocates a
/// dataset on first write to a new name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub dataset_id: String,
    pub dataset_name: String,
    pub data_id: Option<String>,
}

/// Outcome of a `cognify` trigger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CognifyStatus {
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// KnowledgeBackend
// ---------------------------------------------------------------------------

/// External semantic store.
///
/// Guarantees expected from implementations:
/// - every call completes or fails within the implementation's own timeout
/// - non-2xx responses surface as `BackendError::Http` with the status code
/// - `search` results are already normalized into [`SearchHit`]
#[async_trait]
pub trait KnowledgeBackend: Send + Sync {
    /// Store `data` in the named dataset, creating it when `dataset_id` is `None`.
    async fn add(
        &self,
        data: &str,
        dataset_name: &str,
        dataset_id: Option<&str>,
    ) -> BackendResult<WriteReceipt>;

    /// Replace the content of an existing data item.
    async fn update(&self, data_id: &str, dataset_id: &str, data: &str)
        -> BackendResult<WriteReceipt>;

    /// Remove a data item.
    async fn delete(&self, data_id: &str, dataset_id: &str) -> BackendResult<()>;

    /// Search the given datasets.
    async fn search(
        &self,
        query: &str,
        search_type: SearchType,
        dataset_ids: &[String],
        top_k: usize,
    ) -> BackendResult<Vec<SearchHit>>;

    /// Trigger asynchronous re-indexing of the given datasets.
    async fn cognify(&self, dataset_ids: &[String]) -> BackendResult<CognifyStatus>;
}
