//! Recall: concurrent fan-out over resolved datasets, then merge, privacy
//! filtering and decay-aware re-ranking.

pub mod ranking;
pub mod router;

use async_trait::async_trait;
use mnemos_backend::{BackendResult, KnowledgeBackend, SearchHit, SearchType};
use serde::{Deserialize, Serialize};

use crate::memory::DecayTier;
use crate::scope::privacy::Sourced;
use crate::scope::ScopeTier;

pub use ranking::{combined_score, dedup_by_text, DecayLookup, DecayView, UNTRACKED_DECAY};
pub use router::{fan_out, rank, route_query, FanOut, RouteRequest, SearchFailure};

/// Single-dataset search, the only backend capability the router needs.
#[async_trait]
pub trait SearchExecutor: Send + Sync {
    async fn search_dataset(
        &self,
        query: &str,
        search_type: SearchType,
        dataset_id: &str,
        top_k: usize,
    ) -> BackendResult<Vec<SearchHit>>;
}

#[async_trait]
impl<B: KnowledgeBackend + ?Sized> SearchExecutor for B {
    async fn search_dataset(
        &self,
        query: &str,
        search_type: SearchType,
        dataset_id: &str,
        top_k: usize,
    ) -> BackendResult<Vec<SearchHit>> {
        self.search(query, search_type, &[dataset_id.to_string()], top_k)
            .await
    }
}

/// A ranked recall result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecallHit {
    pub id: String,
    pub text: String,
    /// Score as returned by the backend.
    pub score: f64,
    /// `score` weighted by the memory's decay score.
    pub combined_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_tier: Option<ScopeTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay_tier: Option<DecayTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Sourced for RecallHit {
    fn result_id(&self) -> &str {
        &self.id
    }

    fn source_dataset(&self) -> Option<&str> {
        self.dataset_name.as_deref()
    }
}

/// Output of one routed query.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedResults {
    pub results: Vec<RecallHit>,
    /// Datasets a search was issued against, failed ones included.
    pub datasets_queried: usize,
    /// Hits left after deduplication, before privacy and `min_score` filtering.
    pub total_before_filter: usize,
    /// Datasets whose search errored, timed out or was cancelled.
    pub failed_datasets: Vec<String>,
}
