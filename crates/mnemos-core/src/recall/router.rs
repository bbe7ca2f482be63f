//! Query router.
//!
//! One search per dataset, all in flight at once. Each search has its own
//! timeout and listens on a shared cancellation channel that fires when the
//! caller-level deadline passes; whatever finished by then is ranked. A failing
//! dataset only loses its own contribution.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::join_all;
use mnemos_backend::{BackendError, SearchHit, SearchType};
use tokio::sync::watch;
use tracing::{debug, instrument};

use super::ranking::{combined_score, decay_tier_of, dedup_by_text, DecayLookup};
use super::{RecallHit, RoutedResults, SearchExecutor};
use crate::metrics::METRICS;
use crate::obs;
use crate::scope::{classify_dataset, filter_results, ScopeContext};

/// Parameters of one routed query.
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    pub query: &'a str,
    pub search_type: SearchType,
    pub top_k: usize,
    pub max_results: usize,
    pub min_score: f64,
    /// `(dataset name, backend dataset id)` pairs to search.
    pub datasets: &'a [(String, String)],
    pub search_timeout: Duration,
    /// Caller-level deadline; cancels every search still running.
    pub overall_timeout: Option<Duration>,
}

/// Why a dataset contributed nothing.
#[derive(Debug, thiserror::Error)]
pub enum SearchFailure {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("search timed out after {0:?}")]
    TimedOut(Duration),

    #[error("search cancelled at caller deadline")]
    Cancelled,
}

/// Raw hits from a fan-out, tagged with the dataset each came from.
#[derive(Debug, Default)]
pub struct FanOut {
    pub hits: Vec<(String, SearchHit)>,
    pub datasets_queried: usize,
    pub failed_datasets: Vec<String>,
}

/// Search every dataset in `request` concurrently.
#[instrument(
    skip(executor, request),
    fields(datasets = request.datasets.len(), search_type = %request.search_type)
)]
pub async fn fan_out<E>(executor: &E, request: &RouteRequest<'_>) -> FanOut
where
    E: SearchExecutor + ?Sized,
{
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let searches = request.datasets.iter().map(|(name, dataset_id)| {
        let mut cancel = cancel_rx.clone();
        async move {
            let search = tokio::time::timeout(
                request.search_timeout,
                executor.search_dataset(
                    request.query,
                    request.search_type,
                    dataset_id,
                    request.top_k,
                ),
            );
            let outcome = tokio::select! {
                res = search => match res {
                    Ok(Ok(hits)) => Ok(hits),
                    Ok(Err(e)) => Err(SearchFailure::Backend(e)),
                    Err(_) => Err(SearchFailure::TimedOut(request.search_timeout)),
                },
                _ = cancel.wait_for(|cancelled| *cancelled) => Err(SearchFailure::Cancelled),
            };
            (name.as_str(), outcome)
        }
    });

    let all = join_all(searches);
    let outcomes = match request.overall_timeout {
        Some(deadline) => {
            tokio::pin!(all);
            tokio::select! {
                out = &mut all => out,
                _ = tokio::time::sleep(deadline) => {
                    debug!(?deadline, "recall deadline reached, cancelling in-flight searches");
                    let _ = cancel_tx.send(true);
                    all.await
                }
            }
        }
        None => all.await,
    };

    let mut fan = FanOut {
        datasets_queried: request.datasets.len(),
        ..FanOut::default()
    };
    for (name, outcome) in outcomes {
        match outcome {
            Ok(hits) => {
                debug!(dataset = %name, hits = hits.len(), "dataset search completed");
                fan.hits
                    .extend(hits.into_iter().map(|h| (name.to_string(), h)));
            }
            Err(err) => {
                obs::emit_dataset_search_failed(name, &err);
                METRICS.inc_dataset_search_failures();
                fan.failed_datasets.push(name.to_string());
            }
        }
    }
    fan
}

/// Merge, filter and re-rank a fan-out.
pub fn rank(
    fan: FanOut,
    request: &RouteRequest<'_>,
    scope: &ScopeContext,
    decay: &dyn DecayLookup,
) -> RoutedResults {
    let annotated: Vec<RecallHit> = fan
        .hits
        .into_iter()
        .map(|(searched, hit)| {
            let dataset = hit
                .annotated_dataset()
                .map(str::to_string)
                .unwrap_or(searched);
            let source = classify_dataset(&dataset, &scope.user_id);
            RecallHit {
                id: hit.id,
                text: hit.text,
                score: hit.score,
                combined_score: hit.score,
                dataset_name: Some(dataset),
                scope_tier: Some(source.tier),
                decay_tier: None,
                metadata: hit.metadata,
            }
        })
        .collect();

    let merged = dedup_by_text(annotated, |h| h.text.as_str(), |h| h.score);
    let total_before_filter = merged.len();

    let mut results: Vec<RecallHit> = filter_results(merged, scope, &HashMap::new())
        .into_iter()
        .filter(|h| h.score >= request.min_score)
        .map(|mut h| {
            let d = decay.decay_of(&h.id);
            h.combined_score = combined_score(h.score, d);
            h.decay_tier = decay_tier_of(d);
            h
        })
        .collect();

    results.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    results.truncate(request.max_results);

    RoutedResults {
        results,
        datasets_queried: fan.datasets_queried,
        total_before_filter,
        failed_datasets: fan.failed_datasets,
    }
}

/// Fan out, then rank.
pub async fn route_query<E>(
    executor: &E,
    request: &RouteRequest<'_>,
    scope: &ScopeContext,
    decay: &dyn DecayLookup,
) -> RoutedResults
where
    E: SearchExecutor + ?Sized,
{
    let fan = fan_out(executor, request).await;
    rank(fan, request, scope, decay)
}
