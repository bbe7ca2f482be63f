//! Concurrent fan-out, failure isolation and ranking.

use std::collections::HashMap;
use std::time::Duration;

use mnemos_backend::fakes::MemoryKnowledgeBackend;
use mnemos_core::{route_query, RouteRequest, ScopeContext, SearchHit, SearchType};
use serde_json::json;

fn datasets(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs
        .iter()
        .map(|(n, id)| (n.to_string(), id.to_string()))
        .collect()
}

fn request<'a>(datasets: &'a [(String, String)]) -> RouteRequest<'a> {
    RouteRequest {
        query: "release process",
        search_type: SearchType::Chunks,
        top_k: 10,
        max_results: 10,
        min_score: 0.0,
        datasets,
        search_timeout: Duration::from_secs(10),
        overall_timeout: None,
    }
}

fn no_decay() -> HashMap<String, f64> {
    HashMap::new()
}

/// Two datasets, one shared text, three distinct texts overall.
fn seeded() -> MemoryKnowledgeBackend {
    let backend = MemoryKnowledgeBackend::new();
    backend.seed_hits(
        "ds-profile",
        vec![
            SearchHit::new("p1", "tag releases from main", 0.4),
            SearchHit::new("p2", "release notes live in CHANGELOG.md", 0.7),
        ],
    );
    backend.seed_hits(
        "ds-team",
        vec![
            SearchHit::new("t1", "tag releases from main", 0.9),
            SearchHit::new("t2", "release freeze starts on thursdays", 0.2),
        ],
    );
    backend
}

#[tokio::test]
async fn duplicates_keep_the_higher_scoring_hit() {
    let backend = seeded();
    let ds = datasets(&[("alice-profile", "ds-profile"), ("team-shared", "ds-team")]);
    let out = route_query(&backend, &request(&ds), &ScopeContext::team("alice"), &no_decay()).await;

    assert_eq!(out.datasets_queried, 2);
    assert_eq!(out.total_before_filter, 3);
    let tagged: Vec<_> = out
        .results
        .iter()
        .filter(|h| h.text == "tag releases from main")
        .collect();
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].id, "t1");
    assert_eq!(tagged[0].dataset_name.as_deref(), Some("team-shared"));
    assert!((tagged[0].score - 0.9).abs() < 1e-9);
}

#[tokio::test]
async fn failing_dataset_is_isolated() {
    let backend = seeded();
    backend.fail_searches_for("ds-profile");
    let ds = datasets(&[("alice-profile", "ds-profile"), ("team-shared", "ds-team")]);
    let out = route_query(&backend, &request(&ds), &ScopeContext::team("alice"), &no_decay()).await;

    assert_eq!(out.datasets_queried, 2);
    assert_eq!(out.failed_datasets, vec!["alice-profile"]);
    let ids: Vec<&str> = out.results.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["t1", "t2"]);
}

#[tokio::test]
async fn min_score_filters_after_counting() {
    let backend = seeded();
    let ds = datasets(&[("alice-profile", "ds-profile"), ("team-shared", "ds-team")]);
    let mut req = request(&ds);
    req.min_score = 0.5;
    let out = route_query(&backend, &req, &ScopeContext::team("alice"), &no_decay()).await;

    assert_eq!(out.total_before_filter, 3);
    assert_eq!(out.results.len(), 2);
    assert!(out.results.iter().all(|h| h.score >= 0.5));
}

#[tokio::test]
async fn max_results_caps_output() {
    let backend = seeded();
    let ds = datasets(&[("alice-profile", "ds-profile"), ("team-shared", "ds-team")]);
    let mut req = request(&ds);
    req.max_results = 2;
    let out = route_query(&backend, &req, &ScopeContext::team("alice"), &no_decay()).await;

    assert_eq!(out.results.len(), 2);
    assert_eq!(out.results[0].id, "t1");
    assert_eq!(out.results[1].id, "p2");
}

#[tokio::test]
async fn decay_reranks_equal_raw_scores() {
    let backend = MemoryKnowledgeBackend::new();
    backend.seed_hits(
        "ds-team",
        vec![
            SearchHit::new("stale", "old release checklist", 0.8),
            SearchHit::new("fresh", "current release checklist", 0.8),
            SearchHit::new("unknown", "someone else's release checklist", 0.8),
        ],
    );
    let ds = datasets(&[("team-shared", "ds-team")]);
    let mut decay = HashMap::new();
    decay.insert("stale".to_string(), 0.01);
    decay.insert("fresh".to_string(), 3.0);

    let out = route_query(&backend, &request(&ds), &ScopeContext::team("alice"), &decay).await;
    let ids: Vec<&str> = out.results.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["fresh", "unknown", "stale"]);
    assert!((out.results[0].combined_score - 0.8).abs() < 1e-9);
    assert!((out.results[1].combined_score - 0.64).abs() < 1e-9);
}

#[tokio::test]
async fn group_session_drops_private_hits() {
    let backend = MemoryKnowledgeBackend::new();
    backend.seed_hits(
        "ds-team",
        vec![
            SearchHit::new("leak", "alice's release password hint", 0.9)
                .with_metadata(json!({ "dataset_name": "alice-private" })),
            SearchHit::new("ok", "release runbook", 0.6),
        ],
    );
    let ds = datasets(&[("team-shared", "ds-team")]);
    let out = route_query(
        &backend,
        &request(&ds),
        &ScopeContext::team("alice").in_group(),
        &no_decay(),
    )
    .await;

    let ids: Vec<&str> = out.results.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["ok"]);
    assert_eq!(out.total_before_filter, 2);
}

#[tokio::test(start_paused = true)]
async fn slow_dataset_times_out_alone() {
    let backend = seeded();
    backend.delay_searches_for("ds-profile", Duration::from_secs(5));
    let ds = datasets(&[("alice-profile", "ds-profile"), ("team-shared", "ds-team")]);
    let mut req = request(&ds);
    req.search_timeout = Duration::from_secs(1);

    let out = route_query(&backend, &req, &ScopeContext::team("alice"), &no_decay()).await;
    assert_eq!(out.failed_datasets, vec!["alice-profile"]);
    assert_eq!(out.results.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn overall_deadline_returns_partial_results() {
    let backend = seeded();
    backend.delay_searches_for("ds-profile", Duration::from_secs(30));
    let ds = datasets(&[("alice-profile", "ds-profile"), ("team-shared", "ds-team")]);
    let mut req = request(&ds);
    req.search_timeout = Duration::from_secs(60);
    req.overall_timeout = Some(Duration::from_secs(2));

    let started = tokio::time::Instant::now();
    let out = route_query(&backend, &req, &ScopeContext::team("alice"), &no_decay()).await;
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(out.failed_datasets, vec!["alice-profile"]);
    assert_eq!(out.results.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn searches_run_concurrently() {
    let backend = seeded();
    backend.delay_searches_for("ds-profile", Duration::from_secs(3));
    backend.delay_searches_for("ds-team", Duration::from_secs(3));
    let ds = datasets(&[("alice-profile", "ds-profile"), ("team-shared", "ds-team")]);

    let started = tokio::time::Instant::now();
    let out = route_query(&backend, &request(&ds), &ScopeContext::team("alice"), &no_decay()).await;
    assert!(started.elapsed() < Duration::from_secs(6));
    assert!(out.failed_datasets.is_empty());
    assert_eq!(backend.search_calls(), 2);
}
