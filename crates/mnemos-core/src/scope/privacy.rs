//! Post-retrieval privacy filter.
//!
//! Direct sessions pass through untouched: the resolver already excluded
//! anything they may not see. Group sessions keep a result only when its
//! source dataset is known and classifies as non-private.

use std::collections::HashMap;

use mnemos_backend::SearchHit;
use tracing::debug;

use super::resolver::classify_dataset;
use super::ScopeContext;

/// A retrieved result that may carry its source dataset.
pub trait Sourced {
    fn result_id(&self) -> &str;

    /// Dataset name attached to the result itself, if any.
    fn source_dataset(&self) -> Option<&str>;
}

impl Sourced for SearchHit {
    fn result_id(&self) -> &str {
        &self.id
    }

    fn source_dataset(&self) -> Option<&str> {
        self.annotated_dataset()
    }
}

/// Drop results the session may not see.
///
/// The result's own annotation wins over `id_to_dataset`; results with
/// neither are dropped in group sessions.
pub fn filter_results<T: Sourced>(
    results: Vec<T>,
    scope: &ScopeContext,
    id_to_dataset: &HashMap<String, String>,
) -> Vec<T> {
    if !scope.is_group_session {
        return results;
    }
    let before = results.len();
    let kept: Vec<T> = results
        .into_iter()
        .filter(|r| {
            let dataset = r
                .source_dataset()
                .or_else(|| id_to_dataset.get(r.result_id()).map(String::as_str));
            match dataset {
                Some(name) => !classify_dataset(name, &scope.user_id).is_private,
                None => false,
            }
        })
        .collect();
    if kept.len() < before {
        debug!(
            dropped = before - kept.len(),
            user_id = %scope.user_id,
            "privacy filter dropped results in group session"
        );
    }
    kept
}
