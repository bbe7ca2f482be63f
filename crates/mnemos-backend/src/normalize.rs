//! Boundary normalization of backend payloads.
//!
//! Backend responses are heterogeneous: bare arrays, wrapper objects,
//! per-dataset envelopes, hit objects with differently named fields, or plain
//! strings from completion-style search types. Everything is reduced here to
//! [`SearchHit`] / [`WriteReceipt`]; raw shapes never leave this module.
//!
//! The unwrap is total (every JSON value maps to zero or more hits) and
//! bounded by [`MAX_UNWRAP_DEPTH`].

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::backend_traits::{SearchHit, WriteReceipt};
use crate::error::{BackendError, BackendResult};

/// Maximum nesting depth followed when unwrapping a search response.
pub const MAX_UNWRAP_DEPTH: usize = 4;

const WRAPPER_KEYS: &[&str] = &["results", "data", "search_result", "items", "chunks", "payload"];
const TEXT_KEYS: &[&str] = &["text", "content", "chunk_text", "summary", "answer"];
const ID_KEYS: &[&str] = &["id", "chunk_id", "data_id", "uuid"];
const SCORE_KEYS: &[&str] = &["score", "similarity", "relevance_score", "relevance"];
const DATASET_KEYS: &[&str] = &["dataset_name", "datasetName", "dataset_id", "datasetId"];

#[derive(Debug)]
struct RawHit {
    id: Option<String>,
    text: String,
    score: Option<f64>,
    metadata: Option<Value>,
}

/// Reduce any search response body to a flat list of hits, preserving backend order.
///
/// Hits without an id get a digest of their text; hits without a usable score
/// get `max(0.1, 1 - 0.05 * position)` so backend ordering survives re-ranking.
pub fn normalize_search_response(value: &Value) -> Vec<SearchHit> {
    let mut raw = Vec::new();
    collect_hits(value, 0, &mut raw);

    raw.into_iter()
        .enumerate()
        .map(|(position, hit)| SearchHit {
            id: hit.id.unwrap_or_else(|| text_digest(&hit.text)),
            score: hit
                .score
                .filter(|s| s.is_finite())
                .unwrap_or_else(|| positional_score(position)),
            text: hit.text,
            metadata: hit.metadata,
        })
        .collect()
}

/// Fallback score for the hit at `position` when the backend gave none.
pub fn positional_score(position: usize) -> f64 {
    (1.0 - 0.05 * position as f64).max(0.1)
}

/// Stable id for text the backend returned without one.
pub fn text_digest(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hex = hex::encode(hasher.finalize());
    format!("sha256:{}", &hex[..16])
}

fn collect_hits(value: &Value, depth: usize, out: &mut Vec<RawHit>) {
    if depth > MAX_UNWRAP_DEPTH {
        return;
    }
    match value {
        Value::String(s) => {
            if !s.trim().is_empty() {
                out.push(RawHit {
                    id: None,
                    text: s.clone(),
                    score: None,
                    metadata: None,
                });
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_hits(item, depth + 1, out);
            }
        }
        Value::Object(map) => {
            if let Some(hit) = hit_from_object(map) {
                out.push(hit);
                return;
            }
            for key in WRAPPER_KEYS {
                if let Some(inner) = map.get(*key) {
                    collect_hits(inner, depth + 1, out);
                    return;
                }
            }
        }
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
}

fn hit_from_object(map: &Map<String, Value>) -> Option<RawHit> {
    let text = TEXT_KEYS
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .filter(|t| !t.trim().is_empty())?;

    let id = ID_KEYS.iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    let score = SCORE_KEYS.iter().find_map(|k| match map.get(*k) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.parse::<f64>().ok(),
        _ => None,
    });

    Some(RawHit {
        id,
        text: text.to_string(),
        score,
        metadata: hit_metadata(map),
    })
}

/// Nested `metadata` object plus any top-level dataset annotation.
fn hit_metadata(map: &Map<String, Value>) -> Option<Value> {
    let mut meta = match map.get("metadata") {
        Some(Value::Object(m)) => m.clone(),
        _ => Map::new(),
    };
    for key in DATASET_KEYS {
        if let Some(v) = map.get(*key) {
            meta.entry((*key).to_string()).or_insert_with(|| v.clone());
        }
    }
    if meta.is_empty() {
        None
    } else {
        Some(Value::Object(meta))
    }
}

/// Reduce an `add`/`update` response body to a [`WriteReceipt`].
///
/// Missing fields fall back to the values the caller sent. A receipt with no
/// dataset id from either side is a decode error.
pub fn normalize_write_receipt(
    value: &Value,
    requested_name: &str,
    requested_id: Option<&str>,
) -> BackendResult<WriteReceipt> {
    let ingestion = value
        .get("data_ingestion_info")
        .and_then(Value::as_array)
        .and_then(|items| items.first());

    let lookup = |keys: &[&str]| -> Option<String> {
        keys.iter().find_map(|k| {
            value
                .get(*k)
                .or_else(|| ingestion.and_then(|i| i.get(*k)))
                .and_then(|v| match v {
                    Value::String(s) if !s.is_empty() => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
        })
    };

    let dataset_id = lookup(&["datasetId", "dataset_id"])
        .or_else(|| requested_id.map(str::to_string))
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            BackendError::Decode(format!(
                "write response for {requested_name} carried no dataset id"
            ))
        })?;

    Ok(WriteReceipt {
        dataset_id,
        dataset_name: lookup(&["datasetName", "dataset_name"])
            .unwrap_or_else(|| requested_name.to_string()),
        data_id: lookup(&["dataId", "data_id"]),
    })
}
