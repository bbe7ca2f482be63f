//! Deduplication and decay-aware re-ranking of merged hits.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::memory::{classify_tier, decay_score, ActivationIndex, DecayTier, TypeWeights};

/// Decay score assumed for ids the activation index does not track.
pub const UNTRACKED_DECAY: f64 = 0.5;

/// Source of decay scores for re-ranking.
pub trait DecayLookup: Sync {
    /// Decay score of a tracked memory, `None` when untracked.
    fn decay_of(&self, memory_id: &str) -> Option<f64>;
}

/// Borrowed view of an index frozen at one instant.
pub struct DecayView<'a> {
    pub index: &'a ActivationIndex,
    pub weights: &'a TypeWeights,
    pub decay_rate: f64,
    pub now: DateTime<Utc>,
}

impl DecayLookup for DecayView<'_> {
    fn decay_of(&self, memory_id: &str) -> Option<f64> {
        self.index
            .get(memory_id)
            .map(|e| decay_score(e, self.now, self.weights, self.decay_rate))
    }
}

impl DecayLookup for HashMap<String, f64> {
    fn decay_of(&self, memory_id: &str) -> Option<f64> {
        self.get(memory_id).copied()
    }
}

/// `raw × (0.6 + 0.4 × min(decay, 1))`.
pub fn combined_score(raw: f64, decay: Option<f64>) -> f64 {
    let decay = decay.unwrap_or(UNTRACKED_DECAY);
    let weight = if decay.is_nan() { 1.0 } else { decay.min(1.0) };
    raw * (0.6 + 0.4 * weight)
}

/// Tier of a tracked memory.
pub fn decay_tier_of(decay: Option<f64>) -> Option<DecayTier> {
    decay.map(classify_tier)
}

/// Collapse items with identical text, keeping the higher-scoring one in the
/// position of the first occurrence.
pub fn dedup_by_text<T>(
    items: Vec<T>,
    text: impl Fn(&T) -> &str,
    score: impl Fn(&T) -> f64,
) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    let mut seen: HashMap<String, usize> = HashMap::new();
    for item in items {
        let existing = seen.get(text(&item)).copied();
        match existing {
            Some(pos) => {
                if score(&item) > score(&out[pos]) {
                    out[pos] = item;
                }
            }
            None => {
                seen.insert(text(&item).to_string(), out.len());
                out.push(item);
            }
        }
    }
    out
}
