//! Temporal decay scoring.
//!
//! `score = exp(-λ · days_since_access) × log2(access_count + 1) × type_weight`
//!
//! Pinned and vault entries score `+∞` and never leave the `Active` tier.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::activation::{ActivationEntry, MemoryType};

/// Default exponential decay rate per day.
pub const DEFAULT_DECAY_RATE: f64 = 0.03;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Per-type importance multipliers. Vault is always `+∞` and not configurable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypeWeights {
    pub episodic: f64,
    pub semantic: f64,
    pub procedural: f64,
}

impl Default for TypeWeights {
    fn default() -> Self {
        Self {
            episodic: 0.8,
            semantic: 1.2,
            procedural: 1.0,
        }
    }
}

impl TypeWeights {
    pub fn weight(&self, memory_type: MemoryType) -> f64 {
        match memory_type {
            MemoryType::Episodic => self.episodic,
            MemoryType::Semantic => self.semantic,
            MemoryType::Procedural => self.procedural,
            MemoryType::Vault => f64::INFINITY,
        }
    }
}

/// Discrete freshness bucket derived from a decay score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecayTier {
    Active,
    Fading,
    Dormant,
    Archived,
}

impl DecayTier {
    pub const ALL: [DecayTier; 4] = [
        DecayTier::Active,
        DecayTier::Fading,
        DecayTier::Dormant,
        DecayTier::Archived,
    ];
}

impl std::fmt::Display for DecayTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Fading => write!(f, "fading"),
            Self::Dormant => write!(f, "dormant"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Days elapsed since the entry was last accessed, clamped at zero.
pub fn days_since_access(entry: &ActivationEntry, now: DateTime<Utc>) -> f64 {
    let millis = (now - entry.last_accessed_at).num_milliseconds() as f64;
    (millis / MILLIS_PER_DAY).max(0.0)
}

/// Whether the entry is exempt from decay and eviction.
pub fn is_immune(entry: &ActivationEntry) -> bool {
    entry.pinned || entry.memory_type == MemoryType::Vault
}

/// Compute the decay score of an entry at `now`.
pub fn decay_score(
    entry: &ActivationEntry,
    now: DateTime<Utc>,
    weights: &TypeWeights,
    decay_rate: f64,
) -> f64 {
    if is_immune(entry) {
        return f64::INFINITY;
    }
    let recency = (-decay_rate * days_since_access(entry, now)).exp();
    let frequency = (entry.access_count as f64 + 1.0).log2();
    recency * frequency * weights.weight(entry.memory_type)
}

/// Bucket a score. Non-finite scores (immune entries, NaN) are `Active`.
pub fn classify_tier(score: f64) -> DecayTier {
    if !score.is_finite() || score >= 0.5 {
        DecayTier::Active
    } else if score >= 0.2 {
        DecayTier::Fading
    } else if score >= 0.05 {
        DecayTier::Dormant
    } else {
        DecayTier::Archived
    }
}
