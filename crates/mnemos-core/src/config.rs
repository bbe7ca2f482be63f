//! Memory layer configuration.
//!
//! Every field has a default, so a partial TOML file (or none at all) is a
//! valid configuration. Environment variables overlay the loaded values.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use mnemos_backend::SearchType;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, MemoryResult};
use crate::memory::{PrunePolicy, TypeWeights, DEFAULT_DECAY_RATE};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory holding the persisted index and buffer.
    pub state_dir: PathBuf,
    pub index_file: String,
    pub stm_file: String,

    pub decay_rate: f64,
    pub type_weights: TypeWeights,

    /// Turns between consolidation runs.
    pub consolidation_threshold: u32,
    /// Turns between reflection runs.
    pub reflection_threshold: u32,
    /// Consolidated STM entries older than this are evicted.
    pub stm_max_age_days: i64,
    pub max_excerpt_chars: usize,
    pub max_items_per_batch: usize,
    /// Labelled entries shown to the reflection prompt.
    pub reflection_recent_limit: usize,

    pub search_type: SearchType,
    pub top_k: usize,
    pub max_results: usize,
    pub min_score: f64,
    /// Per-dataset search timeout.
    pub search_timeout_ms: u64,
    /// Caller-level recall deadline across all datasets.
    pub recall_timeout_ms: u64,
    pub reasoning_timeout_ms: u64,

    /// Trigger backend re-indexing once after each pipeline batch.
    pub cognify_after_write: bool,
    pub prune_threshold: f64,
    pub prune_min_age_days: i64,
    /// Prune after every consolidation.
    pub auto_prune: bool,

    /// Known dataset name to backend id pairs.
    pub datasets: HashMap<String, String>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from(".mnemos"),
            index_file: "activation-index.json".to_string(),
            stm_file: "stm-buffer.json".to_string(),
            decay_rate: DEFAULT_DECAY_RATE,
            type_weights: TypeWeights::default(),
            consolidation_threshold: 10,
            reflection_threshold: 50,
            stm_max_age_days: 7,
            max_excerpt_chars: 2000,
            max_items_per_batch: 20,
            reflection_recent_limit: 20,
            search_type: SearchType::Chunks,
            top_k: 10,
            max_results: 8,
            min_score: 0.0,
            search_timeout_ms: 5_000,
            recall_timeout_ms: 8_000,
            reasoning_timeout_ms: 60_000,
            cognify_after_write: true,
            prune_threshold: 0.05,
            prune_min_age_days: 1,
            auto_prune: false,
            datasets: HashMap::new(),
        }
    }
}

impl MemoryConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env();
        cfg
    }

    /// Parse a TOML file, then apply environment overrides.
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let mut cfg: Self =
            toml::from_str(&raw).with_context(|| format!("parse config {}", path.display()))?;
        cfg.apply_env();
        cfg.validate()
            .with_context(|| format!("validate config {}", path.display()))?;
        Ok(cfg)
    }

    /// Overlay `MNEMOS_*` variables. Unparseable values are ignored.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var("MNEMOS_STATE_DIR") {
            self.state_dir = PathBuf::from(dir);
        }
        if let Some(v) = env_parse("MNEMOS_CONSOLIDATION_THRESHOLD") {
            self.consolidation_threshold = v;
        }
        if let Some(v) = env_parse("MNEMOS_REFLECTION_THRESHOLD") {
            self.reflection_threshold = v;
        }
        if let Some(v) = env_parse("MNEMOS_DECAY_RATE") {
            self.decay_rate = v;
        }
    }

    pub fn validate(&self) -> MemoryResult<()> {
        if self.consolidation_threshold == 0 {
            return Err(MemoryError::Config("consolidation_threshold must be positive".into()));
        }
        if self.reflection_threshold == 0 {
            return Err(MemoryError::Config("reflection_threshold must be positive".into()));
        }
        if !self.decay_rate.is_finite() || self.decay_rate < 0.0 {
            return Err(MemoryError::Config(format!(
                "decay_rate must be a non-negative number, got {}",
                self.decay_rate
            )));
        }
        let w = &self.type_weights;
        if [w.episodic, w.semantic, w.procedural]
            .iter()
            .any(|x| !x.is_finite() || *x < 0.0)
        {
            return Err(MemoryError::Config("type weights must be non-negative".into()));
        }
        if self.stm_max_age_days < 0 {
            return Err(MemoryError::Config("stm_max_age_days must not be negative".into()));
        }
        if self.top_k == 0 || self.max_results == 0 {
            return Err(MemoryError::Config("top_k and max_results must be positive".into()));
        }
        Ok(())
    }

    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = dir.into();
        self
    }

    pub fn with_thresholds(mut self, consolidation: u32, reflection: u32) -> Self {
        self.consolidation_threshold = consolidation;
        self.reflection_threshold = reflection;
        self
    }

    pub fn index_path(&self) -> PathBuf {
        self.state_dir.join(&self.index_file)
    }

    pub fn stm_path(&self) -> PathBuf {
        self.state_dir.join(&self.stm_file)
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    pub fn recall_timeout(&self) -> Duration {
        Duration::from_millis(self.recall_timeout_ms)
    }

    pub fn reasoning_timeout(&self) -> Duration {
        Duration::from_millis(self.reasoning_timeout_ms)
    }

    pub fn prune_policy(&self) -> PrunePolicy {
        PrunePolicy {
            threshold: self.prune_threshold,
            decay_rate: self.decay_rate,
            type_weights: self.type_weights,
            min_age_days: self.prune_min_age_days,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok()?.trim().parse().ok()
}
