//! Activation index: access and decay metadata keyed by backend memory id.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::decay::{classify_tier, decay_score, is_immune, DecayTier, TypeWeights};
use crate::error::{MemoryError, MemoryResult};

/// Current on-disk schema version of the index.
pub const ACTIVATION_INDEX_VERSION: u32 = 1;

/// Cognitive category of a stored memory.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    Episodic,
    #[default]
    Semantic,
    Procedural,
    Vault,
}

impl MemoryType {
    pub const ALL: [MemoryType; 4] = [
        MemoryType::Episodic,
        MemoryType::Semantic,
        MemoryType::Procedural,
        MemoryType::Vault,
    ];

    /// Case-insensitive parse; `None` for anything unrecognised.
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "episodic" => Some(Self::Episodic),
            "semantic" => Some(Self::Semantic),
            "procedural" => Some(Self::Procedural),
            "vault" => Some(Self::Vault),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Episodic => write!(f, "episodic"),
            Self::Semantic => write!(f, "semantic"),
            Self::Procedural => write!(f, "procedural"),
            Self::Vault => write!(f, "vault"),
        }
    }
}

/// Access and decay metadata for one backend memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivationEntry {
    pub memory_id: String,
    pub memory_type: MemoryType,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub access_count: u64,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
}

impl ActivationEntry {
    /// A never-accessed entry created at `now`.
    pub fn new(memory_id: impl Into<String>, memory_type: MemoryType, now: DateTime<Utc>) -> Self {
        Self {
            memory_id: memory_id.into(),
            memory_type,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            pinned: memory_type == MemoryType::Vault,
            label: None,
            dataset_name: None,
        }
    }
}

/// Options for [`ActivationIndex::register_memory`].
#[derive(Debug, Clone, Default)]
pub struct RegisterOptions {
    /// Defaults to `true` for vault memories, `false` otherwise.
    pub pinned: Option<bool>,
    pub label: Option<String>,
    pub dataset_name: Option<String>,
}

impl RegisterOptions {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_dataset(mut self, dataset_name: impl Into<String>) -> Self {
        self.dataset_name = Some(dataset_name.into());
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }
}

/// Histogram of the index by memory type and decay tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActivationStats {
    pub total: usize,
    pub pinned: usize,
    pub by_type: BTreeMap<MemoryType, usize>,
    pub by_tier: BTreeMap<DecayTier, usize>,
}

/// Versioned map of memory id to [`ActivationEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivationIndex {
    pub version: u32,
    entries: HashMap<String, ActivationEntry>,
}

impl ActivationIndex {
    pub fn new() -> Self {
        Self {
            version: ACTIVATION_INDEX_VERSION,
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ActivationEntry> {
        self.entries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ActivationEntry> {
        self.entries.get_mut(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ActivationEntry> {
        self.entries.values()
    }

    /// Insert a fully formed entry, replacing any entry with the same id.
    pub fn insert(&mut self, entry: ActivationEntry) {
        self.entries.insert(entry.memory_id.clone(), entry);
    }

    /// Record a recall hit: bump count and timestamp, or create with count 1.
    pub fn record_access(&mut self, id: &str, memory_type: Option<MemoryType>, now: DateTime<Utc>) {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.access_count = entry.access_count.saturating_add(1);
                entry.last_accessed_at = now;
            }
            None => {
                let mut entry = ActivationEntry::new(id, memory_type.unwrap_or_default(), now);
                entry.access_count = 1;
                self.entries.insert(id.to_string(), entry);
            }
        }
    }

    /// Create (or overwrite) an entry with zero accesses.
    pub fn register_memory(
        &mut self,
        id: &str,
        memory_type: MemoryType,
        opts: RegisterOptions,
        now: DateTime<Utc>,
    ) {
        let mut entry = ActivationEntry::new(id, memory_type, now);
        entry.pinned = opts.pinned.unwrap_or(memory_type == MemoryType::Vault);
        entry.label = opts.label;
        entry.dataset_name = opts.dataset_name;
        self.entries.insert(id.to_string(), entry);
    }

    pub fn set_pinned(&mut self, id: &str, pinned: bool) -> MemoryResult<()> {
        let entry = self
            .entries
            .get_mut(id)
            .ok_or_else(|| MemoryError::EntryNotFound { id: id.into() })?;
        entry.pinned = pinned;
        Ok(())
    }

    /// Ids scoring below `threshold`. Pinned and vault entries are never candidates.
    pub fn identify_prune_candidates(
        &self,
        threshold: f64,
        now: DateTime<Utc>,
        weights: &TypeWeights,
        decay_rate: f64,
    ) -> Vec<String> {
        let mut ids: Vec<String> = self
            .entries
            .values()
            .filter(|e| !is_immune(e))
            .filter(|e| decay_score(e, now, weights, decay_rate) < threshold)
            .map(|e| e.memory_id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Hard-delete the given ids. Returns how many were present.
    pub fn remove_entries(&mut self, ids: &[String]) -> usize {
        ids.iter()
            .filter(|id| self.entries.remove(id.as_str()).is_some())
            .count()
    }

    pub fn forget(&mut self, id: &str) -> MemoryResult<ActivationEntry> {
        self.entries
            .remove(id)
            .ok_or_else(|| MemoryError::EntryNotFound { id: id.into() })
    }

    /// Labelled entries, most recently accessed first.
    pub fn recently_accessed(&self, limit: usize) -> Vec<&ActivationEntry> {
        let mut labelled: Vec<&ActivationEntry> =
            self.entries.values().filter(|e| e.label.is_some()).collect();
        labelled.sort_by(|a, b| {
            b.last_accessed_at
                .cmp(&a.last_accessed_at)
                .then_with(|| a.memory_id.cmp(&b.memory_id))
        });
        labelled.truncate(limit);
        labelled
    }

    pub fn stats(
        &self,
        now: DateTime<Utc>,
        weights: &TypeWeights,
        decay_rate: f64,
    ) -> ActivationStats {
        let mut stats = ActivationStats {
            total: self.entries.len(),
            ..ActivationStats::default()
        };
        for entry in self.entries.values() {
            if entry.pinned {
                stats.pinned += 1;
            }
            *stats.by_type.entry(entry.memory_type).or_insert(0) += 1;
            let tier = classify_tier(decay_score(entry, now, weights, decay_rate));
            *stats.by_tier.entry(tier).or_insert(0) += 1;
        }
        stats
    }
}

impl Default for ActivationIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_record_access_creates_then_bumps() {
        let mut idx = ActivationIndex::new();
        let t0 = Utc::now() - Duration::hours(2);
        idx.record_access("m1", Some(MemoryType::Episodic), t0);
        assert_eq!(idx.get("m1").unwrap().access_count, 1);
        assert_eq!(idx.get("m1").unwrap().memory_type, MemoryType::Episodic);

        let t1 = Utc::now();
        idx.record_access("m1", None, t1);
        let e = idx.get("m1").unwrap();
        assert_eq!(e.access_count, 2);
        assert_eq!(e.last_accessed_at, t1);
        assert_eq!(e.created_at, t0);
    }

    #[test]
    fn test_register_memory_overwrites_with_zero_count() {
        let mut idx = ActivationIndex::new();
        let now = Utc::now();
        idx.record_access("m1", None, now);
        idx.record_access("m1", None, now);
        idx.register_memory("m1", MemoryType::Procedural, RegisterOptions::default(), now);
        let e = idx.get("m1").unwrap();
        assert_eq!(e.access_count, 0);
        assert_eq!(e.memory_type, MemoryType::Procedural);
        assert!(!e.pinned);
    }

    #[test]
    fn test_vault_registration_defaults_to_pinned() {
        let mut idx = ActivationIndex::new();
        let now = Utc::now();
        idx.register_memory("v", MemoryType::Vault, RegisterOptions::default(), now);
        assert!(idx.get("v").unwrap().pinned);
        let pinned = RegisterOptions::default().pinned(true);
        idx.register_memory("p", MemoryType::Semantic, pinned, now);
        assert!(idx.get("p").unwrap().pinned);
    }

    #[test]
    fn test_prune_candidates_skip_immune_entries() {
        let mut idx = ActivationIndex::new();
        let long_ago = Utc::now() - Duration::days(365);
        idx.register_memory("stale", MemoryType::Episodic, RegisterOptions::default(), long_ago);
        idx.register_memory("vault", MemoryType::Vault, RegisterOptions::default(), long_ago);
        idx.register_memory(
            "pinned",
            MemoryType::Episodic,
            RegisterOptions::default().pinned(true),
            long_ago,
        );
        let ids =
            idx.identify_prune_candidates(f64::MAX, Utc::now(), &TypeWeights::default(), 0.03);
        assert_eq!(ids, vec!["stale".to_string()]);
    }

    #[test]
    fn test_remove_entries_counts_present_ids() {
        let mut idx = ActivationIndex::new();
        let now = Utc::now();
        idx.record_access("a", None, now);
        idx.record_access("b", None, now);
        let removed = idx.remove_entries(&["a".into(), "missing".into()]);
        assert_eq!(removed, 1);
        assert_eq!(idx.len(), 1);
    }

    #[test]
    fn test_set_pinned_unknown_id_errors() {
        let mut idx = ActivationIndex::new();
        assert!(matches!(
            idx.set_pinned("nope", true),
            Err(MemoryError::EntryNotFound { .. })
        ));
    }

    #[test]
    fn test_recently_accessed_only_labelled() {
        let mut idx = ActivationIndex::new();
        let now = Utc::now();
        let labelled = |label: &str| RegisterOptions::default().with_label(label);
        idx.register_memory("old", MemoryType::Semantic, labelled("old"), now - Duration::days(3));
        idx.register_memory("new", MemoryType::Semantic, labelled("new"), now);
        idx.register_memory("anon", MemoryType::Semantic, RegisterOptions::default(), now);
        let recent: Vec<&str> = idx
            .recently_accessed(10)
            .iter()
            .map(|e| e.memory_id.as_str())
            .collect();
        assert_eq!(recent, vec!["new", "old"]);
    }

    #[test]
    fn test_stats_histogram() {
        let mut idx = ActivationIndex::new();
        let now = Utc::now();
        idx.register_memory("v", MemoryType::Vault, RegisterOptions::default(), now);
        idx.record_access("s", Some(MemoryType::Semantic), now);
        idx.register_memory("e", MemoryType::Episodic, RegisterOptions::default(), now);
        let stats = idx.stats(now, &TypeWeights::default(), 0.03);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.pinned, 1);
        assert_eq!(stats.by_type[&MemoryType::Vault], 1);
        assert_eq!(stats.by_tier[&DecayTier::Active], 2);
        assert_eq!(stats.by_tier[&DecayTier::Archived], 1);
    }

    #[test]
    fn test_serde_shape_is_camel_case() {
        let mut idx = ActivationIndex::new();
        idx.record_access("m1", None, Utc::now());
        let json = serde_json::to_value(&idx).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["entries"]["m1"]["accessCount"], 1);
        assert_eq!(json["entries"]["m1"]["memoryType"], "semantic");
    }
}
