//! Short-term memory buffer: journal of recent turn excerpts awaiting consolidation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::scope::{resolve_write_dataset, ScopeContext};

/// Current on-disk schema version of the buffer.
pub const STM_BUFFER_VERSION: u32 = 1;

/// Fewer combined excerpts than this in a lone pending entry is not worth a reasoning call.
pub const MIN_EXCERPTS_FOR_SINGLE_ENTRY: usize = 3;

/// One turn's worth of excerpts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StmEntry {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(default)]
    pub user_excerpts: Vec<String>,
    #[serde(default)]
    pub assistant_excerpts: Vec<String>,
    #[serde(default)]
    pub consolidated: bool,
    /// Scope of the session the turn came from. Absent on entries recorded
    /// before origins were tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<ScopeContext>,
}

impl StmEntry {
    pub fn excerpt_count(&self) -> usize {
        self.user_excerpts.len() + self.assistant_excerpts.len()
    }

    /// Scope whose write dataset receives memories promoted from this entry.
    /// Without a recorded origin that is `fallback_user`'s private dataset.
    pub fn write_scope(&self, fallback_user: &str) -> ScopeContext {
        self.origin
            .clone()
            .unwrap_or_else(|| ScopeContext::personal(fallback_user))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StmBuffer {
    pub version: u32,
    pub entries: Vec<StmEntry>,
    #[serde(default)]
    pub turns_since_consolidation: u32,
    #[serde(default)]
    pub turns_since_reflection: u32,
    #[serde(default)]
    pub last_consolidated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_reflected_at: Option<DateTime<Utc>>,
}

impl Default for StmBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Trim and cap an excerpt at `max_chars` characters.
pub fn clamp_excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((cut, _)) => trimmed[..cut].to_string(),
        None => trimmed.to_string(),
    }
}

fn clamp_all(excerpts: Vec<String>, max_chars: usize) -> Vec<String> {
    excerpts
        .iter()
        .map(|e| clamp_excerpt(e, max_chars))
        .filter(|e| !e.is_empty())
        .collect()
}

impl StmBuffer {
    pub fn new() -> Self {
        Self {
            version: STM_BUFFER_VERSION,
            entries: Vec::new(),
            turns_since_consolidation: 0,
            turns_since_reflection: 0,
            last_consolidated_at: None,
            last_reflected_at: None,
        }
    }

    /// Append a new entry and bump both turn counters.
    pub fn append(
        &mut self,
        origin: Option<ScopeContext>,
        session_key: Option<String>,
        user_excerpts: Vec<String>,
        assistant_excerpts: Vec<String>,
        max_excerpt_chars: usize,
        now: DateTime<Utc>,
    ) -> &StmEntry {
        self.turns_since_consolidation = self.turns_since_consolidation.saturating_add(1);
        self.turns_since_reflection = self.turns_since_reflection.saturating_add(1);
        let idx = self.entries.len();
        self.entries.push(StmEntry {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: now,
            session_key,
            user_excerpts: clamp_all(user_excerpts, max_excerpt_chars),
            assistant_excerpts: clamp_all(assistant_excerpts, max_excerpt_chars),
            consolidated: false,
            origin,
        });
        &self.entries[idx]
    }

    /// Entries not yet consolidated, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &StmEntry> {
        self.entries.iter().filter(|e| !e.consolidated)
    }

    /// Pending entries grouped by the dataset their memories would be written
    /// to (and the user they belong to), in order of first appearance.
    pub fn pending_by_write_target(
        &self,
        fallback_user: &str,
    ) -> Vec<(ScopeContext, Vec<&StmEntry>)> {
        let mut groups: Vec<(String, ScopeContext, Vec<&StmEntry>)> = Vec::new();
        for entry in self.pending() {
            let scope = entry.write_scope(fallback_user);
            let dataset = resolve_write_dataset(&scope);
            match groups
                .iter_mut()
                .find(|(d, s, _)| *d == dataset && s.user_id == scope.user_id)
            {
                Some((_, _, entries)) => entries.push(entry),
                None => groups.push((dataset, scope, vec![entry])),
            }
        }
        groups
            .into_iter()
            .map(|(_, scope, entries)| (scope, entries))
            .collect()
    }

    pub fn should_consolidate(&self, threshold: u32) -> bool {
        self.turns_since_consolidation >= threshold
    }

    pub fn should_reflect(&self, threshold: u32) -> bool {
        self.turns_since_reflection >= threshold
    }

    /// Whether the pending batch justifies a reasoning call.
    pub fn worth_consolidating(&self) -> bool {
        let pending: Vec<&StmEntry> = self.pending().collect();
        match pending.as_slice() {
            [] => false,
            [only] => only.excerpt_count() >= MIN_EXCERPTS_FOR_SINGLE_ENTRY,
            _ => true,
        }
    }

    /// Flag the given entries consolidated. Returns how many changed.
    pub fn mark_consolidated(&mut self, ids: &[String]) -> usize {
        let mut changed = 0;
        for entry in self.entries.iter_mut() {
            if !entry.consolidated && ids.contains(&entry.id) {
                entry.consolidated = true;
                changed += 1;
            }
        }
        changed
    }

    /// Drop consolidated entries older than `max_age_days`. Unconsolidated
    /// entries are kept regardless of age.
    pub fn evict_old_entries(&mut self, max_age_days: i64, now: DateTime<Utc>) -> usize {
        let cutoff = now - Duration::days(max_age_days);
        let before = self.entries.len();
        self.entries
            .retain(|e| !(e.consolidated && e.timestamp < cutoff));
        before - self.entries.len()
    }

    pub fn reset_consolidation(&mut self, now: DateTime<Utc>) {
        self.turns_since_consolidation = 0;
        self.last_consolidated_at = Some(now);
    }

    pub fn reset_reflection(&mut self, now: DateTime<Utc>) {
        self.turns_since_reflection = 0;
        self.last_reflected_at = Some(now);
    }
}
