//! Rendering of promoted memories as backend documents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::parse::ParsedMemory;
use crate::memory::MemoryType;
use crate::scope::{ScopeContext, ScopeTier};

const TITLE_CHARS: usize = 80;

/// Provenance and classification attached to every promoted memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeEntryMetadata {
    #[serde(rename = "type")]
    pub entry_type: MemoryType,
    pub title: String,
    pub scope: ScopeTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supersedes_entry_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// SHA-256 over the ids of the inputs a batch was built from.
pub fn source_ref(ids: &[String]) -> Option<String> {
    if ids.is_empty() {
        return None;
    }
    let mut hasher = Sha256::new();
    for id in ids {
        hasher.update(id.as_bytes());
        hasher.update(b"\n");
    }
    Some(format!("sha256:{}", hex::encode(hasher.finalize())))
}

/// First line of `text`, capped at a title-friendly length.
fn title_from(text: &str) -> String {
    let line = text.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(TITLE_CHARS) {
        Some((cut, _)) => format!("{}...", line[..cut].trim_end()),
        None => line.to_string(),
    }
}

impl KnowledgeEntryMetadata {
    pub fn for_item(
        item: &ParsedMemory,
        scope: &ScopeContext,
        source_ref: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            entry_type: item.memory_type,
            title: item.label.clone().unwrap_or_else(|| title_from(&item.text)),
            scope: scope.tier,
            project: scope.project_ref().map(str::to_string),
            author: Some(scope.user_id.clone()),
            confidence: item.confidence,
            tags: item.tags.clone(),
            source_ref,
            supersedes_entry_id: item.supersedes.clone(),
            created_at: now,
        }
    }

    /// Document text sent to the backend: a short header, a blank line, the body.
    pub fn render(&self, body: &str) -> String {
        let mut header = format!("# {}\n[{}] scope: {}", self.title, self.entry_type, self.scope);
        if let Some(project) = &self.project {
            header.push_str(&format!(" ({project})"));
        }
        if let Some(author) = &self.author {
            header.push_str(&format!(" | author: {author}"));
        }
        if let Some(c) = self.confidence {
            header.push_str(&format!(" | confidence: {c:.2}"));
        }
        if !self.tags.is_empty() {
            header.push_str(&format!(" | tags: {}", self.tags.join(", ")));
        }
        if let Some(supersedes) = &self.supersedes_entry_id {
            header.push_str(&format!(" | supersedes: {supersedes}"));
        }
        if let Some(source) = &self.source_ref {
            header.push_str(&format!(" | source: {source}"));
        }
        format!("{header}\n\n{}", body.trim())
    }
}
