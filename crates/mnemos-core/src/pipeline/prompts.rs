//! Prompt builders for the two pipelines.

use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::memory::{ActivationEntry, ActivationStats, DecayTier, MemoryType, StmEntry};
use crate::scope::ScopeContext;

const OUTPUT_CONTRACT: &str = "Respond with a JSON array only. Each element: \
{\"text\": string, \"memoryType\": \"episodic\"|\"semantic\"|\"procedural\", \
\"label\": short string (optional), \"pinned\": boolean (optional), \
\"tags\": [string] (optional), \"confidence\": number 0-1 (optional)}. \
Respond with [] when there is nothing worth keeping.";

pub fn build_consolidation_prompt(entries: &[&StmEntry], scope: &ScopeContext) -> String {
    let mut p = String::new();
    let _ = writeln!(
        p,
        "You maintain long-term memory for user {} ({} scope{}).",
        scope.user_id,
        scope.tier,
        scope
            .project_ref()
            .map(|pr| format!(", project {pr}"))
            .unwrap_or_default()
    );
    let _ = writeln!(
        p,
        "Extract durable facts, preferences, decisions and procedures from the \
conversation excerpts below. Skip small talk and anything already transient.\n"
    );
    for (i, entry) in entries.iter().enumerate() {
        let _ = writeln!(
            p,
            "## Turn {} ({})",
            i + 1,
            entry.timestamp.format("%Y-%m-%d %H:%M UTC")
        );
        for u in &entry.user_excerpts {
            let _ = writeln!(p, "User: {u}");
        }
        for a in &entry.assistant_excerpts {
            let _ = writeln!(p, "Assistant: {a}");
        }
        p.push('\n');
    }
    p.push_str(OUTPUT_CONTRACT);
    p
}

pub fn build_reflection_prompt(
    stats: &ActivationStats,
    recent: &[&ActivationEntry],
    now: DateTime<Utc>,
) -> String {
    let mut p = String::new();
    let _ = writeln!(
        p,
        "Review the state of an agent's long-term memory as of {}.",
        now.format("%Y-%m-%d")
    );
    let _ = writeln!(p, "Total memories: {} ({} pinned)", stats.total, stats.pinned);
    p.push_str("By type:");
    for t in MemoryType::ALL {
        let _ = write!(p, " {t}={}", stats.by_type.get(&t).copied().unwrap_or(0));
    }
    p.push_str("\nBy tier:");
    for t in DecayTier::ALL {
        let _ = write!(p, " {t}={}", stats.by_tier.get(&t).copied().unwrap_or(0));
    }
    p.push_str("\n\nMost recently used:\n");
    for e in recent {
        let _ = writeln!(
            p,
            "- [{}] {} (accessed {} times, last {})",
            e.memory_type,
            e.label.as_deref().unwrap_or(&e.memory_id),
            e.access_count,
            e.last_accessed_at.format("%Y-%m-%d")
        );
    }
    p.push_str(
        "\nSurface recurring patterns, contradictions between memories, and gaps \
worth asking the user about. Each insight becomes a new memory.\n",
    );
    p.push_str(OUTPUT_CONTRACT);
    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::StmBuffer;

    #[test]
    fn test_consolidation_prompt_lists_turns() {
        let mut buf = StmBuffer::new();
        buf.append(
            None,
            None,
            vec!["I moved to Lisbon".into()],
            vec!["Noted!".into()],
            500,
            Utc::now(),
        );
        let pending: Vec<&StmEntry> = buf.pending().collect();
        let p = build_consolidation_prompt(&pending, &ScopeContext::project("alice", "webapp"));
        assert!(p.contains("user alice (project scope, project webapp)"));
        assert!(p.contains("User: I moved to Lisbon"));
        assert!(p.contains("Assistant: Noted!"));
        assert!(p.ends_with(OUTPUT_CONTRACT));
    }

    #[test]
    fn test_reflection_prompt_histogram() {
        let mut stats = ActivationStats::default();
        stats.total = 3;
        stats.by_type.insert(MemoryType::Semantic, 3);
        stats.by_tier.insert(DecayTier::Fading, 3);
        let mut e = ActivationEntry::new("m1", MemoryType::Semantic, Utc::now());
        e.label = Some("coffee preference".into());
        let p = build_reflection_prompt(&stats, &[&e], Utc::now());
        assert!(p.contains("Total memories: 3"));
        assert!(p.contains("semantic=3"));
        assert!(p.contains("episodic=0"));
        assert!(p.contains("fading=3"));
        assert!(p.contains("- [semantic] coffee preference"));
    }
}
