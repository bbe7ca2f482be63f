//! Heuristic memory-type detection for free text.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::activation::MemoryType;

const PROCEDURAL_PATTERNS: &[&str] = &[
    // imperative line openers, optionally bulleted or numbered
    r"(?im)^\s*(?:\d+[.)]\s*|[-*]\s*)?(?:how to|to \w+ you|run|use|install|configure|set up|always|never|make sure|remember to|don't|do not|avoid|prefer|step \d+)\b",
    // shell or tool invocations
    r"(?m)(?:^|\s)(?:\$ \S|cargo \w|npm \w|pnpm \w|git \w|pip \w|docker \w|kubectl \w|make \w)",
];

const EPISODIC_PATTERNS: &[&str] = &[
    r"\b\d{4}-\d{2}-\d{2}\b",
    r"(?i)\b(?:yesterday|today|tomorrow|tonight|this morning|last (?:week|month|year|night|time)|next (?:week|month)|\d+ (?:days?|weeks?|months?) ago)\b",
    r"(?i)\bon (?:monday|tuesday|wednesday|thursday|friday|saturday|sunday)\b",
    r"(?i)\b(?:happened|occurred|we met|met with|decided|shipped|released|launched|deployed|discussed|meeting|incident|outage)\b",
];

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

fn procedural() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| compile(PROCEDURAL_PATTERNS))
}

fn episodic() -> &'static [Regex] {
    static RE: OnceLock<Vec<Regex>> = OnceLock::new();
    RE.get_or_init(|| compile(EPISODIC_PATTERNS))
}

/// Explicit type carried in metadata, if any. `vault: true` always wins.
fn metadata_type(metadata: &Value) -> Option<MemoryType> {
    if metadata.get("vault").and_then(Value::as_bool) == Some(true) {
        return Some(MemoryType::Vault);
    }
    ["memoryType", "memory_type"]
        .iter()
        .filter_map(|k| metadata.get(*k).and_then(Value::as_str))
        .find_map(MemoryType::parse_lenient)
}

/// Classify `text` as procedural, episodic or semantic.
///
/// Procedural patterns are checked first, then episodic; anything else is
/// semantic. Metadata flags override the heuristic and are the only way to
/// obtain `Vault`.
pub fn detect_memory_type(text: &str, metadata: Option<&Value>) -> MemoryType {
    if let Some(forced) = metadata.and_then(metadata_type) {
        return forced;
    }
    if procedural().iter().any(|re| re.is_match(text)) {
        MemoryType::Procedural
    } else if episodic().iter().any(|re| re.is_match(text)) {
        MemoryType::Episodic
    } else {
        MemoryType::Semantic
    }
}
