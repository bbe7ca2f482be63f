//! Lenient parsing of reasoner output into memory items.
//!
//! Accepted: a JSON array of items, optionally inside a fenced code block or
//! surrounded by prose, or an object wrapping that array under `memories`,
//! `items` or `insights`. Items may be objects or bare strings. Anything else
//! yields no items.

use serde_json::Value;
use tracing::debug;

use crate::memory::{detect_memory_type, MemoryType};

const WRAPPER_KEYS: &[&str] = &["memories", "items", "insights"];

/// One memory proposed by the reasoner.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMemory {
    pub text: String,
    pub memory_type: MemoryType,
    pub label: Option<String>,
    pub pinned: Option<bool>,
    pub tags: Vec<String>,
    pub confidence: Option<f64>,
    pub supersedes: Option<String>,
}

/// Body of the first fenced code block, or the whole input.
fn strip_fence(raw: &str) -> &str {
    let Some(open) = raw.find("```") else {
        return raw.trim();
    };
    let after_open = &raw[open + 3..];
    // skip the info string (e.g. `json`)
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

fn parse_value(text: &str) -> Option<Value> {
    if let Ok(v) = serde_json::from_str::<Value>(text) {
        return Some(v);
    }
    let start = text.find('[')?;
    let end = text.rfind(']')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

fn item_array(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(mut map) => WRAPPER_KEYS
            .iter()
            .find_map(|k| match map.remove(*k) {
                Some(Value::Array(items)) => Some(items),
                _ => None,
            })
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_item(value: &Value) -> Option<ParsedMemory> {
    if let Some(text) = non_empty_str(Some(value)) {
        let memory_type = detect_memory_type(&text, None);
        return Some(ParsedMemory {
            text,
            memory_type,
            label: None,
            pinned: None,
            tags: Vec::new(),
            confidence: None,
            supersedes: None,
        });
    }
    let obj = value.as_object()?;
    let text = non_empty_str(obj.get("text")).or_else(|| non_empty_str(obj.get("content")))?;
    // explicit valid type or vault flag wins, otherwise heuristic
    let memory_type = detect_memory_type(&text, Some(value));
    let tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|t| non_empty_str(Some(t)))
                .collect()
        })
        .unwrap_or_default();
    Some(ParsedMemory {
        label: non_empty_str(obj.get("label")).or_else(|| non_empty_str(obj.get("title"))),
        pinned: obj.get("pinned").and_then(Value::as_bool),
        confidence: obj
            .get("confidence")
            .and_then(Value::as_f64)
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0)),
        supersedes: non_empty_str(obj.get("supersedes")),
        tags,
        text,
        memory_type,
    })
}

/// Parse reasoner output, keeping at most `max_items` valid items.
pub fn parse_memory_items(raw: &str, max_items: usize) -> Vec<ParsedMemory> {
    let body = strip_fence(raw);
    let Some(value) = parse_value(body) else {
        debug!(len = raw.len(), "reasoner output is not JSON");
        return Vec::new();
    };
    let candidates = item_array(value);
    let total = candidates.len();
    let items: Vec<ParsedMemory> = candidates
        .iter()
        .filter_map(parse_item)
        .take(max_items)
        .collect();
    if items.len() < total {
        debug!(total, kept = items.len(), "dropped invalid or excess items");
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_array() {
        let items = parse_memory_items(
            r#"[{"text":"Alice leads the billing team","memoryType":"semantic","label":"team lead"}]"#,
            10,
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].memory_type, MemoryType::Semantic);
        assert_eq!(items[0].label.as_deref(), Some("team lead"));
    }

    #[test]
    fn test_fenced_block_with_prose() {
        let raw = "Here you go:\n```json\n[{\"text\":\"Always rebase before merging\",\"memoryType\":\"procedural\",\"pinned\":true}]\n```\nThanks";
        let items = parse_memory_items(raw, 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].memory_type, MemoryType::Procedural);
        assert_eq!(items[0].pinned, Some(true));
    }

    #[test]
    fn test_unknown_type_falls_back_to_detection() {
        let items = parse_memory_items(
            r#"[{"text":"Yesterday the deploy failed","memoryType":"gossip"},{"text":"Cats are mammals"}]"#,
            10,
        );
        assert_eq!(items[0].memory_type, MemoryType::Episodic);
        assert_eq!(items[1].memory_type, MemoryType::Semantic);
    }

    #[test]
    fn test_wrapped_object_and_bare_strings() {
        let items = parse_memory_items(r#"{"memories":["one fact", "  ", {"text":""}, 42]}"#, 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].text, "one fact");
    }

    #[test]
    fn test_array_embedded_in_prose() {
        let items = parse_memory_items(r#"Sure! [{"text":"x is y"}] hope that helps"#, 10);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_malformed_yields_nothing() {
        assert!(parse_memory_items("no memories today", 10).is_empty());
        assert!(parse_memory_items("```json\n[{\"text\": }\n```", 10).is_empty());
        assert!(parse_memory_items("{\"status\":\"ok\"}", 10).is_empty());
        assert!(parse_memory_items("", 10).is_empty());
    }

    #[test]
    fn test_cap_and_extras() {
        let raw = r#"[
            {"text":"a","tags":["x"," ",3],"confidence":1.7,"supersedes":"m-9"},
            {"text":"b"},
            {"text":"c"}
        ]"#;
        let items = parse_memory_items(raw, 2);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].tags, vec!["x"]);
        assert_eq!(items[0].confidence, Some(1.0));
        assert_eq!(items[0].supersedes.as_deref(), Some("m-9"));
    }

    #[test]
    fn test_vault_flag_in_item() {
        let items =
            parse_memory_items(r#"[{"text":"wifi password rotation policy","vault":true}]"#, 5);
        assert_eq!(items[0].memory_type, MemoryType::Vault);
    }
}
