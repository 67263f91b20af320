//! Defensive parsing of oracle replies.
//!
//! Oracle output is modeled as a tagged union: either a parsed field map or
//! an unparsable blob. Callers pattern-match and fall back to the most
//! conservative decision ("no change") instead of trusting field presence.
//! Accepted forms, tried in order: a bare JSON object, a fenced ```json
//! block, the first `{...}` slice found in the text, and line-oriented
//! `key: value` pairs.

use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// OracleReply
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum OracleReply {
    Parsed(Map<String, Value>),
    Unparsable { raw: String },
}

impl OracleReply {
    /// String field, accepting JSON strings and scalars rendered as text.
    pub fn str_field(&self, name: &str) -> Option<String> {
        match self {
            OracleReply::Parsed(map) => match map.get(name)? {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Bool(b) => Some(b.to_string()),
                _ => None,
            },
            OracleReply::Unparsable { .. } => None,
        }
    }

    /// Boolean field, accepting JSON booleans and common textual spellings.
    pub fn bool_field(&self, name: &str) -> Option<bool> {
        match self {
            OracleReply::Parsed(map) => match map.get(name)? {
                Value::Bool(b) => Some(*b),
                Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" | "yes" => Some(true),
                    "false" | "no" => Some(false),
                    _ => None,
                },
                _ => None,
            },
            OracleReply::Unparsable { .. } => None,
        }
    }

    /// Numeric field, accepting JSON numbers and numeric strings.
    pub fn f64_field(&self, name: &str) -> Option<f64> {
        match self {
            OracleReply::Parsed(map) => match map.get(name)? {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            },
            OracleReply::Unparsable { .. } => None,
        }
    }

    /// List of node ids, accepting a JSON array of numbers or numeric
    /// strings, or a comma-separated string. Non-numeric entries are dropped.
    pub fn id_list_field(&self, name: &str) -> Vec<u32> {
        let map = match self {
            OracleReply::Parsed(map) => map,
            OracleReply::Unparsable { .. } => return Vec::new(),
        };
        match map.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|v| match v {
                    Value::Number(n) => n.as_u64().map(|n| n as u32),
                    Value::String(s) => s.trim().parse().ok(),
                    _ => None,
                })
                .collect(),
            Some(Value::String(s)) => s
                .split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Raw array field, for batched replacement replies.
    pub fn array_field(&self, name: &str) -> Option<&Vec<Value>> {
        match self {
            OracleReply::Parsed(map) => map.get(name)?.as_array(),
            OracleReply::Unparsable { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// parse_reply
// ---------------------------------------------------------------------------

/// Parse an oracle reply into a field map, degrading through progressively
/// looser forms. Never errors; text that yields no fields at all comes back
/// as `Unparsable`.
pub fn parse_reply(text: &str) -> OracleReply {
    let trimmed = text.trim();

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return OracleReply::Parsed(map);
    }

    if let Some(inner) = fenced_block(trimmed) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(inner.trim()) {
            return OracleReply::Parsed(map);
        }
    }

    if let Some(slice) = brace_slice(trimmed) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(slice) {
            return OracleReply::Parsed(map);
        }
    }

    let map = key_value_lines(trimmed);
    if map.is_empty() {
        OracleReply::Unparsable {
            raw: text.to_string(),
        }
    } else {
        OracleReply::Parsed(map)
    }
}

/// Content of the first ``` fence, with an optional language tag.
fn fenced_block(text: &str) -> Option<&str> {
    let start = text.find("```")?;
    let after_fence = &text[start + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let end = body.find("```")?;
    Some(&body[..end])
}

/// Slice from the first `{` to the matching last `}`.
fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end > start {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Line-oriented `key: value` pairs. Keys are lowercased; values keep their
/// textual form so the typed accessors can coerce them.
fn key_value_lines(text: &str) -> Map<String, Value> {
    let mut map = Map::new();
    for line in text.lines() {
        let line = line.trim().trim_start_matches('-').trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();
        if key.is_empty() || value.is_empty() || key.contains(char::is_whitespace) {
            continue;
        }
        map.insert(key, Value::String(value.to_string()));
    }
    map
}

/// Strip a surrounding markdown code fence from generated source text.
/// Replies without a fence come back verbatim.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    match fenced_block(trimmed) {
        Some(inner) => inner.trim_end().to_string(),
        // Opening fence with no newline or no closing fence.
        None => trimmed
            .trim_start_matches('`')
            .trim_end_matches('`')
            .trim()
            .to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_json_object_parses() {
        let reply = parse_reply(r#"{"needs_change": true, "confidence": 0.9}"#);
        assert_eq!(reply.bool_field("needs_change"), Some(true));
        assert_eq!(reply.f64_field("confidence"), Some(0.9));
    }

    #[test]
    fn fenced_json_parses() {
        let reply = parse_reply("Here you go:\n```json\n{\"kind\": \"page\"}\n```\nDone.");
        assert_eq!(reply.str_field("kind").as_deref(), Some("page"));
    }

    #[test]
    fn embedded_brace_slice_parses() {
        let reply = parse_reply("I decided {\"strategy\": \"full_file\"} as requested");
        assert_eq!(reply.str_field("strategy").as_deref(), Some("full_file"));
    }

    #[test]
    fn key_value_lines_parse() {
        let reply = parse_reply("needs_change: yes\nconfidence: 0.7\nreasoning: button rename");
        assert_eq!(reply.bool_field("needs_change"), Some(true));
        assert_eq!(reply.f64_field("confidence"), Some(0.7));
        assert_eq!(reply.str_field("reasoning").as_deref(), Some("button rename"));
    }

    #[test]
    fn prose_is_unparsable() {
        let reply = parse_reply("I am sorry, I cannot help with that request.");
        assert!(matches!(reply, OracleReply::Unparsable { .. }));
        assert_eq!(reply.bool_field("needs_change"), None);
        assert!(reply.id_list_field("selected_ids").is_empty());
    }

    #[test]
    fn empty_reply_is_unparsable() {
        assert!(matches!(parse_reply(""), OracleReply::Unparsable { .. }));
        assert!(matches!(parse_reply("   \n "), OracleReply::Unparsable { .. }));
    }

    #[test]
    fn id_list_from_json_array() {
        let reply = parse_reply(r#"{"selected_ids": [0, 3, "7", null, "x"]}"#);
        assert_eq!(reply.id_list_field("selected_ids"), vec![0, 3, 7]);
    }

    #[test]
    fn id_list_from_comma_string() {
        let reply = parse_reply("selected_ids: 1, 2, 5");
        assert_eq!(reply.id_list_field("selected_ids"), vec![1, 2, 5]);
    }

    #[test]
    fn missing_fields_default_to_none() {
        let reply = parse_reply(r#"{"other": 1}"#);
        assert_eq!(reply.bool_field("needs_change"), None);
        assert_eq!(reply.str_field("reasoning"), None);
        assert_eq!(reply.f64_field("confidence"), None);
    }

    #[test]
    fn wrong_typed_fields_default_to_none() {
        let reply = parse_reply(r#"{"needs_change": [1], "confidence": {"v": 1}}"#);
        assert_eq!(reply.bool_field("needs_change"), None);
        assert_eq!(reply.f64_field("confidence"), None);
    }

    #[test]
    fn bool_field_accepts_textual_spellings() {
        let reply = parse_reply("needs_change: No");
        assert_eq!(reply.bool_field("needs_change"), Some(false));
    }

    #[test]
    fn array_field_returns_raw_values() {
        let reply = parse_reply(r#"{"replacements": [{"node_id": 0, "code": "<b/>"}]}"#);
        let arr = reply.array_field("replacements").unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["node_id"], 0);
    }

    // --- strip_code_fences ---

    #[test]
    fn strip_fences_passes_plain_text_through() {
        assert_eq!(strip_code_fences("const a = 1;"), "const a = 1;");
    }

    #[test]
    fn strip_fences_removes_jsx_fence() {
        let text = "```jsx\nexport default function About() {}\n```";
        assert_eq!(
            strip_code_fences(text),
            "export default function About() {}"
        );
    }

    #[test]
    fn strip_fences_handles_missing_closing_fence() {
        let text = "```\nlet x = 1;";
        // Degrades to trimming backticks rather than erroring.
        assert!(strip_code_fences(text).contains("let x = 1;"));
    }
}
