//! Scope classification: which of the three edit strategies a request needs.
//!
//! The oracle is asked first; a keyword heuristic takes over whenever the
//! reply is missing, malformed, or low-confidence, so classification never
//! blocks a request on oracle availability.

use std::sync::Arc;

use reweave_oracle::{parse_reply, DynOracle, OracleReply};
use reweave_types::{
    EntityKind, ModificationScope, ModificationStrategy, NewEntity, ProjectFileMap, ReweaveError,
};

use crate::prompts;
use crate::synthesizer::heuristic_entity;

const CONFIDENCE_FLOOR: f64 = 0.5;
const MAX_TARGET_FILES: usize = 3;

const CROSS_CUTTING_MARKERS: &[&str] = &[
    "theme",
    "color scheme",
    "colour scheme",
    "redesign",
    "overhaul",
    "dark mode",
    "light mode",
    "entire",
    "whole site",
    "all pages",
    "everywhere",
    "restyle",
    "rebrand",
];

const NEW_ENTITY_VERBS: &[&str] = &["add", "create", "build", "make a new", "new"];
const NEW_ENTITY_NOUNS: &[&str] = &["page", "component", "section", "screen", "view"];

const STOPWORDS: &[&str] = &[
    "the", "and", "with", "from", "that", "this", "into", "make", "change", "update", "please",
    "text", "have", "want", "need", "should",
];

pub struct ScopeClassifier {
    oracle: Arc<DynOracle>,
}

impl ScopeClassifier {
    pub fn new(oracle: Arc<DynOracle>) -> Self {
        Self { oracle }
    }

    /// Always yields a scope; oracle failure degrades to the heuristic.
    pub async fn classify(&self, request: &str, files: &ProjectFileMap) -> ModificationScope {
        match self
            .oracle
            .complete("", &prompts::classify_scope(request, files))
            .await
        {
            Ok(text) => {
                if let Some(scope) = scope_from_reply(&parse_reply(&text), request, files) {
                    tracing::debug!(strategy = ?scope.strategy, "oracle classified scope");
                    return scope;
                }
                tracing::debug!("scope reply unusable; falling back to heuristic");
            }
            Err(e) => {
                tracing::warn!(error = %e, "scope oracle call failed; falling back to heuristic");
            }
        }
        heuristic_scope(request, files)
    }
}

fn scope_from_reply(
    reply: &OracleReply,
    request: &str,
    files: &ProjectFileMap,
) -> Option<ModificationScope> {
    let strategy = match reply.str_field("strategy")?.as_str() {
        "full_file" => ModificationStrategy::FullFile,
        "targeted_nodes" => ModificationStrategy::TargetedNodes,
        "component_addition" => ModificationStrategy::ComponentAddition,
        _ => return None,
    };
    let confidence = reply.f64_field("confidence").unwrap_or(0.0);
    if confidence < CONFIDENCE_FLOOR {
        let ambiguity = ReweaveError::ClassificationAmbiguity {
            confidence,
            message: "scope reply below the confidence floor".into(),
        };
        tracing::debug!(error = %ambiguity, "discarding oracle scope");
        return None;
    }

    // Only paths that actually exist in the project survive.
    let target_files: Vec<String> = reply
        .array_field("target_files")
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str())
                .filter(|p| files.contains_key(*p))
                .map(String::from)
                .take(MAX_TARGET_FILES)
                .collect()
        })
        .unwrap_or_default();

    let new_entity = match strategy {
        ModificationStrategy::ComponentAddition => {
            let (fallback_name, fallback_kind, _) = heuristic_entity(request);
            let name = reply
                .str_field("entity_name")
                .filter(|n| !n.is_empty() && n != "null")
                .unwrap_or(fallback_name);
            let kind = match reply.str_field("entity_kind").as_deref() {
                Some("page") => EntityKind::Page,
                Some("component") => EntityKind::Component,
                _ => fallback_kind,
            };
            Some(NewEntity { name, kind })
        }
        _ => {
            if target_files.is_empty() {
                // An edit strategy with nothing to edit is not actionable.
                return None;
            }
            None
        }
    };

    Some(ModificationScope {
        strategy,
        target_files,
        reasoning: reply
            .str_field("reasoning")
            .unwrap_or_else(|| "oracle classification".into()),
        new_entity,
    })
}

/// Deterministic fallback. New-entity phrasing wins, then cross-cutting
/// markers, then a targeted edit against keyword-scored files.
pub(crate) fn heuristic_scope(request: &str, files: &ProjectFileMap) -> ModificationScope {
    let lower = request.to_lowercase();

    let wants_new = NEW_ENTITY_VERBS.iter().any(|v| contains_phrase(&lower, v));
    let names_entity = NEW_ENTITY_NOUNS.iter().any(|n| contains_phrase(&lower, n));
    if wants_new && names_entity {
        let (name, kind, _) = heuristic_entity(request);
        return ModificationScope {
            strategy: ModificationStrategy::ComponentAddition,
            target_files: Vec::new(),
            reasoning: "request asks for a new page or component (keyword heuristic)".into(),
            new_entity: Some(NewEntity { name, kind }),
        };
    }

    if CROSS_CUTTING_MARKERS.iter().any(|m| contains_phrase(&lower, m)) {
        return ModificationScope {
            strategy: ModificationStrategy::FullFile,
            target_files: markup_files(files),
            reasoning: "cross-cutting change; node-by-node editing would be inconsistent".into(),
            new_entity: None,
        };
    }

    ModificationScope {
        strategy: ModificationStrategy::TargetedNodes,
        target_files: scored_files(&lower, files),
        reasoning: "localized edit against the files most related to the request".into(),
        new_entity: None,
    }
}

/// Substring match constrained to word boundaries, so "add" does not match
/// inside "address" or "padding". Multi-word phrases match with their
/// internal spaces intact.
pub(crate) fn contains_phrase(lower: &str, phrase: &str) -> bool {
    let bytes = lower.as_bytes();
    let mut start = 0;
    while let Some(pos) = lower[start..].find(phrase) {
        let at = start + pos;
        let end = at + phrase.len();
        let before = at == 0 || !bytes[at - 1].is_ascii_alphanumeric();
        let after = end == lower.len() || !bytes[end].is_ascii_alphanumeric();
        if before && after {
            return true;
        }
        start = at + 1;
    }
    false
}

fn markup_files(files: &ProjectFileMap) -> Vec<String> {
    let mut paths: Vec<String> = files
        .keys()
        .filter(|p| {
            p.ends_with(".jsx") || p.ends_with(".tsx") || p.ends_with(".js") || p.ends_with(".html")
        })
        .cloned()
        .collect();
    // Composition root first so the overall look changes even when capped.
    paths.sort_by_key(|p| (!files[p].is_main_file, p.clone()));
    paths.truncate(MAX_TARGET_FILES);
    paths
}

/// Occurrence-count scoring of request keywords against file content, with
/// bonuses from the scan flags.
fn scored_files(request_lower: &str, files: &ProjectFileMap) -> Vec<String> {
    let keywords: Vec<&str> = request_lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| w.len() > 3 && !STOPWORDS.contains(w))
        .collect();

    let mut scored: Vec<(usize, &String)> = files
        .iter()
        .map(|(path, file)| {
            let content = file.content.to_lowercase();
            let mut score: usize = keywords.iter().map(|k| content.matches(k).count()).sum();
            if file.has_buttons && request_lower.contains("button") {
                score += 3;
            }
            if file.has_signin
                && (request_lower.contains("sign") || request_lower.contains("log"))
            {
                score += 3;
            }
            if file.is_main_file {
                score += 1;
            }
            (score, path)
        })
        .filter(|(score, _)| *score > 0)
        .collect();

    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(b.1)));
    let mut paths: Vec<String> = scored
        .into_iter()
        .take(MAX_TARGET_FILES)
        .map(|(_, p)| p.clone())
        .collect();

    if paths.is_empty() {
        if let Some(main) = files.values().find(|f| f.is_main_file) {
            paths.push(main.relative_path.clone());
        }
    }
    paths
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use reweave_types::ProjectFile;

    fn file(path: &str, content: &str, main: bool) -> ProjectFile {
        ProjectFile {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            absolute_path: PathBuf::from("/p").join(path),
            relative_path: path.to_string(),
            line_count: content.lines().count(),
            size_bytes: content.len() as u64,
            snippet: content.to_string(),
            component_name: String::new(),
            has_buttons: content.contains("<button"),
            has_signin: content.to_lowercase().contains("sign in"),
            is_main_file: main,
            content: content.to_string(),
        }
    }

    fn project() -> ProjectFileMap {
        let mut map = ProjectFileMap::new();
        map.insert(
            "src/App.jsx".into(),
            file("src/App.jsx", "<Routes><Route path=\"/\"/></Routes>", true),
        );
        map.insert(
            "src/components/Header.jsx".into(),
            file(
                "src/components/Header.jsx",
                "<header><button>Sign In</button></header>",
                false,
            ),
        );
        map.insert(
            "src/components/Footer.jsx".into(),
            file("src/components/Footer.jsx", "<footer>contact us</footer>", false),
        );
        map
    }

    #[test]
    fn button_rename_targets_the_file_with_the_button() {
        let scope = heuristic_scope("change the button text from Sign In to Log In", &project());
        assert_eq!(scope.strategy, ModificationStrategy::TargetedNodes);
        assert_eq!(scope.target_files[0], "src/components/Header.jsx");
    }

    #[test]
    fn theme_request_is_cross_cutting() {
        let scope = heuristic_scope("switch the whole site to a dark mode theme", &project());
        assert_eq!(scope.strategy, ModificationStrategy::FullFile);
        assert!(!scope.target_files.is_empty());
        assert_eq!(scope.target_files[0], "src/App.jsx");
    }

    #[test]
    fn add_page_request_is_component_addition() {
        let scope = heuristic_scope("add an About page", &project());
        assert_eq!(scope.strategy, ModificationStrategy::ComponentAddition);
        let entity = scope.new_entity.unwrap();
        assert_eq!(entity.name, "About");
        assert_eq!(entity.kind, EntityKind::Page);
    }

    #[test]
    fn entity_verbs_match_whole_words_only() {
        assert!(contains_phrase("add a page", "add"));
        assert!(contains_phrase("make a new hero section", "make a new"));
        assert!(!contains_phrase("update the address", "add"));
        assert!(!contains_phrase("fix the padding", "add"));
        assert!(!contains_phrase("renew the banner", "new"));
    }

    #[test]
    fn address_edit_is_not_a_new_entity() {
        let mut files = project();
        files.insert(
            "src/components/Contact.jsx".into(),
            file("src/components/Contact.jsx", "<p>address: 1 Main St</p>", false),
        );
        let scope = heuristic_scope("update the address section padding", &files);
        assert_eq!(scope.strategy, ModificationStrategy::TargetedNodes);
    }

    #[test]
    fn vague_request_falls_back_to_main_file() {
        let scope = heuristic_scope("zzzz qqqq", &project());
        assert_eq!(scope.strategy, ModificationStrategy::TargetedNodes);
        assert_eq!(scope.target_files, vec!["src/App.jsx"]);
    }

    #[test]
    fn oracle_reply_with_known_paths_is_used() {
        let reply = reweave_oracle::parse_reply(
            r#"{"strategy": "targeted_nodes", "target_files": ["src/components/Header.jsx", "src/Ghost.jsx"], "confidence": 0.9, "reasoning": "button lives in the header"}"#,
        );
        let scope = scope_from_reply(&reply, "rename the button", &project()).unwrap();
        assert_eq!(scope.strategy, ModificationStrategy::TargetedNodes);
        // Unknown paths are dropped.
        assert_eq!(scope.target_files, vec!["src/components/Header.jsx"]);
        assert_eq!(scope.reasoning, "button lives in the header");
    }

    #[test]
    fn low_confidence_reply_is_discarded() {
        let reply = reweave_oracle::parse_reply(
            r#"{"strategy": "full_file", "target_files": ["src/App.jsx"], "confidence": 0.2}"#,
        );
        assert!(scope_from_reply(&reply, "r", &project()).is_none());
    }

    #[test]
    fn unknown_strategy_is_discarded() {
        let reply = reweave_oracle::parse_reply(
            r#"{"strategy": "rewrite_everything", "confidence": 0.9}"#,
        );
        assert!(scope_from_reply(&reply, "r", &project()).is_none());
    }

    #[test]
    fn edit_strategy_without_targets_is_discarded() {
        let reply = reweave_oracle::parse_reply(
            r#"{"strategy": "targeted_nodes", "target_files": [], "confidence": 0.9}"#,
        );
        assert!(scope_from_reply(&reply, "r", &project()).is_none());
    }

    #[test]
    fn component_addition_reply_fills_entity_from_heuristic_when_missing() {
        let reply = reweave_oracle::parse_reply(
            r#"{"strategy": "component_addition", "confidence": 0.8}"#,
        );
        let scope = scope_from_reply(&reply, "add a Pricing page", &project()).unwrap();
        let entity = scope.new_entity.unwrap();
        assert_eq!(entity.name, "Pricing");
        assert_eq!(entity.kind, EntityKind::Page);
    }
}
