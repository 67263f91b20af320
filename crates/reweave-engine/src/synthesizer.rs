//! New-component synthesis: classification, generation, and route wiring.
//!
//! Every step has a deterministic fallback, so this path always yields a
//! concrete file even when the oracle is down or replies with garbage.

use std::sync::Arc;

use reweave_oracle::{parse_reply, strip_code_fences, DynOracle};
use reweave_types::{EntityKind, Result, ReweaveError};

use crate::classify::contains_phrase;
use crate::prompts;

const CONFIDENCE_FLOOR: f64 = 0.5;
const HEURISTIC_CONFIDENCE: f64 = 0.4;

const PAGE_NOUNS: &[&str] = &[
    "about", "contact", "pricing", "faq", "blog", "terms", "privacy", "dashboard", "profile",
    "landing", "careers", "team", "services",
];

const COMPONENT_NOUNS: &[&str] = &[
    "button", "navbar", "header", "footer", "card", "modal", "form", "carousel", "widget",
    "banner", "sidebar", "hero", "gallery", "testimonial", "slider",
];

const NAME_STOPWORDS: &[&str] = &[
    "add", "create", "build", "make", "a", "an", "the", "new", "page", "component", "section",
    "screen", "view", "to", "for", "my", "our", "site", "app", "website", "please", "with", "and",
];

/// Outcome of classifying a new-entity request.
#[derive(Debug, Clone)]
pub struct Classification {
    pub name: String,
    pub kind: EntityKind,
    pub confidence: f64,
    pub reasoning: String,
}

pub struct ComponentSynthesizer {
    oracle: Arc<DynOracle>,
}

impl ComponentSynthesizer {
    pub fn new(oracle: Arc<DynOracle>) -> Self {
        Self { oracle }
    }

    /// Page-or-component decision. Oracle first; the keyword heuristic takes
    /// over on failure or low confidence, so classification never blocks on
    /// oracle availability.
    pub async fn classify(&self, request: &str) -> Classification {
        match self
            .oracle
            .complete("", &prompts::classify_entity(request))
            .await
        {
            Ok(text) => {
                let reply = parse_reply(&text);
                let name = reply.str_field("name").filter(|n| !n.is_empty());
                let kind = match reply.str_field("kind").as_deref() {
                    Some("page") => Some(EntityKind::Page),
                    Some("component") => Some(EntityKind::Component),
                    _ => None,
                };
                let confidence = reply.f64_field("confidence").unwrap_or(0.0);
                if let (Some(name), Some(kind)) = (name, kind) {
                    if confidence >= CONFIDENCE_FLOOR {
                        return Classification {
                            name: sanitize_name(&name),
                            kind,
                            confidence,
                            reasoning: reply
                                .str_field("reasoning")
                                .unwrap_or_else(|| "oracle classification".into()),
                        };
                    }
                    let ambiguity = ReweaveError::ClassificationAmbiguity {
                        confidence,
                        message: format!("entity reply for '{name}' below the confidence floor"),
                    };
                    tracing::debug!(error = %ambiguity, "discarding oracle entity classification");
                } else {
                    tracing::debug!("entity reply unusable; falling back to heuristic");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "entity oracle call failed; falling back to heuristic");
            }
        }
        let (name, kind, confidence) = heuristic_entity(request);
        Classification {
            name,
            kind,
            confidence,
            reasoning: "keyword heuristic classification".into(),
        }
    }

    /// Source text for the new entity. Oracle failure or an empty reply
    /// falls through to a minimal deterministic template; this method cannot
    /// fail.
    pub async fn generate(
        &self,
        request: &str,
        classification: &Classification,
        project_context: &str,
    ) -> String {
        let prompt = prompts::generate_entity(
            request,
            &classification.name,
            classification.kind,
            project_context,
        );
        match self.oracle.complete(project_context, &prompt).await {
            Ok(text) => {
                let source = strip_code_fences(&text);
                if !source.trim().is_empty() {
                    return source;
                }
                tracing::warn!(name = %classification.name, "empty generation; using template");
            }
            Err(e) => {
                tracing::warn!(name = %classification.name, error = %e, "generation failed; using template");
            }
        }
        emergency_template(&classification.name, request)
    }

    /// Splice an import and a route entry into the composition root. Oracle
    /// first; a deterministic splice takes over when the reply is unusable.
    /// Fails only when the root has no route block at all.
    pub async fn wire_route(
        &self,
        root_path: &str,
        root_content: &str,
        name: &str,
        kind_folder: &str,
    ) -> Result<(String, String)> {
        let route = route_path(name);
        let import_path = format!("./{kind_folder}/{name}");
        match self
            .oracle
            .complete("", &prompts::wire_route(root_path, root_content, name, &route))
            .await
        {
            Ok(text) => {
                let content = strip_code_fences(&text);
                // The rewrite must mention both the component and the route,
                // and cannot have collapsed the file.
                if content.contains(name)
                    && content.contains(&route)
                    && content.len() * 2 >= root_content.len()
                {
                    return Ok((content, route));
                }
                tracing::debug!(root_path, "oracle wiring unusable; deterministic splice");
            }
            Err(e) => {
                tracing::warn!(root_path, error = %e, "wiring oracle failed; deterministic splice");
            }
        }
        match deterministic_wire(root_content, name, &import_path, &route) {
            Some(content) => Ok((content, route)),
            None => Err(ReweaveError::Other(format!(
                "no route block found in {root_path}"
            ))),
        }
    }
}

/// Keyword classification: explicit kind words win, then noun vocabularies.
/// The name is the first non-boilerplate words of the request, PascalCased.
pub(crate) fn heuristic_entity(request: &str) -> (String, EntityKind, f64) {
    let lower = request.to_lowercase();

    let name_parts: Vec<String> = request
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty() && !NAME_STOPWORDS.contains(&w.to_lowercase().as_str()))
        .take(2)
        .map(pascal)
        .collect();
    let name = if name_parts.is_empty() {
        "NewSection".to_string()
    } else {
        name_parts.concat()
    };

    let kind = if contains_phrase(&lower, "component") || contains_phrase(&lower, "widget") {
        EntityKind::Component
    } else if contains_phrase(&lower, "page") {
        EntityKind::Page
    } else if COMPONENT_NOUNS.iter().any(|n| contains_phrase(&lower, n)) {
        EntityKind::Component
    } else if PAGE_NOUNS.iter().any(|n| contains_phrase(&lower, n)) {
        EntityKind::Page
    } else {
        EntityKind::Component
    };

    (name, kind, HEURISTIC_CONFIDENCE)
}

fn pascal(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

fn sanitize_name(name: &str) -> String {
    let cleaned: String = name.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    if cleaned.is_empty() {
        "NewSection".to_string()
    } else {
        pascal(&cleaned)
    }
}

/// `/about-us` for `AboutUs`.
pub(crate) fn route_path(name: &str) -> String {
    let mut out = String::from("/");
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Minimal deterministic source, used when every oracle path failed.
fn emergency_template(name: &str, request: &str) -> String {
    let title = title_of(name);
    let blurb = request.trim().replace(['{', '}', '<', '>'], "");
    format!(
        "export default function {name}() {{\n  return (\n    <div className=\"{slug}\">\n      <h1>{title}</h1>\n      <p>{blurb}</p>\n    </div>\n  );\n}}\n",
        slug = route_path(name).trim_start_matches('/'),
    )
}

/// `About Us` for `AboutUs`.
fn title_of(name: &str) -> String {
    let mut out = String::new();
    for (i, c) in name.chars().enumerate() {
        if c.is_ascii_uppercase() && i > 0 {
            out.push(' ');
        }
        out.push(c);
    }
    out
}

/// Insert the import after the last import line and the route entry before
/// `</Routes>`. `None` when the root has no closing route tag to anchor on.
fn deterministic_wire(root: &str, name: &str, import_path: &str, route: &str) -> Option<String> {
    if root.contains(&format!("path=\"{route}\"")) {
        return Some(root.to_string());
    }
    let lines: Vec<&str> = root.lines().collect();
    let close_idx = lines.iter().position(|l| l.contains("</Routes>"))?;
    let last_import = lines
        .iter()
        .rposition(|l| l.trim_start().starts_with("import "));
    let has_import = root.contains(&format!("import {name} "));

    let close_indent: String = lines[close_idx]
        .chars()
        .take_while(|c| c.is_whitespace())
        .collect();
    let route_line = format!("{close_indent}  <Route path=\"{route}\" element={{<{name} />}} />");
    let import_line = format!("import {name} from '{import_path}';");

    let mut out: Vec<String> = Vec::with_capacity(lines.len() + 2);
    if !has_import && last_import.is_none() {
        out.push(import_line.clone());
    }
    for (i, line) in lines.iter().enumerate() {
        if i == close_idx {
            out.push(route_line.clone());
        }
        out.push(line.to_string());
        if !has_import && last_import == Some(i) {
            out.push(import_line.clone());
        }
    }

    let mut joined = out.join("\n");
    if root.ends_with('\n') {
        joined.push('\n');
    }
    Some(joined)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reweave_oracle::Oracle;

    const ROOT: &str = "import Home from './pages/Home';\n\nexport default function App() {\n  return (\n    <Routes>\n      <Route path=\"/\" element={<Home />} />\n    </Routes>\n  );\n}\n";

    struct FixedOracle(&'static str);

    #[async_trait]
    impl Oracle for FixedOracle {
        async fn complete(&self, _context: &str, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    struct FailingOracle;

    #[async_trait]
    impl Oracle for FailingOracle {
        async fn complete(&self, _context: &str, _prompt: &str) -> Result<String> {
            Err(ReweaveError::OracleTimeout {
                provider: "fixed".into(),
                timeout_ms: 1,
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn with_reply(reply: &'static str) -> ComponentSynthesizer {
        ComponentSynthesizer::new(Arc::new(DynOracle::new(FixedOracle(reply))))
    }

    fn failing() -> ComponentSynthesizer {
        ComponentSynthesizer::new(Arc::new(DynOracle::new(FailingOracle)))
    }

    // --- heuristics ---

    #[test]
    fn about_page_request_classifies_as_page() {
        let (name, kind, _) = heuristic_entity("add an About page");
        assert_eq!(name, "About");
        assert_eq!(kind, EntityKind::Page);
    }

    #[test]
    fn explicit_component_word_wins_over_page_nouns() {
        let (name, kind, _) = heuristic_entity("create a contact form component");
        assert_eq!(name, "ContactForm");
        assert_eq!(kind, EntityKind::Component);
    }

    #[test]
    fn widget_nouns_classify_as_component() {
        let (_, kind, _) = heuristic_entity("add a testimonial carousel");
        assert_eq!(kind, EntityKind::Component);
    }

    #[test]
    fn boilerplate_only_request_gets_a_default_name() {
        let (name, _, _) = heuristic_entity("add a new page");
        assert_eq!(name, "NewSection");
    }

    #[test]
    fn route_paths_are_kebab_case() {
        assert_eq!(route_path("About"), "/about");
        assert_eq!(route_path("AboutUs"), "/about-us");
        assert_eq!(route_path("FAQ"), "/f-a-q");
    }

    // --- classify ---

    #[tokio::test]
    async fn oracle_classification_is_used_when_confident() {
        let c = with_reply(r#"{"name": "Pricing", "kind": "page", "confidence": 0.9, "reasoning": "own route"}"#)
            .classify("add a pricing page")
            .await;
        assert_eq!(c.name, "Pricing");
        assert_eq!(c.kind, EntityKind::Page);
        assert_eq!(c.reasoning, "own route");
    }

    #[tokio::test]
    async fn unparsable_classification_falls_back_to_heuristic() {
        let c = with_reply("that sounds like a great idea!")
            .classify("add an About page")
            .await;
        assert_eq!(c.name, "About");
        assert_eq!(c.kind, EntityKind::Page);
        assert!(c.confidence < CONFIDENCE_FLOOR);
    }

    #[tokio::test]
    async fn oracle_failure_falls_back_to_heuristic() {
        let c = failing().classify("add a hero banner component").await;
        assert_eq!(c.kind, EntityKind::Component);
    }

    // --- generate ---

    #[tokio::test]
    async fn generated_source_is_unfenced() {
        let c = Classification {
            name: "About".into(),
            kind: EntityKind::Page,
            confidence: 0.9,
            reasoning: String::new(),
        };
        let source = with_reply("```jsx\nexport default function About() {}\n```")
            .generate("add an About page", &c, "")
            .await;
        assert_eq!(source, "export default function About() {}");
    }

    #[tokio::test]
    async fn generation_failure_yields_the_emergency_template() {
        let c = Classification {
            name: "AboutUs".into(),
            kind: EntityKind::Page,
            confidence: 0.4,
            reasoning: String::new(),
        };
        let source = failing().generate("add an about us page", &c, "").await;
        assert!(source.contains("export default function AboutUs()"));
        assert!(source.contains("<h1>About Us</h1>"));
    }

    // --- wiring ---

    #[test]
    fn deterministic_wire_adds_import_and_route() {
        let out = deterministic_wire(ROOT, "About", "./pages/About", "/about").unwrap();
        assert!(out.contains("import About from './pages/About';"));
        let route_pos = out.find("path=\"/about\"").unwrap();
        let close_pos = out.find("</Routes>").unwrap();
        assert!(route_pos < close_pos);
        // Existing route untouched.
        assert!(out.contains("path=\"/\""));
    }

    #[test]
    fn deterministic_wire_is_idempotent_for_existing_routes() {
        let wired = deterministic_wire(ROOT, "About", "./pages/About", "/about").unwrap();
        let again = deterministic_wire(&wired, "About", "./pages/About", "/about").unwrap();
        assert_eq!(wired, again);
    }

    #[test]
    fn roots_without_a_route_block_cannot_be_wired() {
        assert!(deterministic_wire("<div>static</div>", "About", "./pages/About", "/about").is_none());
    }

    #[tokio::test]
    async fn wire_route_uses_deterministic_splice_when_oracle_fails() {
        let (content, route) = failing()
            .wire_route("src/App.jsx", ROOT, "About", "pages")
            .await
            .unwrap();
        assert_eq!(route, "/about");
        assert!(content.contains("import About"));
        assert!(content.contains("path=\"/about\""));
    }

    #[tokio::test]
    async fn wire_route_rejects_collapsed_oracle_rewrites() {
        // Oracle "rewrote" the file down to almost nothing; splice instead.
        let (content, _) = with_reply("<About /> /about")
            .wire_route("src/App.jsx", ROOT, "About", "pages")
            .await
            .unwrap();
        assert!(content.contains("</Routes>"));
    }

    #[tokio::test]
    async fn wire_route_fails_only_without_any_route_block() {
        let err = failing()
            .wire_route("src/App.jsx", "<div/>", "About", "pages")
            .await
            .unwrap_err();
        assert!(err.is_recoverable() || matches!(err, ReweaveError::Other(_)));
    }
}
