//! Prompt builders for the oracle calls the engine makes.
//!
//! Every prompt asks for JSON and names its fields; replies still go through
//! the defensive parser, so nothing here assumes the oracle complies.

use reweave_markup::MarkupNode;
use reweave_types::{EntityKind, ProjectFileMap};

const MAX_INVENTORY_FILES: usize = 40;
const MAX_NODES_IN_PROMPT: usize = 60;

/// One line per file: path plus the flags the classifier cares about.
pub fn project_summary(files: &ProjectFileMap) -> String {
    let mut paths: Vec<&String> = files.keys().collect();
    paths.sort();
    let mut out = String::from("Project files:\n");
    for path in paths.into_iter().take(MAX_INVENTORY_FILES) {
        let file = &files[path];
        let mut flags = Vec::new();
        if file.is_main_file {
            flags.push("main");
        }
        if file.has_buttons {
            flags.push("buttons");
        }
        if file.has_signin {
            flags.push("signin");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(","))
        };
        out.push_str(&format!("- {path} ({} lines){flags}\n", file.line_count));
    }
    out
}

pub fn classify_scope(request: &str, files: &ProjectFileMap) -> String {
    format!(
        "You are deciding how to apply a change request to a web project.\n\
         {}\n\
         Request: {request}\n\n\
         Choose exactly one strategy:\n\
         - \"targeted_nodes\": a small localized edit to existing elements\n\
         - \"full_file\": a cross-cutting change (theme, layout, overhaul) touching many elements\n\
         - \"component_addition\": the request asks for a new page or component\n\n\
         Reply with JSON only:\n\
         {{\"strategy\": \"...\", \"target_files\": [\"path\", ...], \"entity_name\": \"...\" or null, \
         \"entity_kind\": \"page\" or \"component\" or null, \"confidence\": 0.0-1.0, \"reasoning\": \"...\"}}",
        project_summary(files)
    )
}

pub fn select_nodes(request: &str, path: &str, nodes: &[MarkupNode]) -> String {
    let mut listing = String::new();
    for node in nodes.iter().take(MAX_NODES_IN_PROMPT) {
        listing.push_str(&format!(
            "[{}] <{}> line {}: {}\n",
            node.id,
            node.tag,
            node.start_line,
            if node.text.is_empty() { "(no text)" } else { &node.text }
        ));
    }
    format!(
        "File: {path}\n\
         Elements:\n{listing}\n\
         Request: {request}\n\n\
         Which elements (if any) must change to satisfy the request?\n\
         Reply with JSON only:\n\
         {{\"needs_change\": true/false, \"selected_ids\": [id, ...], \
         \"confidence\": 0.0-1.0, \"reasoning\": \"...\"}}"
    )
}

pub fn generate_replacements(request: &str, path: &str, nodes: &[MarkupNode]) -> String {
    let mut listing = String::new();
    for node in nodes {
        listing.push_str(&format!(
            "--- node {} (<{}>, lines {}-{}) ---\n{}\n",
            node.id, node.tag, node.start_line, node.end_line, node.code
        ));
    }
    format!(
        "File: {path}\n\
         Request: {request}\n\n\
         Rewrite each of the following elements to satisfy the request. Keep \
         surrounding structure and styling intact; change only what the request \
         demands. All replacements must be mutually consistent.\n\n{listing}\n\
         Reply with JSON only:\n\
         {{\"replacements\": [{{\"node_id\": id, \"code\": \"...\", \"reasoning\": \"...\"}}, ...]}}"
    )
}

pub fn regenerate_file(request: &str, path: &str, content: &str, project_context: &str) -> String {
    format!(
        "{project_context}\n\
         Request: {request}\n\n\
         Rewrite the entire file below so it satisfies the request. Preserve \
         everything the request does not ask to change. Reply with the complete \
         new file content only, no commentary.\n\n\
         File: {path}\n\
         ---\n{content}\n---"
    )
}

pub fn classify_entity(request: &str) -> String {
    format!(
        "A user asked to add something new to a web project.\n\
         Request: {request}\n\n\
         Decide whether this is a full page (own route) or a reusable component, \
         and give it a PascalCase name.\n\
         Reply with JSON only:\n\
         {{\"name\": \"PascalCaseName\", \"kind\": \"page\" or \"component\", \
         \"confidence\": 0.0-1.0, \"reasoning\": \"...\"}}"
    )
}

pub fn generate_entity(request: &str, name: &str, kind: EntityKind, project_context: &str) -> String {
    let kind_word = match kind {
        EntityKind::Page => "page",
        EntityKind::Component => "component",
    };
    format!(
        "{project_context}\n\
         Request: {request}\n\n\
         Write a complete React {kind_word} named {name} as a single JSX file \
         with a default export. Match the styling conventions visible in the \
         project context. Reply with the file content only, no commentary."
    )
}

pub fn wire_route(root_path: &str, root_content: &str, name: &str, route: &str) -> String {
    format!(
        "The file below is the composition root of a web project. A new page \
         component `{name}` now exists and must be reachable at `{route}`.\n\
         Add the import and the route entry; change nothing else. Reply with \
         the complete updated file content only, no commentary.\n\n\
         File: {root_path}\n\
         ---\n{root_content}\n---"
    )
}
