//! Targeted node mutation: batched replacement generation and line splicing.

use std::collections::HashMap;
use std::sync::Arc;

use reweave_markup::MarkupNode;
use reweave_oracle::{parse_reply, strip_code_fences, DynOracle};

use crate::prompts;

/// One generated replacement, tied to a node id from the current parse pass.
#[derive(Debug, Clone)]
pub struct NodeReplacement {
    pub node_id: u32,
    pub code: String,
    pub reasoning: String,
}

pub struct NodeMutator {
    oracle: Arc<DynOracle>,
}

impl NodeMutator {
    pub fn new(oracle: Arc<DynOracle>) -> Self {
        Self { oracle }
    }

    /// Replacements for all selected nodes of one file, requested in a single
    /// batched call so the oracle sees every edit it must keep consistent.
    /// Ids absent from the reply are skipped; an unusable reply yields an
    /// empty list, which callers report as a no-op.
    pub async fn generate(
        &self,
        path: &str,
        selected: &[MarkupNode],
        request: &str,
    ) -> reweave_types::Result<Vec<NodeReplacement>> {
        if selected.is_empty() {
            return Ok(Vec::new());
        }
        let text = self
            .oracle
            .complete("", &prompts::generate_replacements(request, path, selected))
            .await?;

        let reply = parse_reply(&text);
        let Some(items) = reply.array_field("replacements") else {
            tracing::debug!(path, "replacement reply had no usable array");
            return Ok(Vec::new());
        };

        let mut replacements = Vec::new();
        for item in items {
            let Some(node_id) = item_node_id(item) else {
                continue;
            };
            if !selected.iter().any(|n| n.id == node_id) {
                continue;
            }
            let Some(code) = item.get("code").and_then(|v| v.as_str()) else {
                continue;
            };
            let code = strip_code_fences(code);
            if code.is_empty() {
                continue;
            }
            replacements.push(NodeReplacement {
                node_id,
                code,
                reasoning: item
                    .get("reasoning")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        tracing::debug!(path, count = replacements.len(), "replacements generated");
        Ok(replacements)
    }
}

fn item_node_id(item: &serde_json::Value) -> Option<u32> {
    match item.get("node_id")? {
        serde_json::Value::Number(n) => n.as_u64().map(|n| n as u32),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Splice replacements into the original content by line range.
///
/// Nodes are processed in descending start-line order so a splice never
/// shifts the line numbers of nodes still to be processed. This ordering is
/// a correctness requirement. Single-line indentation of the first
/// replacement line follows the line it replaces.
pub fn apply(nodes: &[MarkupNode], replacements: &[NodeReplacement], original: &str) -> String {
    let by_id: HashMap<u32, &MarkupNode> = nodes.iter().map(|n| (n.id, n)).collect();
    let mut targets: Vec<(&MarkupNode, &str)> = replacements
        .iter()
        .filter_map(|r| by_id.get(&r.node_id).map(|n| (*n, r.code.as_str())))
        .collect();
    targets.sort_by(|a, b| b.0.start_line.cmp(&a.0.start_line));

    let mut lines: Vec<String> = original.lines().map(String::from).collect();
    for (node, code) in targets {
        let start = node.start_line.saturating_sub(1);
        let end = node.end_line.min(lines.len());
        if start >= lines.len() || start >= end {
            continue;
        }
        let indent: String = lines[start]
            .chars()
            .take_while(|c| c.is_whitespace())
            .collect();
        let replacement: Vec<String> = code
            .lines()
            .enumerate()
            .map(|(i, line)| {
                if i == 0 && !line.starts_with(char::is_whitespace) {
                    format!("{indent}{line}")
                } else {
                    line.to_string()
                }
            })
            .collect();
        lines.splice(start..end, replacement);
    }

    let mut out = lines.join("\n");
    if original.ends_with('\n') {
        out.push('\n');
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
