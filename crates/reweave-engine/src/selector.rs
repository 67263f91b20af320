//! Per-file node selection.
//!
//! One oracle call per file asks for a yes/no plus an id subset over the
//! indexed nodes. Decisions are independent per file, which bounds prompt
//! size and keeps each decision separately auditable. Every failure mode
//! collapses to "no change".

use std::sync::Arc;

use reweave_markup::MarkupNode;
use reweave_oracle::{parse_reply, DynOracle, OracleReply};

use crate::prompts;

/// Outcome of one per-file selection decision.
#[derive(Debug, Clone)]
pub struct Selection {
    pub needs_change: bool,
    pub selected_ids: Vec<u32>,
    pub reasoning: String,
    pub confidence: f64,
}

impl Selection {
    fn no_change(reasoning: impl Into<String>) -> Self {
        Self {
            needs_change: false,
            selected_ids: Vec::new(),
            reasoning: reasoning.into(),
            confidence: 0.0,
        }
    }
}

pub struct NodeSelector {
    oracle: Arc<DynOracle>,
}

impl NodeSelector {
    pub fn new(oracle: Arc<DynOracle>) -> Self {
        Self { oracle }
    }

    /// A file with zero nodes never reaches the oracle. Oracle failure or a
    /// malformed reply yields `needs_change=false, confidence=0`, never an
    /// error.
    pub async fn select(&self, path: &str, nodes: &[MarkupNode], request: &str) -> Selection {
        if nodes.is_empty() {
            return Selection::no_change("no addressable elements in file");
        }

        let reply = match self
            .oracle
            .complete("", &prompts::select_nodes(request, path, nodes))
            .await
        {
            Ok(text) => parse_reply(&text),
            Err(e) => {
                tracing::warn!(path, error = %e, "selection oracle call failed");
                return Selection::no_change(format!("oracle unavailable: {e}"));
            }
        };

        let selection = selection_from_reply(&reply, nodes);
        tracing::debug!(
            path,
            needs_change = selection.needs_change,
            selected = selection.selected_ids.len(),
            "node selection decided"
        );
        selection
    }
}

fn selection_from_reply(reply: &OracleReply, nodes: &[MarkupNode]) -> Selection {
    let Some(needs_change) = reply.bool_field("needs_change") else {
        return Selection::no_change("oracle reply missing needs_change");
    };
    if !needs_change {
        return Selection {
            needs_change: false,
            selected_ids: Vec::new(),
            reasoning: reply
                .str_field("reasoning")
                .unwrap_or_else(|| "no change needed".into()),
            confidence: reply.f64_field("confidence").unwrap_or(0.0),
        };
    }

    // Ids the current parse pass never produced are dropped.
    let selected_ids: Vec<u32> = reply
        .id_list_field("selected_ids")
        .into_iter()
        .filter(|id| nodes.iter().any(|n| n.id == *id))
        .collect();
    if selected_ids.is_empty() {
        return Selection::no_change("oracle selected no valid node ids");
    }

    Selection {
        needs_change: true,
        selected_ids,
        reasoning: reply
            .str_field("reasoning")
            .unwrap_or_else(|| "oracle selection".into()),
        confidence: reply.f64_field("confidence").unwrap_or(0.0),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reweave_oracle::Oracle;
    use reweave_types::Result;

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
            Err(reweave_types::ReweaveError::OracleTimeout {
                provider: "fixed".into(),
                timeout_ms: 1,
            })
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    fn selector(reply: &'static str) -> NodeSelector {
        NodeSelector::new(Arc::new(DynOracle::new(FixedOracle(reply))))
    }

    fn sample_nodes() -> Vec<MarkupNode> {
        reweave_markup::index("<div><button>Sign In</button><p>hello</p></div>")
    }

    #[tokio::test]
    async fn zero_nodes_skips_the_oracle() {
        let selector = NodeSelector::new(Arc::new(DynOracle::new(FailingOracle)));
        let selection = selector.select("src/Empty.css", &[], "anything").await;
        assert!(!selection.needs_change);
        assert!(selection.selected_ids.is_empty());
    }

    #[tokio::test]
    async fn valid_reply_selects_existing_ids() {
        let nodes = sample_nodes();
        let button_id = nodes.iter().find(|n| n.tag == "button").unwrap().id;
        let selection = selector(
            r#"{"needs_change": true, "selected_ids": [1], "confidence": 0.9, "reasoning": "the sign-in button"}"#,
        )
        .select("src/App.jsx", &nodes, "rename the button")
        .await;
        assert!(selection.needs_change);
        assert_eq!(selection.selected_ids, vec![button_id]);
        assert!(selection.confidence > 0.8);
    }

    #[tokio::test]
    async fn ids_outside_the_parse_pass_are_dropped() {
        let nodes = sample_nodes();
        let selection = selector(r#"{"needs_change": true, "selected_ids": [99], "confidence": 0.9}"#)
            .select("src/App.jsx", &nodes, "r")
            .await;
        assert!(!selection.needs_change);
        assert_eq!(selection.confidence, 0.0);
    }

    #[tokio::test]
    async fn unparsable_reply_defaults_to_no_change() {
        let nodes = sample_nodes();
        let selection = selector("I would be happy to help with that!")
            .select("src/App.jsx", &nodes, "r")
            .await;
        assert!(!selection.needs_change);
        assert!(selection.selected_ids.is_empty());
        assert_eq!(selection.confidence, 0.0);
    }

    #[tokio::test]
    async fn oracle_failure_defaults_to_no_change() {
        let nodes = sample_nodes();
        let selector = NodeSelector::new(Arc::new(DynOracle::new(FailingOracle)));
        let selection = selector.select("src/App.jsx", &nodes, "r").await;
        assert!(!selection.needs_change);
        assert!(selection.reasoning.contains("oracle unavailable"));
    }

    #[tokio::test]
    async fn explicit_no_keeps_oracle_reasoning() {
        let nodes = sample_nodes();
        let selection = selector(r#"{"needs_change": "no", "confidence": 0.8, "reasoning": "file unrelated"}"#)
            .select("src/App.jsx", &nodes, "r")
            .await;
        assert!(!selection.needs_change);
        assert_eq!(selection.reasoning, "file unrelated");
        assert_eq!(selection.confidence, 0.8);
    }
}
