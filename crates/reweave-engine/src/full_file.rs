//! Whole-file regeneration for cross-cutting requests.

use std::sync::Arc;

use reweave_oracle::{strip_code_fences, DynOracle};
use reweave_types::{Result, ReweaveError};

use crate::prompts;

pub struct FullFileMutator {
    oracle: Arc<DynOracle>,
}

impl FullFileMutator {
    pub fn new(oracle: Arc<DynOracle>) -> Self {
        Self { oracle }
    }

    /// Regenerate the whole body of one file. An empty or fence-only reply is
    /// a per-file error; the orchestrator records it and moves on to
    /// siblings.
    pub async fn regenerate(
        &self,
        path: &str,
        current: &str,
        request: &str,
        project_context: &str,
    ) -> Result<String> {
        let text = self
            .oracle
            .complete(
                project_context,
                &prompts::regenerate_file(request, path, current, project_context),
            )
            .await?;
        let content = strip_code_fences(&text);
        if content.trim().is_empty() {
            return Err(ReweaveError::OracleReplyError {
                message: format!("empty regeneration for {path}"),
            });
        }
        tracing::debug!(path, bytes = content.len(), "file regenerated");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reweave_oracle::Oracle;

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

    fn mutator(reply: &'static str) -> FullFileMutator {
        FullFileMutator::new(Arc::new(DynOracle::new(FixedOracle(reply))))
    }

    #[tokio::test]
    async fn fenced_reply_is_unwrapped() {
        let out = mutator("```jsx\nexport default function App() {}\n```")
            .regenerate("src/App.jsx", "old", "dark theme", "ctx")
            .await
            .unwrap();
        assert_eq!(out, "export default function App() {}");
    }

    #[tokio::test]
    async fn plain_reply_passes_through() {
        let out = mutator("const a = 1;")
            .regenerate("src/App.jsx", "old", "r", "")
            .await
            .unwrap();
        assert_eq!(out, "const a = 1;");
    }

    #[tokio::test]
    async fn empty_reply_is_a_per_file_error() {
        let err = mutator("```\n\n```")
            .regenerate("src/App.jsx", "old", "r", "")
            .await
            .unwrap_err();
        assert!(matches!(err, ReweaveError::OracleReplyError { .. }));
        assert!(err.is_recoverable());
    }
}
