use async_trait::async_trait;

use reweave_types::Result;

// ---------------------------------------------------------------------------
// Oracle
// ---------------------------------------------------------------------------

/// External text-completion service consulted for classification, node
/// selection, and code generation.
///
/// `context` is the standing system context (project summary, file content);
/// `prompt` is the per-call instruction. Implementations return raw text —
/// callers are responsible for defensive parsing via [`crate::parse_reply`].
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn complete(&self, context: &str, prompt: &str) -> Result<String>;
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// DynOracle
// ---------------------------------------------------------------------------

pub struct DynOracle(Box<dyn Oracle>);

impl DynOracle {
    pub fn new(oracle: impl Oracle + 'static) -> Self {
        Self(Box::new(oracle))
    }

    pub async fn complete(&self, context: &str, prompt: &str) -> Result<String> {
        self.0.complete(context, prompt).await
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct MockOracle;

    #[async_trait]
    impl Oracle for MockOracle {
        async fn complete(&self, context: &str, prompt: &str) -> Result<String> {
            Ok(format!("ctx={} prompt={}", context.len(), prompt.len()))
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    #[tokio::test]
    async fn dyn_oracle_complete() {
        let oracle = DynOracle::new(MockOracle);
        let reply = oracle.complete("abc", "de").await.unwrap();
        assert_eq!(reply, "ctx=3 prompt=2");
    }

    #[test]
    fn dyn_oracle_name() {
        let oracle = DynOracle::new(MockOracle);
        assert_eq!(oracle.name(), "mock");
    }

    #[tokio::test]
    async fn dyn_oracle_behind_arc() {
        let oracle = std::sync::Arc::new(DynOracle::new(MockOracle));
        let reply = oracle.complete("", "").await.unwrap();
        assert_eq!(reply, "ctx=0 prompt=0");
    }
}
