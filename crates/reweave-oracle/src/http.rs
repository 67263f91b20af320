use async_trait::async_trait;
use serde_json::json;

use crate::provider::Oracle;
use reweave_types::ReweaveError;

// ---------------------------------------------------------------------------
// HttpOracle
// ---------------------------------------------------------------------------

/// OpenAI-compatible chat-completions adapter. Any backend exposing the
/// `/v1/chat/completions` shape works via `with_base_url`.
#[derive(Debug)]
pub struct HttpOracle {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    timeout_ms: u64,
}

impl HttpOracle {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            client: reqwest::Client::new(),
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_ms: 60_000,
        }
    }

    pub fn from_env() -> Result<Self, ReweaveError> {
        let key = std::env::var("OPENAI_API_KEY").map_err(|_| ReweaveError::AuthError {
            provider: "openai".into(),
        })?;
        Ok(Self::new(key))
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn with_model(mut self, model: String) -> Self {
        self.model = model;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    fn build_request_body(&self, context: &str, prompt: &str) -> serde_json::Value {
        let mut messages = Vec::new();
        if !context.is_empty() {
            messages.push(json!({ "role": "system", "content": context }));
        }
        messages.push(json!({ "role": "user", "content": prompt }));
        json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.2,
        })
    }

    fn parse_response(&self, body: serde_json::Value) -> Result<String, ReweaveError> {
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string();
        if text.is_empty() {
            return Err(ReweaveError::OracleReplyError {
                message: "completion contained no message content".into(),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl Oracle for HttpOracle {
    async fn complete(&self, context: &str, prompt: &str) -> reweave_types::Result<String> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = self.build_request_body(context, prompt);

        tracing::debug!(model = %self.model, prompt_len = prompt.len(), "oracle request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .timeout(std::time::Duration::from_millis(self.timeout_ms))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ReweaveError::OracleTimeout {
                        provider: "openai".into(),
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    ReweaveError::OracleHttp {
                        provider: "openai".into(),
                        status: 0,
                        message: e.to_string(),
                        retryable: true,
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => ReweaveError::AuthError {
                    provider: "openai".into(),
                },
                code => ReweaveError::OracleHttp {
                    provider: "openai".into(),
                    status: code,
                    message,
                    retryable: code == 429 || code >= 500,
                },
            });
        }

        let body: serde_json::Value =
            response
                .json()
                .await
                .map_err(|e| ReweaveError::OracleReplyError {
                    message: format!("completion body was not JSON: {e}"),
                })?;
        self.parse_response(body)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
