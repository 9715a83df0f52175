// src/gateway/openai_compat.rs — Generic OpenAI-compatible backend
//
// Targets local llama-server / vLLM / Ollama endpoints as well as hosted
// OpenAI-compatible APIs. One POST per generation call, no shared state.

use async_trait::async_trait;
use serde_json::json;

use super::{CompletionRequest, CompletionResponse, GeneratorBackend, TokenUsage};
use crate::infra::errors::AgentError;

pub struct OpenAICompatBackend {
    id_str: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAICompatBackend {
    pub fn new(id: impl Into<String>, base_url: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            id_str: id.into(),
            base_url: base_url.into(),
            api_key,
            client: reqwest::Client::new(),
        }
    }

    fn error(&self, message: String, retriable: bool) -> AgentError {
        AgentError::Generation {
            backend: self.id_str.clone(),
            message,
            retriable,
        }
    }
}

#[async_trait]
impl GeneratorBackend for OpenAICompatBackend {
    fn id(&self) -> &str {
        &self.id_str
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, AgentError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.prompt},
            ],
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        let mut req = self
            .client
            .post(&url)
            .header(
                "User-Agent",
                format!("tabiter/{}", env!("CARGO_PKG_VERSION")),
            )
            .json(&body);
        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {key}"));
        }

        let response = req.send().await.map_err(|e| {
            // Connection-level failures are transient from our side
            self.error(format!("request failed: {e}"), true)
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after_ms = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(0);
            return Err(AgentError::RateLimited {
                backend: self.id_str.clone(),
                retry_after_ms,
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.error(
                format!("HTTP {status}: {text}"),
                status.is_server_error(),
            ));
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.error(format!("malformed response: {e}"), false))?;

        let content = parsed["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| self.error("response missing message content".into(), false))?
            .to_string();

        let usage = TokenUsage {
            input_tokens: parsed["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            output_tokens: parsed["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(CompletionResponse { content, usage })
    }
}
