// src/gateway/mod.rs — Model gateway: role-based generation backends

pub mod openai_compat;
pub mod retry;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::infra::errors::AgentError;
use retry::RetryPolicy;

/// Which kind of generator serves a request. Callers never know which
/// concrete backend or model is bound to a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorRole {
    Reasoning,
    Code,
}

impl GeneratorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeneratorRole::Reasoning => "reasoning",
            GeneratorRole::Code => "code",
        }
    }
}

impl std::fmt::Display for GeneratorRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One request/response exchange with a backend. No state is shared
/// between calls beyond what the request carries.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Core trait all generation backends implement.
#[async_trait]
pub trait GeneratorBackend: Send + Sync {
    fn id(&self) -> &str;

    async fn complete(&self, request: CompletionRequest)
        -> Result<CompletionResponse, AgentError>;
}

/// What a generation call produced: the raw completion, plus the
/// fence-extracted script for the code role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedArtifact {
    pub role: GeneratorRole,
    pub raw: String,
    pub code: String,
    pub usage: TokenUsage,
}

/// A backend plus the model it serves a role with.
#[derive(Clone)]
pub struct RoleBinding {
    pub backend: Arc<dyn GeneratorBackend>,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl RoleBinding {
    pub fn new(backend: Arc<dyn GeneratorBackend>, model: impl Into<String>) -> Self {
        Self {
            backend,
            model: model.into(),
            max_tokens: 4096,
            temperature: 0.3,
        }
    }

    pub fn with_sampling(mut self, max_tokens: u32, temperature: f32) -> Self {
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }
}

/// Dispatches generation requests to the backend bound to each role,
/// retrying transient failures a bounded number of times.
pub struct ModelGateway {
    reasoning: RoleBinding,
    code: RoleBinding,
    retry: RetryPolicy,
}

impl ModelGateway {
    pub fn new(reasoning: RoleBinding, code: RoleBinding) -> Self {
        Self {
            reasoning,
            code,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn binding(&self, role: GeneratorRole) -> &RoleBinding {
        match role {
            GeneratorRole::Reasoning => &self.reasoning,
            GeneratorRole::Code => &self.code,
        }
    }

    /// Generate for a role. The context digest, when present, is
    /// prepended to the prompt so the backend sees prior-iteration
    /// history without any shared state.
    pub async fn generate(
        &self,
        role: GeneratorRole,
        system: &str,
        prompt: &str,
        digest: Option<&str>,
    ) -> Result<GeneratedArtifact, AgentError> {
        let binding = self.binding(role);
        let prompt = match digest {
            Some(d) if !d.is_empty() => format!("{d}\n\n{prompt}"),
            _ => prompt.to_string(),
        };

        let request = CompletionRequest {
            model: binding.model.clone(),
            system: system.to_string(),
            prompt,
            max_tokens: binding.max_tokens,
            temperature: binding.temperature,
        };

        let response = self
            .retry
            .run(|| binding.backend.complete(request.clone()))
            .await?;

        if response.content.trim().is_empty() {
            return Err(AgentError::Generation {
                backend: binding.backend.id().to_string(),
                message: "empty completion".into(),
                retriable: false,
            });
        }

        let code = match role {
            GeneratorRole::Code => extract_code(&response.content),
            GeneratorRole::Reasoning => response.content.clone(),
        };

        Ok(GeneratedArtifact {
            role,
            raw: response.content,
            code,
            usage: response.usage,
        })
    }
}

/// Pull the script out of a markdown-fenced completion: a `python` fence
/// first, any fence second, the raw text as a last resort.
pub fn extract_code(content: &str) -> String {
    if let Some(start) = content.find("```python") {
        let body = &content[start + "```python".len()..];
        if let Some(end) = body.find("```") {
            return body[..end].trim().to_string();
        }
    }

    if let Some(start) = content.find("```") {
        let body = &content[start + 3..];
        // Skip a language tag on the fence line
        let body = match body.find('\n') {
            Some(nl) => &body[nl + 1..],
            None => body,
        };
        if let Some(end) = body.find("```") {
            return body[..end].trim().to_string();
        }
    }

    content.trim().to_string()
}
