// src/infra/config.rs — Configuration loading (TOML)

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::infra::errors::AgentError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub models: ModelsConfig,

    #[serde(default)]
    pub memory: MemoryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum improvement iterations before the run stops.
    pub max_iterations: u32,
    /// Stop early once the best CV score reaches this value.
    pub target_score: Option<f64>,
    /// Wall-clock budget for the whole run, checked at iteration
    /// boundaries and clamped onto in-flight sandbox timeouts.
    pub run_budget_seconds: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            target_score: None,
            run_budget_seconds: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Interpreter used to run generated scripts.
    pub interpreter: String,
    /// Per-phase execution timeout.
    pub timeout_seconds: u64,
    /// Memory ceiling for a generated script's process tree.
    pub memory_ceiling_mb: u64,
    /// In-place regeneration attempts per phase on runtime errors.
    pub retry_limit: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            timeout_seconds: 300,
            memory_ceiling_mb: 4096,
            retry_limit: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    /// OpenAI-compatible endpoint (llama-server, vLLM, Ollama, ...).
    pub base_url: String,
    pub api_key: Option<String>,
    /// Model serving the `reasoning` role (plans, analysis).
    pub reasoning_model: String,
    /// Model serving the `code` role (generated scripts).
    pub code_model: String,
    /// Bounded retries for transient backend failures.
    pub max_retries: u32,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/v1".into(),
            api_key: None,
            reasoning_model: "llama-3.2-3b-instruct".into(),
            code_model: "qwen3-coder-30b".into(),
            max_retries: 2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget for the prior-attempt digest fed back into prompts.
    pub digest_token_budget: u32,
    /// Persist the audit trail to SQLite under the competition dir.
    pub archive: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            digest_token_budget: 2000,
            archive: true,
        }
    }
}

impl Config {
    /// Load `tabiter.toml` from the current directory, falling back to
    /// defaults when absent.
    pub fn load() -> Result<Self, AgentError> {
        let path = Path::new("tabiter.toml");
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| AgentError::Configuration(format!("{}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.run.max_iterations, 10);
        assert!(cfg.run.target_score.is_none());
        assert_eq!(cfg.sandbox.interpreter, "python3");
        assert_eq!(cfg.sandbox.timeout_seconds, 300);
        assert_eq!(cfg.sandbox.retry_limit, 3);
        assert_eq!(cfg.models.max_retries, 2);
        assert!(cfg.memory.archive);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [run]
            max_iterations = 5
            target_score = 0.85

            [sandbox]
            interpreter = "python3"
            timeout_seconds = 60
            memory_ceiling_mb = 1024
            retry_limit = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.run.max_iterations, 5);
        assert_eq!(cfg.run.target_score, Some(0.85));
        assert_eq!(cfg.sandbox.timeout_seconds, 60);
        // Unspecified sections come from Default
        assert_eq!(cfg.models.reasoning_model, "llama-3.2-3b-instruct");
        assert_eq!(cfg.memory.digest_token_budget, 2000);
    }

    #[test]
    fn test_bad_toml_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tabiter.toml");
        std::fs::write(&path, "run = \"not a table\"").unwrap();
        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }
}
