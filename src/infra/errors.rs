// src/infra/errors.rs — Error types for tabiter

use thiserror::Error;

/// Fault taxonomy for the control core.
///
/// Execution failures of generated scripts are NOT errors — they are a
/// typed `OutcomeStatus` on the sandbox outcome. Only infrastructure-level
/// faults travel through this enum.
#[derive(Error, Debug)]
pub enum AgentError {
    // Generation backend errors (possibly retriable)
    #[error("Backend '{backend}' error: {message}")]
    Generation {
        backend: String,
        message: String,
        retriable: bool,
    },

    #[error("Rate limited by '{backend}', retry after {retry_after_ms}ms")]
    RateLimited { backend: String, retry_after_ms: u64 },

    // Fatal at INITIALIZING — no partial run starts
    #[error("Configuration error: {0}")]
    Configuration(String),

    // Fatal mid-run — sandbox cannot spawn, workdir cannot be allocated, ...
    #[error("Infrastructure fault: {0}")]
    Infrastructure(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            AgentError::Generation {
                retriable: true,
                ..
            } | AgentError::RateLimited { .. }
        )
    }

    /// Faults that abort the run with `TerminationReason::FatalError`.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Configuration(_)
                | AgentError::Infrastructure(_)
                | AgentError::Database(_)
                | AgentError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_generation_error() {
        let err = AgentError::Generation {
            backend: "llama-server".into(),
            message: "HTTP 503".into(),
            retriable: true,
        };
        assert!(err.is_retriable());
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_rate_limited_is_retriable() {
        let err = AgentError::RateLimited {
            backend: "llama-server".into(),
            retry_after_ms: 2000,
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn test_configuration_error_is_fatal() {
        let err = AgentError::Configuration("no train.csv".into());
        assert!(err.is_fatal());
        assert!(!err.is_retriable());
    }

    #[test]
    fn test_infrastructure_fault_is_fatal() {
        let err = AgentError::Infrastructure("cannot allocate workdir".into());
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_output_not_retriable() {
        let err = AgentError::Generation {
            backend: "llama-server".into(),
            message: "empty completion".into(),
            retriable: false,
        };
        assert!(!err.is_retriable());
    }
}
