// src/sandbox/mod.rs — Execution sandbox for generated scripts

pub mod executor;

pub use executor::Sandbox;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How a sandboxed execution ended.
///
/// A failing user script is never an error — it is one of these statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    RuntimeError,
    Timeout,
    ResourceExceeded,
}

impl std::fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutcomeStatus::Success => write!(f, "success"),
            OutcomeStatus::RuntimeError => write!(f, "runtime_error"),
            OutcomeStatus::Timeout => write!(f, "timeout"),
            OutcomeStatus::ResourceExceeded => write!(f, "resource_exceeded"),
        }
    }
}

/// Resource limits for one execution.
#[derive(Debug, Clone, Copy)]
pub struct ResourceBudget {
    pub timeout: Duration,
    pub memory_ceiling_bytes: u64,
}

impl Default for ResourceBudget {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            memory_ceiling_bytes: 4 * 1024 * 1024 * 1024,
        }
    }
}

/// One code artifact to run, with its limits and staged inputs.
///
/// Created fresh per phase attempt; the sandbox owns it for the duration
/// of one run. `inputs` are file names copied from the data directory
/// into the scoped working directory — the only way artifacts from a
/// previous execution become visible to the next one.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub source: String,
    pub budget: ResourceBudget,
    pub inputs: Vec<String>,
}

impl ExecutionRequest {
    pub fn new(source: impl Into<String>, budget: ResourceBudget) -> Self {
        Self {
            source: source.into(),
            budget,
            inputs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<String>) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Immutable result of running an `ExecutionRequest`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    pub stdout: String,
    pub stderr: String,
    /// File names the script created or rewrote, collected back into
    /// the data directory, captured on success and failure alike.
    pub artifacts: Vec<String>,
    /// Numeric score, filled by the phase pipeline when the phase
    /// contract declares one.
    pub score: Option<f64>,
    pub duration: Duration,
}

impl ExecutionOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Synthetic success for phases that produce analysis text only and
    /// never enter the sandbox (the Understanding phase).
    pub fn analysis() -> Self {
        Self {
            status: OutcomeStatus::Success,
            stdout: String::new(),
            stderr: String::new(),
            artifacts: Vec::new(),
            score: None,
            duration: Duration::ZERO,
        }
    }

    /// Synthetic runtime error carrying a generation failure message, so
    /// a backend that never produced runnable code still leaves an
    /// inspectable outcome on the record.
    pub fn generation_failed(message: &str) -> Self {
        Self {
            status: OutcomeStatus::RuntimeError,
            stdout: String::new(),
            stderr: message.to_string(),
            artifacts: Vec::new(),
            score: None,
            duration: Duration::ZERO,
        }
    }

    /// First non-empty line of stderr, for digest summaries and retry
    /// prompts.
    pub fn error_head(&self) -> Option<&str> {
        self.stderr.lines().map(str::trim).find(|l| !l.is_empty())
    }
}

/// Scan stdout lines in reverse for the last parseable JSON object.
/// Generated scripts print their structured result as a final JSON line.
pub fn last_json_line(stdout: &str) -> Option<serde_json::Value> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str(l).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_display() {
        assert_eq!(OutcomeStatus::Success.to_string(), "success");
        assert_eq!(OutcomeStatus::RuntimeError.to_string(), "runtime_error");
        assert_eq!(OutcomeStatus::Timeout.to_string(), "timeout");
        assert_eq!(
            OutcomeStatus::ResourceExceeded.to_string(),
            "resource_exceeded"
        );
    }

    #[test]
    fn test_last_json_line_picks_final_object() {
        let stdout = "loading data\n{\"cv_score\": 0.71}\nextra noise\n{\"cv_score\": 0.74}\n";
        let v = last_json_line(stdout).unwrap();
        assert_eq!(v["cv_score"].as_f64(), Some(0.74));
    }

    #[test]
    fn test_last_json_line_skips_garbage() {
        let stdout = "{not json\nplain line\n";
        assert!(last_json_line(stdout).is_none());
    }

    #[test]
    fn test_last_json_line_empty() {
        assert!(last_json_line("").is_none());
    }

    #[test]
    fn test_error_head_skips_blank_lines() {
        let outcome = ExecutionOutcome {
            status: OutcomeStatus::RuntimeError,
            stdout: String::new(),
            stderr: "\n\nTraceback (most recent call last):\n  ...\n".into(),
            artifacts: vec![],
            score: None,
            duration: Duration::ZERO,
        };
        assert_eq!(
            outcome.error_head(),
            Some("Traceback (most recent call last):")
        );
    }

    #[test]
    fn test_analysis_outcome_is_success() {
        let outcome = ExecutionOutcome::analysis();
        assert!(outcome.succeeded());
        assert!(outcome.score.is_none());
    }

    #[test]
    fn test_generation_failed_outcome() {
        let outcome = ExecutionOutcome::generation_failed("backend unreachable");
        assert_eq!(outcome.status, OutcomeStatus::RuntimeError);
        assert_eq!(outcome.error_head(), Some("backend unreachable"));
    }
}
