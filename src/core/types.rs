// src/core/types.rs — Core domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::gateway::{GeneratedArtifact, GeneratorRole};
use crate::infra::config::Config;
use crate::infra::errors::AgentError;
use crate::sandbox::ExecutionOutcome;

/// Immutable per-run facts about the competition. Resolved once at run
/// start, read-only thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitionContext {
    pub data_dir: PathBuf,
    pub target_column: String,
    pub metric: String,
    pub task_type: TaskType,
    pub available_files: Vec<String>,
    pub target_score: Option<f64>,
    pub max_iterations: u32,
}

impl CompetitionContext {
    /// Validate the data location and resolve target/metric. Any failure
    /// here is a `Configuration` error and no partial run starts.
    pub fn resolve(
        data_dir: &Path,
        metric: Option<&str>,
        target_column: Option<&str>,
        target_score: Option<f64>,
        max_iterations: u32,
    ) -> Result<Self, AgentError> {
        if !data_dir.is_dir() {
            return Err(AgentError::Configuration(format!(
                "data directory not found: {}",
                data_dir.display()
            )));
        }
        if max_iterations == 0 {
            return Err(AgentError::Configuration(
                "max_iterations must be positive".into(),
            ));
        }

        let train_path = data_dir.join("train.csv");
        if !train_path.is_file() {
            return Err(AgentError::Configuration(format!(
                "no train.csv in {}",
                data_dir.display()
            )));
        }

        let header = read_csv_header(&train_path)?;
        let target_column = match target_column {
            Some(col) => {
                if !header.iter().any(|h| h == col) {
                    return Err(AgentError::Configuration(format!(
                        "target column '{col}' not present in train.csv"
                    )));
                }
                col.to_string()
            }
            None => infer_target_column(&header).ok_or_else(|| {
                AgentError::Configuration("train.csv has no columns".into())
            })?,
        };

        let metric = metric.unwrap_or("unknown").to_string();
        let task_type = TaskType::infer(&metric);

        Ok(Self {
            available_files: list_data_files(data_dir),
            data_dir: data_dir.to_path_buf(),
            target_column,
            metric,
            task_type,
            target_score,
            max_iterations,
        })
    }
}

fn read_csv_header(path: &Path) -> Result<Vec<String>, AgentError> {
    let raw = std::fs::read_to_string(path)?;
    let first = raw.lines().next().unwrap_or("");
    Ok(first
        .split(',')
        .map(|c| c.trim().trim_matches('"').to_string())
        .filter(|c| !c.is_empty())
        .collect())
}

/// Common target names first, last column as the fallback guess.
fn infer_target_column(header: &[String]) -> Option<String> {
    for candidate in ["target", "Target", "label", "Label", "y", "class"] {
        if header.iter().any(|h| h == candidate) {
            return Some(candidate.to_string());
        }
    }
    header.last().cloned()
}

fn list_data_files(data_dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(data_dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| {
                    e.path()
                        .extension()
                        .map(|ext| ext == "csv" || ext == "parquet" || ext == "feather")
                        .unwrap_or(false)
                })
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect()
        })
        .unwrap_or_default();
    files.sort();
    files
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Classification,
    Regression,
    Unknown,
}

impl TaskType {
    /// Guess the task type from the evaluation metric's name.
    pub fn infer(metric: &str) -> Self {
        let metric = metric.to_lowercase();
        const CLASSIFICATION: &[&str] = &[
            "auc", "accuracy", "f1", "logloss", "log loss", "precision", "recall", "mcc", "kappa",
        ];
        const REGRESSION: &[&str] = &["rmsle", "rmse", "mse", "mae", "mape", "r2"];

        if CLASSIFICATION.iter().any(|m| metric.contains(m)) {
            TaskType::Classification
        } else if REGRESSION.iter().any(|m| metric.contains(m)) {
            TaskType::Regression
        } else {
            TaskType::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Classification => "classification",
            TaskType::Regression => "regression",
            TaskType::Unknown => "unknown",
        }
    }
}

/// Names of the five pipeline phases, in declared order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseName {
    Understanding,
    Eda,
    FeatureEngineering,
    Modeling,
    Ensemble,
}

impl PhaseName {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseName::Understanding => "understanding",
            PhaseName::Eda => "eda",
            PhaseName::FeatureEngineering => "feature_engineering",
            PhaseName::Modeling => "modeling",
            PhaseName::Ensemble => "ensemble",
        }
    }
}

impl std::fmt::Display for PhaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a phase declares it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputContract {
    /// Reasoning text only; never enters the sandbox.
    Analysis,
    /// An executable script; `expects_score` means the final stdout JSON
    /// line carries a `cv_score` field.
    Script { expects_score: bool },
}

/// Static identity of a phase: fixed at process start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub name: PhaseName,
    pub ordinal: usize,
    pub role: GeneratorRole,
    pub contract: OutputContract,
}

/// One phase's final attempt within an iteration: the generated artifact,
/// the execution outcome, and how many attempts it took.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    pub spec: PhaseSpec,
    pub artifact: GeneratedArtifact,
    pub outcome: ExecutionOutcome,
    pub attempts: u32,
    pub degraded: bool,
}

/// One full pass through the phase pipeline. Append-only: never mutated
/// after creation, and cross-iteration learning only ever reads these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    pub id: String,
    pub index: u32,
    pub phases: Vec<PhaseRecord>,
    /// Best submission score observed this iteration. `None` for a
    /// degraded or scoreless iteration — it never beats a scored one.
    pub overall_score: Option<f64>,
    pub degraded: bool,
    pub created_at: DateTime<Utc>,
}

impl IterationRecord {
    pub fn new(index: u32, phases: Vec<PhaseRecord>) -> Self {
        let degraded = phases.iter().any(|p| p.degraded);
        // Worst-possible-score substitution for degraded iterations
        // keeps best-so-far monotonic.
        let overall_score = if degraded {
            None
        } else {
            phases
                .iter()
                .filter_map(|p| p.outcome.score)
                .fold(None, |acc: Option<f64>, s| {
                    Some(acc.map_or(s, |a| a.max(s)))
                })
        };
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            index,
            phases,
            overall_score,
            degraded,
            created_at: Utc::now(),
        }
    }

    pub fn phase(&self, name: PhaseName) -> Option<&PhaseRecord> {
        self.phases.iter().find(|p| p.spec.name == name)
    }
}

/// Configuration injected into the control core at INITIALIZING. The
/// core never reads ambient global state mid-run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub max_iterations: u32,
    pub target_score: Option<f64>,
    pub phase_timeout: Duration,
    pub memory_ceiling_bytes: u64,
    pub retry_limit: u32,
    pub run_budget: Option<Duration>,
    pub digest_token_budget: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            target_score: None,
            phase_timeout: Duration::from_secs(300),
            memory_ceiling_bytes: 4 * 1024 * 1024 * 1024,
            retry_limit: 3,
            run_budget: None,
            digest_token_budget: 2000,
        }
    }
}

impl From<&Config> for EngineConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            max_iterations: cfg.run.max_iterations,
            target_score: cfg.run.target_score,
            phase_timeout: Duration::from_secs(cfg.sandbox.timeout_seconds),
            memory_ceiling_bytes: cfg.sandbox.memory_ceiling_mb * 1024 * 1024,
            retry_limit: cfg.sandbox.retry_limit,
            run_budget: cfg.run.run_budget_seconds.map(Duration::from_secs),
            digest_token_budget: cfg.memory.digest_token_budget,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    TargetReached,
    MaxIterations,
    FatalError,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::TargetReached => write!(f, "target_reached"),
            TerminationReason::MaxIterations => write!(f, "max_iterations"),
            TerminationReason::FatalError => write!(f, "fatal_error"),
        }
    }
}

/// Final run summary — the sole externally consumed output of the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub final_score: Option<f64>,
    pub best_iteration: Option<u32>,
    pub termination_reason: TerminationReason,
    pub total_iterations: u32,
    pub submission_path: Option<PathBuf>,
    /// Last error context on fatal paths, for diagnosis without a re-run.
    pub error_context: Option<String>,
}
