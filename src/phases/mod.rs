// src/phases/mod.rs — Phase pipeline: strategies + driver

pub mod eda;
pub mod ensemble;
pub mod feature_engineering;
pub mod modeling;
pub mod prompts;
pub mod understanding;

use std::time::Instant;

use crate::core::types::{
    CompetitionContext, IterationRecord, OutputContract, PhaseRecord, PhaseSpec,
};
use crate::gateway::{GeneratedArtifact, ModelGateway};
use crate::infra::errors::AgentError;
use crate::memory::{ContextDigest, EdaInsights, KnowledgeStore, ModelEntry};
use crate::sandbox::{
    last_json_line, ExecutionOutcome, ExecutionRequest, OutcomeStatus, ResourceBudget, Sandbox,
};

/// Intra-iteration scratch shared between phases: a later phase consumes
/// what an earlier phase in the same iteration produced. Reset per pass.
#[derive(Debug, Default)]
pub struct PipelineState {
    pub iteration: u32,
    pub eda: Option<EdaInsights>,
    pub new_features: Vec<String>,
    pub models: Vec<ModelEntry>,
}

/// One named step of the pipeline. Implementations are prompt strategies:
/// generation and execution are driven by the pipeline, so retry policy
/// lives in exactly one place.
pub trait Phase: Send + Sync {
    fn spec(&self) -> PhaseSpec;

    fn system_prompt(&self) -> String;

    fn render_prompt(
        &self,
        ctx: &CompetitionContext,
        store: &KnowledgeStore,
        state: &PipelineState,
    ) -> Result<String, AgentError>;

    /// Fold a successful outcome into the intra-iteration state.
    fn absorb(&self, _outcome: &ExecutionOutcome, _state: &mut PipelineState) {}
}

/// Ordered phase list plus the retry policy for runtime errors.
pub struct Pipeline {
    phases: Vec<Box<dyn Phase>>,
    retry_limit: u32,
}

impl Pipeline {
    pub fn new(phases: Vec<Box<dyn Phase>>, retry_limit: u32) -> Self {
        assert!(retry_limit >= 1, "retry_limit counts total attempts");
        Self {
            phases,
            retry_limit,
        }
    }

    /// The five standard phases in declared order.
    pub fn standard(retry_limit: u32) -> Self {
        Self::new(
            vec![
                Box::new(understanding::Understanding::new(0)),
                Box::new(eda::Eda::new(1)),
                Box::new(feature_engineering::FeatureEngineering::new(2)),
                Box::new(modeling::Modeling::new(3)),
                Box::new(ensemble::Ensemble::new(4)),
            ],
            retry_limit,
        )
    }

    pub fn phase_count(&self) -> usize {
        self.phases.len()
    }

    /// Drive one full pass over all phases, strictly in ordinal order.
    ///
    /// `deadline` is the whole-run budget; it clamps each phase's sandbox
    /// timeout so a stuck script cannot outlive the run. Only
    /// infrastructure faults propagate — every script or generation
    /// failure lands in the record as an outcome.
    pub async fn run_iteration(
        &self,
        index: u32,
        ctx: &CompetitionContext,
        store: &KnowledgeStore,
        digest: &ContextDigest,
        gateway: &ModelGateway,
        sandbox: &mut Sandbox,
        base_budget: ResourceBudget,
        deadline: Option<Instant>,
    ) -> Result<IterationRecord, AgentError> {
        let mut state = PipelineState {
            iteration: index,
            ..Default::default()
        };
        let mut records = Vec::with_capacity(self.phases.len());

        for phase in &self.phases {
            let record = self
                .run_phase(
                    phase.as_ref(),
                    ctx,
                    store,
                    digest,
                    gateway,
                    sandbox,
                    base_budget,
                    deadline,
                    &mut state,
                )
                .await?;

            if record.degraded {
                tracing::warn!(
                    phase = %record.spec.name,
                    attempts = record.attempts,
                    status = %record.outcome.status,
                    "Phase degraded; downstream phases continue on partial artifacts"
                );
            }
            records.push(record);
        }

        Ok(IterationRecord::new(index, records))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_phase(
        &self,
        phase: &dyn Phase,
        ctx: &CompetitionContext,
        store: &KnowledgeStore,
        digest: &ContextDigest,
        gateway: &ModelGateway,
        sandbox: &mut Sandbox,
        base_budget: ResourceBudget,
        deadline: Option<Instant>,
        state: &mut PipelineState,
    ) -> Result<PhaseRecord, AgentError> {
        let spec = phase.spec();
        let system = phase.system_prompt();
        let base_prompt = phase.render_prompt(ctx, store, state)?;

        let mut attempts = 0u32;
        let mut error_context: Option<String> = None;

        let (artifact, outcome, degraded) = loop {
            attempts += 1;
            let prompt = match &error_context {
                Some(err) => prompts::with_retry_context(&base_prompt, err),
                None => base_prompt.clone(),
            };

            let artifact = match gateway
                .generate(spec.role, &system, &prompt, Some(&digest.text))
                .await
            {
                Ok(a) => a,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    // Persistent generation failure degrades the phase
                    // rather than aborting the run.
                    tracing::warn!(phase = %spec.name, attempt = attempts, "Generation failed: {e}");
                    let outcome = ExecutionOutcome::generation_failed(&e.to_string());
                    if attempts >= self.retry_limit {
                        break (GeneratedArtifact::placeholder(spec.role), outcome, true);
                    }
                    error_context = Some(e.to_string());
                    continue;
                }
            };

            let expects_score = match spec.contract {
                OutputContract::Analysis => {
                    break (artifact, ExecutionOutcome::analysis(), false)
                }
                OutputContract::Script { expects_score } => expects_score,
            };

            let request = ExecutionRequest::new(&artifact.code, clamp_budget(base_budget, deadline))
                .with_inputs(current_data_files(ctx));
            let mut outcome = sandbox.execute(&request).await?;

            match outcome.status {
                OutcomeStatus::Success => {
                    if expects_score {
                        outcome.score = last_json_line(&outcome.stdout)
                            .and_then(|v| v["cv_score"].as_f64());
                    }
                    phase.absorb(&outcome, state);
                    break (artifact, outcome, false);
                }
                OutcomeStatus::RuntimeError => {
                    if attempts >= self.retry_limit {
                        break (artifact, outcome, true);
                    }
                    // Regeneration with the error appended is the
                    // corrective action, never a raw rerun.
                    error_context = Some(error_excerpt(&outcome));
                    tracing::info!(
                        phase = %spec.name,
                        attempt = attempts,
                        "Runtime error, regenerating with error context"
                    );
                }
                // Resource failures need a different plan, not a repeat.
                OutcomeStatus::Timeout | OutcomeStatus::ResourceExceeded => {
                    break (artifact, outcome, true)
                }
            }
        };

        Ok(PhaseRecord {
            spec,
            artifact,
            outcome,
            attempts,
            degraded,
        })
    }
}

/// Clamp a phase budget so it cannot outlive the run deadline.
fn clamp_budget(mut budget: ResourceBudget, deadline: Option<Instant>) -> ResourceBudget {
    if let Some(deadline) = deadline {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining < budget.timeout {
            budget.timeout = remaining.max(std::time::Duration::from_secs(1));
        }
    }
    budget
}

/// Data files currently present in the competition directory. This is
/// the explicit forwarding step: artifacts a previous execution copied
/// back become visible to the next one only through this list.
fn current_data_files(ctx: &CompetitionContext) -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(&ctx.data_dir)
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

/// Last few stderr lines for the regeneration prompt.
fn error_excerpt(outcome: &ExecutionOutcome) -> String {
    let lines: Vec<&str> = outcome.stderr.lines().collect();
    let tail = lines.len().saturating_sub(15);
    lines[tail..].join("\n")
}

impl GeneratedArtifact {
    /// Stand-in recorded when a backend never produced output for a
    /// phase, so the audit trail stays complete.
    pub fn placeholder(role: crate::gateway::GeneratorRole) -> Self {
        Self {
            role,
            raw: String::new(),
            code: String::new(),
            usage: crate::gateway::TokenUsage::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_clamp_budget_no_deadline() {
        let budget = ResourceBudget {
            timeout: Duration::from_secs(300),
            memory_ceiling_bytes: 1024,
        };
        assert_eq!(clamp_budget(budget, None).timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_clamp_budget_near_deadline() {
        let budget = ResourceBudget {
            timeout: Duration::from_secs(300),
            memory_ceiling_bytes: 1024,
        };
        let deadline = Instant::now() + Duration::from_secs(10);
        let clamped = clamp_budget(budget, Some(deadline));
        assert!(clamped.timeout <= Duration::from_secs(10));
        assert!(clamped.timeout >= Duration::from_secs(1));
    }

    #[test]
    fn test_clamp_budget_past_deadline_keeps_minimum() {
        let budget = ResourceBudget {
            timeout: Duration::from_secs(300),
            memory_ceiling_bytes: 1024,
        };
        let deadline = Instant::now() - Duration::from_secs(5);
        let clamped = clamp_budget(budget, Some(deadline));
        assert_eq!(clamped.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_error_excerpt_takes_tail() {
        let stderr: String = (0..30).map(|i| format!("line {i}\n")).collect();
        let outcome = ExecutionOutcome {
            status: OutcomeStatus::RuntimeError,
            stdout: String::new(),
            stderr,
            artifacts: vec![],
            score: None,
            duration: Duration::ZERO,
        };
        let excerpt = error_excerpt(&outcome);
        assert!(excerpt.starts_with("line 15"));
        assert!(excerpt.ends_with("line 29"));
    }

    #[test]
    fn test_standard_pipeline_order() {
        let pipeline = Pipeline::standard(3);
        assert_eq!(pipeline.phase_count(), 5);
        let names: Vec<String> = pipeline
            .phases
            .iter()
            .map(|p| p.spec().name.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "understanding",
                "eda",
                "feature_engineering",
                "modeling",
                "ensemble"
            ]
        );
        for (i, p) in pipeline.phases.iter().enumerate() {
            assert_eq!(p.spec().ordinal, i);
        }
    }
}
