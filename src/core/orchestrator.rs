// src/core/orchestrator.rs — Run-level control loop
//
// Single-threaded state machine over the phase pipeline: INITIALIZING →
// ITERATING → EVALUATING → (CONTINUING | TERMINATED). Exactly one
// iteration is in flight at a time, and every completed iteration is
// appended before the stop decision that follows it.

use std::time::Instant;

use crate::core::types::{
    AgentResult, CompetitionContext, EngineConfig, TerminationReason,
};
use crate::gateway::ModelGateway;
use crate::infra::errors::AgentError;
use crate::memory::{ContextDigest, KnowledgeStore};
use crate::phases::Pipeline;
use crate::sandbox::{ResourceBudget, Sandbox};

/// Snapshot of the best iteration's submission, kept beside the data so
/// a later worse or degraded iteration cannot overwrite it.
const BEST_SUBMISSION: &str = "best_submission.csv";

/// Where the run currently is. INITIALIZING is the constructor path:
/// a resolved `CompetitionContext` is the proof it completed.
#[derive(Debug)]
enum RunState {
    /// About to run iteration `index`.
    Iterating(u32),
    /// Iteration `index` appended; deciding whether to continue.
    Evaluating(u32),
    Terminated(TerminationReason),
}

pub struct Orchestrator {
    ctx: CompetitionContext,
    config: EngineConfig,
    pipeline: Pipeline,
    gateway: ModelGateway,
    sandbox: Sandbox,
    store: KnowledgeStore,
}

impl Orchestrator {
    pub fn new(
        ctx: CompetitionContext,
        config: EngineConfig,
        pipeline: Pipeline,
        gateway: ModelGateway,
        sandbox: Sandbox,
        store: KnowledgeStore,
    ) -> Self {
        Self {
            ctx,
            config,
            pipeline,
            gateway,
            sandbox,
            store,
        }
    }

    /// Drive the run to termination. Always returns a result: fatal
    /// mid-run errors terminate with `FatalError` and the error context
    /// attached rather than propagating.
    pub async fn run(mut self) -> AgentResult {
        let deadline = self.config.run_budget.map(|b| Instant::now() + b);
        let budget = ResourceBudget {
            timeout: self.config.phase_timeout,
            memory_ceiling_bytes: self.config.memory_ceiling_bytes,
        };

        tracing::info!(
            target_column = %self.ctx.target_column,
            metric = %self.ctx.metric,
            task = %self.ctx.task_type.as_str(),
            max_iterations = self.config.max_iterations,
            "Run starting"
        );

        let mut error_context = None;
        let mut state = RunState::Iterating(0);

        let reason = loop {
            state = match state {
                RunState::Iterating(index) => {
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        tracing::warn!("Run budget exhausted before iteration {}", index + 1);
                        RunState::Terminated(TerminationReason::MaxIterations)
                    } else {
                        match self.iterate(index, budget, deadline).await {
                            Ok(()) => RunState::Evaluating(index),
                            Err(e) => {
                                tracing::error!("Fatal error in iteration {}: {e}", index + 1);
                                error_context = Some(e.to_string());
                                RunState::Terminated(TerminationReason::FatalError)
                            }
                        }
                    }
                }
                RunState::Evaluating(index) => self.evaluate(index),
                RunState::Terminated(reason) => break reason,
            };
        };

        self.finish(reason, error_context)
    }

    /// Run one iteration and append its record. The append happens
    /// before any stop decision, so a completed iteration is never lost.
    async fn iterate(
        &mut self,
        index: u32,
        budget: ResourceBudget,
        deadline: Option<Instant>,
    ) -> Result<(), AgentError> {
        let digest = if self.store.is_empty() {
            ContextDigest::empty()
        } else {
            self.store.summarize(self.config.digest_token_budget)
        };

        tracing::info!(
            iteration = index + 1,
            best = ?self.store.best_score(),
            "Iteration starting"
        );

        let record = self
            .pipeline
            .run_iteration(
                index,
                &self.ctx,
                &self.store,
                &digest,
                &self.gateway,
                &mut self.sandbox,
                budget,
                deadline,
            )
            .await?;

        let score = record.overall_score;
        self.store.append(record);

        // Ties resolve to the earliest record, so this fires only on a
        // strict improvement and the earlier snapshot otherwise stands.
        if self.store.best().map(|r| r.index) == Some(index) {
            self.snapshot_best_submission();
        }

        tracing::info!(
            iteration = index + 1,
            score = ?score,
            best = ?self.store.best_score(),
            "Iteration complete"
        );
        Ok(())
    }

    /// Preserve the just-appended best iteration's submission before any
    /// later execution can rewrite it.
    fn snapshot_best_submission(&self) {
        let submission = self.ctx.data_dir.join("submission.csv");
        if !submission.is_file() {
            return;
        }
        if let Err(e) = std::fs::copy(&submission, self.ctx.data_dir.join(BEST_SUBMISSION)) {
            tracing::warn!("Cannot snapshot best submission: {e}");
        }
    }

    fn evaluate(&self, index: u32) -> RunState {
        if let (Some(target), Some(best)) = (self.ctx.target_score, self.store.best_score()) {
            if best >= target {
                tracing::info!(best, target, "Target score reached");
                return RunState::Terminated(TerminationReason::TargetReached);
            }
        }
        if index + 1 >= self.config.max_iterations {
            return RunState::Terminated(TerminationReason::MaxIterations);
        }
        RunState::Iterating(index + 1)
    }

    fn finish(self, reason: TerminationReason, error_context: Option<String>) -> AgentResult {
        let best = self.store.best();
        let snapshot = self.ctx.data_dir.join(BEST_SUBMISSION);

        let result = AgentResult {
            final_score: best.and_then(|r| r.overall_score),
            best_iteration: best.map(|r| r.index),
            termination_reason: reason,
            total_iterations: self.store.len() as u32,
            submission_path: snapshot.is_file().then_some(snapshot),
            error_context,
        };

        if let Some(archive) = self.store.archive() {
            if let Err(e) = archive.complete_run(&result) {
                tracing::warn!("Archive finalization failed: {e}");
            }
        }

        tracing::info!(
            reason = %result.termination_reason,
            final_score = ?result.final_score,
            iterations = result.total_iterations,
            "Run finished"
        );
        result
    }
}
