// src/phases/eda.rs — Exploratory data analysis (code role)

use minijinja::context;

use super::{prompts, Phase, PipelineState};
use crate::core::types::{CompetitionContext, OutputContract, PhaseName, PhaseSpec};
use crate::gateway::GeneratorRole;
use crate::infra::errors::AgentError;
use crate::memory::{EdaInsights, KnowledgeStore};
use crate::sandbox::{last_json_line, ExecutionOutcome};

/// Generates and runs a profiling script. The script's final stdout JSON
/// line becomes the structured column/missing-value picture every later
/// phase builds on.
pub struct Eda {
    ordinal: usize,
}

impl Eda {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }
}

impl Phase for Eda {
    fn spec(&self) -> PhaseSpec {
        PhaseSpec {
            name: PhaseName::Eda,
            ordinal: self.ordinal,
            role: GeneratorRole::Code,
            contract: OutputContract::Script {
                expects_score: false,
            },
        }
    }

    fn system_prompt(&self) -> String {
        "You are a data scientist. Output only runnable Python code.".into()
    }

    fn render_prompt(
        &self,
        ctx: &CompetitionContext,
        _store: &KnowledgeStore,
        _state: &PipelineState,
    ) -> Result<String, AgentError> {
        prompts::render(
            "eda",
            context! {
                task_type => ctx.task_type.as_str(),
                metric => ctx.metric,
                target_column => ctx.target_column,
                files => ctx.available_files,
            },
        )
    }

    fn absorb(&self, outcome: &ExecutionOutcome, state: &mut PipelineState) {
        if let Some(value) = last_json_line(&outcome.stdout) {
            if let Ok(insights) = serde_json::from_value::<EdaInsights>(value) {
                state.eda = Some(insights);
            }
        }
    }
}
