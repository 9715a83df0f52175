// src/phases/understanding.rs — Strategy synthesis (reasoning role)

use minijinja::context;

use super::{prompts, Phase, PipelineState};
use crate::core::types::{CompetitionContext, OutputContract, PhaseName, PhaseSpec};
use crate::gateway::GeneratorRole;
use crate::infra::errors::AgentError;
use crate::memory::KnowledgeStore;

/// First phase of every iteration: reads the competition facts and any
/// accumulated EDA findings, and proposes a strategy plus feature ideas.
/// Pure analysis, never enters the sandbox.
pub struct Understanding {
    ordinal: usize,
}

impl Understanding {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }
}

impl Phase for Understanding {
    fn spec(&self) -> PhaseSpec {
        PhaseSpec {
            name: PhaseName::Understanding,
            ordinal: self.ordinal,
            role: GeneratorRole::Reasoning,
            contract: OutputContract::Analysis,
        }
    }

    fn system_prompt(&self) -> String {
        "You are an experienced machine learning competitor. Be concise and concrete.".into()
    }

    fn render_prompt(
        &self,
        ctx: &CompetitionContext,
        store: &KnowledgeStore,
        _state: &PipelineState,
    ) -> Result<String, AgentError> {
        let insights = store.eda_insights();
        prompts::render(
            "understanding",
            context! {
                task_type => ctx.task_type.as_str(),
                metric => ctx.metric,
                target_column => ctx.target_column,
                files => ctx.available_files,
                num_samples => insights.map(|i| i.num_samples),
                num_features => insights.map(|i| i.num_features),
            },
        )
    }
}
