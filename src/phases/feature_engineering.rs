// src/phases/feature_engineering.rs — Feature construction (code role)

use minijinja::context;

use super::{prompts, Phase, PipelineState};
use crate::core::types::{CompetitionContext, OutputContract, PhaseName, PhaseSpec};
use crate::gateway::GeneratorRole;
use crate::infra::errors::AgentError;
use crate::memory::KnowledgeStore;
use crate::sandbox::{last_json_line, ExecutionOutcome};

/// Turns the untried-idea ledger into train_fe.csv/test_fe.csv. When the
/// ledger is empty the prompt asks the model to invent features, steering
/// it away from ones already tried.
pub struct FeatureEngineering {
    ordinal: usize,
}

impl FeatureEngineering {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }
}

impl Phase for FeatureEngineering {
    fn spec(&self) -> PhaseSpec {
        PhaseSpec {
            name: PhaseName::FeatureEngineering,
            ordinal: self.ordinal,
            role: GeneratorRole::Code,
            contract: OutputContract::Script {
                expects_score: false,
            },
        }
    }

    fn system_prompt(&self) -> String {
        "You are a Kaggle Grandmaster. Output only runnable Python code.".into()
    }

    fn render_prompt(
        &self,
        ctx: &CompetitionContext,
        store: &KnowledgeStore,
        state: &PipelineState,
    ) -> Result<String, AgentError> {
        let eda = state.eda.as_ref().or_else(|| store.eda_insights());
        prompts::render(
            "feature_engineering",
            context! {
                task_type => ctx.task_type.as_str(),
                target_column => ctx.target_column,
                numeric_columns => eda.map(|e| e.numeric_columns.clone()).unwrap_or_default(),
                categorical_columns => eda.map(|e| e.categorical_columns.clone()).unwrap_or_default(),
                feature_ideas => store.untried_features(),
                tried_features => store.tried_features(),
            },
        )
    }

    fn absorb(&self, outcome: &ExecutionOutcome, state: &mut PipelineState) {
        if let Some(value) = last_json_line(&outcome.stdout) {
            if let Some(features) = value["new_features"].as_array() {
                state
                    .new_features
                    .extend(features.iter().filter_map(|v| v.as_str()).map(String::from));
            }
        }
    }
}
