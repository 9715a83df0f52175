// src/phases/modeling.rs — Model training (code role)

use minijinja::context;

use super::{prompts, Phase, PipelineState};
use crate::core::types::{CompetitionContext, OutputContract, PhaseName, PhaseSpec};
use crate::gateway::GeneratorRole;
use crate::infra::errors::AgentError;
use crate::memory::{KnowledgeStore, ModelEntry};
use crate::sandbox::{last_json_line, ExecutionOutcome};

/// Trains a model with cross-validation and writes submission.csv. The
/// first pass asks for a baseline; once the model ledger has entries the
/// prompt switches to improving on the best score so far.
pub struct Modeling {
    ordinal: usize,
}

impl Modeling {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }

    fn is_baseline(store: &KnowledgeStore) -> bool {
        store.best_models().is_empty()
    }
}

impl Phase for Modeling {
    fn spec(&self) -> PhaseSpec {
        PhaseSpec {
            name: PhaseName::Modeling,
            ordinal: self.ordinal,
            role: GeneratorRole::Code,
            contract: OutputContract::Script {
                expects_score: true,
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
        if Self::is_baseline(store) {
            let eda = state.eda.as_ref().or_else(|| store.eda_insights());
            prompts::render(
                "modeling_baseline",
                context! {
                    task_type => ctx.task_type.as_str(),
                    metric => ctx.metric,
                    target_column => ctx.target_column,
                    numeric_columns => eda.map(|e| e.numeric_columns.clone()).unwrap_or_default(),
                    categorical_columns => eda.map(|e| e.categorical_columns.clone()).unwrap_or_default(),
                },
            )
        } else {
            prompts::render(
                "modeling_improve",
                context! {
                    task_type => ctx.task_type.as_str(),
                    metric => ctx.metric,
                    target_column => ctx.target_column,
                    best_score => store.best_score(),
                    new_features => state.new_features,
                },
            )
        }
    }

    fn absorb(&self, outcome: &ExecutionOutcome, state: &mut PipelineState) {
        let Some(score) = outcome.score else { return };
        let model_type = last_json_line(&outcome.stdout)
            .and_then(|v| v["model_type"].as_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".into());
        state.models.push(ModelEntry {
            model_type,
            cv_score: score,
            iteration: state.iteration,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::IterationRecord;
    use crate::sandbox::OutcomeStatus;
    use std::path::PathBuf;
    use std::time::Duration;

    fn ctx() -> CompetitionContext {
        CompetitionContext {
            data_dir: PathBuf::from("/tmp/comp"),
            target_column: "target".into(),
            metric: "auc".into(),
            task_type: crate::core::types::TaskType::Classification,
            available_files: vec!["train.csv".into()],
            target_score: None,
            max_iterations: 5,
        }
    }

    fn scored_record(index: u32, score: f64) -> IterationRecord {
        use crate::core::types::{PhaseRecord, PhaseSpec};
        use crate::gateway::{GeneratedArtifact, TokenUsage};
        IterationRecord::new(
            index,
            vec![PhaseRecord {
                spec: PhaseSpec {
                    name: PhaseName::Modeling,
                    ordinal: 3,
                    role: GeneratorRole::Code,
                    contract: OutputContract::Script {
                        expects_score: true,
                    },
                },
                artifact: GeneratedArtifact {
                    role: GeneratorRole::Code,
                    raw: String::new(),
                    code: String::new(),
                    usage: TokenUsage::default(),
                },
                outcome: ExecutionOutcome {
                    status: OutcomeStatus::Success,
                    stdout: format!(r#"{{"cv_score": {score}, "model_type": "lightgbm"}}"#),
                    stderr: String::new(),
                    artifacts: vec![],
                    score: Some(score),
                    duration: Duration::ZERO,
                },
                attempts: 1,
                degraded: false,
            }],
        )
    }

    #[test]
    fn test_first_pass_uses_baseline_prompt() {
        let prompt = Modeling::new(3)
            .render_prompt(&ctx(), &KnowledgeStore::new(), &PipelineState::default())
            .unwrap();
        assert!(prompt.contains("baseline model"));
        assert!(prompt.contains("LightGBM"));
    }

    #[test]
    fn test_later_passes_use_improve_prompt() {
        let mut store = KnowledgeStore::new();
        store.append(scored_record(0, 0.71));

        let mut state = PipelineState::default();
        state.new_features = vec!["family_size".into()];

        let prompt = Modeling::new(3)
            .render_prompt(&ctx(), &store, &state)
            .unwrap();
        assert!(prompt.contains("Improve the model"));
        assert!(prompt.contains("Current best score: 0.71"));
        assert!(prompt.contains("- family_size"));
    }

    #[test]
    fn test_absorb_records_model_with_iteration() {
        let outcome = ExecutionOutcome {
            status: OutcomeStatus::Success,
            stdout: r#"{"cv_score": 0.82, "model_type": "xgboost"}"#.into(),
            stderr: String::new(),
            artifacts: vec![],
            score: Some(0.82),
            duration: Duration::ZERO,
        };
        let mut state = PipelineState {
            iteration: 4,
            ..Default::default()
        };
        Modeling::new(3).absorb(&outcome, &mut state);
        assert_eq!(state.models.len(), 1);
        assert_eq!(state.models[0].model_type, "xgboost");
        assert_eq!(state.models[0].iteration, 4);
    }
}
