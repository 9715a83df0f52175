// src/phases/ensemble.rs — Model combination (code role)

use minijinja::context;

use super::{prompts, Phase, PipelineState};
use crate::core::types::{CompetitionContext, OutputContract, PhaseName, PhaseSpec};
use crate::gateway::GeneratorRole;
use crate::infra::errors::AgentError;
use crate::memory::{KnowledgeStore, ModelEntry};

/// Final phase: combines the models on the ledger into one submission.
/// The prompt's strategy follows the ledger size — stacking with three or
/// more models, blending with exactly two, a tuned single model otherwise.
pub struct Ensemble {
    ordinal: usize,
}

impl Ensemble {
    pub fn new(ordinal: usize) -> Self {
        Self { ordinal }
    }

    fn strategy(model_count: usize) -> (&'static str, &'static str) {
        if model_count >= 3 {
            (
                "Use stacking: train a meta-model on out-of-fold predictions from the base models.",
                "stacking",
            )
        } else if model_count == 2 {
            (
                "Use weighted blending of the two models' predictions, tuning the weight on CV.",
                "blending",
            )
        } else {
            (
                "Too few models for an ensemble: train the strongest single model with tuned hyperparameters.",
                "single",
            )
        }
    }

    /// Ledger models plus any trained earlier in this same iteration.
    fn known_models(store: &KnowledgeStore, state: &PipelineState) -> Vec<ModelEntry> {
        let mut models: Vec<ModelEntry> = store.best_models().to_vec();
        models.extend(state.models.iter().cloned());
        models
    }
}

impl Phase for Ensemble {
    fn spec(&self) -> PhaseSpec {
        PhaseSpec {
            name: PhaseName::Ensemble,
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
        let models = Self::known_models(store, state);
        let (strategy, ensemble_type) = Self::strategy(models.len());
        prompts::render(
            "ensemble",
            context! {
                task_type => ctx.task_type.as_str(),
                metric => ctx.metric,
                target_column => ctx.target_column,
                models => models,
                strategy => strategy,
                ensemble_type => ensemble_type,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

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

    fn entry(model_type: &str, cv_score: f64) -> ModelEntry {
        ModelEntry {
            model_type: model_type.into(),
            cv_score,
            iteration: 0,
        }
    }

    #[test]
    fn test_strategy_by_model_count() {
        assert_eq!(Ensemble::strategy(0).1, "single");
        assert_eq!(Ensemble::strategy(1).1, "single");
        assert_eq!(Ensemble::strategy(2).1, "blending");
        assert_eq!(Ensemble::strategy(3).1, "stacking");
        assert_eq!(Ensemble::strategy(7).1, "stacking");
    }

    #[test]
    fn test_prompt_lists_models_and_strategy() {
        let mut state = PipelineState::default();
        state.models = vec![
            entry("lightgbm", 0.81),
            entry("xgboost", 0.8),
            entry("catboost", 0.79),
        ];
        let prompt = Ensemble::new(4)
            .render_prompt(&ctx(), &KnowledgeStore::new(), &state)
            .unwrap();
        assert!(prompt.contains("lightgbm (CV: 0.81)"));
        assert!(prompt.contains("stacking"));
    }

    #[test]
    fn test_prompt_single_model_fallback() {
        let prompt = Ensemble::new(4)
            .render_prompt(&ctx(), &KnowledgeStore::new(), &PipelineState::default())
            .unwrap();
        assert!(prompt.contains("single"));
    }
}
