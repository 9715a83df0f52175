// src/memory/store.rs — Append-only knowledge store
//
// The only state shared across iterations. `append` is the single
// mutator; everything else is a derived read. Best-so-far is always
// recomputed from the record sequence, never cached where it could
// desync from history.

use serde::{Deserialize, Serialize};

use super::archive::Archive;
use super::digest::{self, ContextDigest};
use crate::core::types::{IterationRecord, PhaseName};
use crate::sandbox::last_json_line;

/// Structured findings from the EDA phase, parsed from its stdout JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdaInsights {
    #[serde(default)]
    pub num_samples: u64,
    #[serde(default)]
    pub num_features: u64,
    #[serde(default)]
    pub missing_columns: Vec<String>,
    #[serde(default)]
    pub numeric_columns: Vec<String>,
    #[serde(default)]
    pub categorical_columns: Vec<String>,
    #[serde(default)]
    pub insights: Vec<String>,
}

/// A trained model worth remembering for the ensemble phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub model_type: String,
    pub cv_score: f64,
    pub iteration: u32,
}

/// How many model entries the ensemble prompt sees.
const BEST_MODELS_KEPT: usize = 5;

pub struct KnowledgeStore {
    records: Vec<IterationRecord>,
    eda_insights: Option<EdaInsights>,
    feature_ideas: Vec<String>,
    tried_features: Vec<String>,
    best_models: Vec<ModelEntry>,
    archive: Option<Archive>,
}

impl KnowledgeStore {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            eda_insights: None,
            feature_ideas: Vec::new(),
            tried_features: Vec::new(),
            best_models: Vec::new(),
            archive: None,
        }
    }

    pub fn with_archive(mut self, archive: Archive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// The only mutator. Absorbs structured phase outputs into the
    /// derived ledgers, mirrors the record to the archive, and appends.
    /// Readers never observe a partially absorbed record: `&mut self`
    /// makes append atomic relative to every reader.
    pub fn append(&mut self, record: IterationRecord) {
        self.absorb(&record);

        if let Some(ref archive) = self.archive {
            if let Err(e) = archive.record_iteration(&record) {
                tracing::warn!("Archive insert failed (continuing): {e}");
            }
        }

        self.records.push(record);
    }

    fn absorb(&mut self, record: &IterationRecord) {
        if let Some(phase) = record.phase(PhaseName::Eda) {
            if phase.outcome.succeeded() {
                if let Some(value) = last_json_line(&phase.outcome.stdout) {
                    if let Ok(insights) = serde_json::from_value::<EdaInsights>(value) {
                        self.eda_insights = Some(insights);
                    }
                }
            }
        }

        // Feature ideas proposed by the reasoning model, one "- idea" line each
        if let Some(phase) = record.phase(PhaseName::Understanding) {
            for idea in parse_idea_lines(&phase.artifact.raw) {
                if !self.tried_features.contains(&idea) && !self.feature_ideas.contains(&idea) {
                    self.feature_ideas.push(idea);
                }
            }
        }

        if let Some(phase) = record.phase(PhaseName::FeatureEngineering) {
            if let Some(value) = last_json_line(&phase.outcome.stdout) {
                if let Some(features) = value["new_features"].as_array() {
                    for f in features.iter().filter_map(|v| v.as_str()) {
                        self.mark_feature_tried(f);
                    }
                }
            }
        }

        for name in [PhaseName::Modeling, PhaseName::Ensemble] {
            let Some(phase) = record.phase(name) else { continue };
            let Some(score) = phase.outcome.score else { continue };
            let model_type = last_json_line(&phase.outcome.stdout)
                .and_then(|v| {
                    v["model_type"]
                        .as_str()
                        .or(v["ensemble_type"].as_str())
                        .map(str::to_string)
                })
                .unwrap_or_else(|| name.as_str().to_string());
            self.record_model(ModelEntry {
                model_type,
                cv_score: score,
                iteration: record.index,
            });
        }
    }

    fn mark_feature_tried(&mut self, feature: &str) {
        let feature = feature.to_string();
        self.feature_ideas.retain(|f| f != &feature);
        if !self.tried_features.contains(&feature) {
            self.tried_features.push(feature);
        }
    }

    fn record_model(&mut self, entry: ModelEntry) {
        self.best_models.push(entry);
        self.best_models
            .sort_by(|a, b| b.cv_score.total_cmp(&a.cv_score));
        self.best_models.truncate(BEST_MODELS_KEPT);
    }

    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest-scoring record; ties resolve to the earliest one.
    /// Scoreless (degraded) records never win.
    pub fn best(&self) -> Option<&IterationRecord> {
        let mut best: Option<&IterationRecord> = None;
        for record in &self.records {
            let Some(score) = record.overall_score else { continue };
            match best.and_then(|b| b.overall_score) {
                Some(current) if score <= current => {}
                _ => best = Some(record),
            }
        }
        best
    }

    pub fn best_score(&self) -> Option<f64> {
        self.best().and_then(|r| r.overall_score)
    }

    /// Bounded digest of prior attempts for prompting context.
    pub fn summarize(&self, max_tokens: u32) -> ContextDigest {
        digest::summarize(
            &self.records,
            &self.feature_ideas,
            self.best_score(),
            max_tokens,
        )
    }

    pub fn eda_insights(&self) -> Option<&EdaInsights> {
        self.eda_insights.as_ref()
    }

    pub fn untried_features(&self) -> &[String] {
        &self.feature_ideas
    }

    pub fn tried_features(&self) -> &[String] {
        &self.tried_features
    }

    pub fn best_models(&self) -> &[ModelEntry] {
        &self.best_models
    }

    pub fn archive(&self) -> Option<&Archive> {
        self.archive.as_ref()
    }
}

impl Default for KnowledgeStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract "- idea" bullet lines from reasoning text.
fn parse_idea_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter_map(|l| l.strip_prefix("- "))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && l.len() < 120)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{IterationRecord, OutputContract, PhaseRecord, PhaseSpec};
    use crate::gateway::{GeneratedArtifact, GeneratorRole, TokenUsage};
    use crate::sandbox::{ExecutionOutcome, OutcomeStatus};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn phase(name: PhaseName, score: Option<f64>, stdout: &str) -> PhaseRecord {
        PhaseRecord {
            spec: PhaseSpec {
                name,
                ordinal: 0,
                role: GeneratorRole::Code,
                contract: OutputContract::Script {
                    expects_score: score.is_some(),
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
                stdout: stdout.into(),
                stderr: String::new(),
                artifacts: vec![],
                score,
                duration: Duration::ZERO,
            },
            attempts: 1,
            degraded: false,
        }
    }

    fn scored(index: u32, score: f64) -> IterationRecord {
        IterationRecord::new(index, vec![phase(PhaseName::Modeling, Some(score), "")])
    }

    #[test]
    fn test_append_only_ordering() {
        let mut store = KnowledgeStore::new();
        store.append(scored(0, 0.5));
        store.append(scored(1, 0.6));
        assert_eq!(store.len(), 2);
        assert_eq!(store.records()[0].index, 0);
        assert_eq!(store.records()[1].index, 1);
    }

    #[test]
    fn test_best_is_highest_score() {
        let mut store = KnowledgeStore::new();
        store.append(scored(0, 0.5));
        store.append(scored(1, 0.8));
        store.append(scored(2, 0.6));
        assert_eq!(store.best().unwrap().index, 1);
    }

    #[test]
    fn test_best_ties_resolve_earliest() {
        let mut store = KnowledgeStore::new();
        store.append(scored(0, 0.7));
        store.append(scored(1, 0.7));
        assert_eq!(store.best().unwrap().index, 0);
    }

    #[test]
    fn test_best_skips_scoreless_records() {
        let mut store = KnowledgeStore::new();
        store.append(IterationRecord::new(0, vec![]));
        assert!(store.best().is_none());
        store.append(scored(1, 0.3));
        assert_eq!(store.best().unwrap().index, 1);
        store.append(IterationRecord::new(2, vec![]));
        assert_eq!(store.best().unwrap().index, 1);
    }

    #[test]
    fn test_best_monotonic_across_appends() {
        let mut store = KnowledgeStore::new();
        let scores = [0.4, 0.2, 0.9, 0.5, 0.9];
        let mut last_best = f64::NEG_INFINITY;
        for (i, s) in scores.iter().enumerate() {
            store.append(scored(i as u32, *s));
            let best = store.best_score().unwrap();
            assert!(best >= last_best, "best regressed after append {i}");
            last_best = best;
        }
        assert_eq!(last_best, 0.9);
        assert_eq!(store.best().unwrap().index, 2);
    }

    #[test]
    fn test_summarize_idempotent_without_append() {
        let mut store = KnowledgeStore::new();
        store.append(scored(0, 0.6));
        let a = store.summarize(500);
        let b = store.summarize(500);
        assert_eq!(a, b);
    }

    #[test]
    fn test_absorb_eda_insights() {
        let mut store = KnowledgeStore::new();
        let stdout = r#"{"num_samples": 891, "num_features": 12, "numeric_columns": ["age"], "categorical_columns": ["sex"]}"#;
        store.append(IterationRecord::new(
            0,
            vec![phase(PhaseName::Eda, None, stdout)],
        ));
        let insights = store.eda_insights().unwrap();
        assert_eq!(insights.num_samples, 891);
        assert_eq!(insights.numeric_columns, vec!["age"]);
    }

    #[test]
    fn test_absorb_feature_ideas_and_tried() {
        let mut store = KnowledgeStore::new();

        let mut understanding = phase(PhaseName::Understanding, None, "");
        understanding.artifact.raw =
            "Plan:\n- family size from sibsp and parch\n- title from name\n".into();
        store.append(IterationRecord::new(0, vec![understanding]));
        assert_eq!(store.untried_features().len(), 2);

        let fe = phase(
            PhaseName::FeatureEngineering,
            None,
            r#"{"new_features": ["family size from sibsp and parch"]}"#,
        );
        store.append(IterationRecord::new(1, vec![fe]));
        assert_eq!(store.untried_features(), ["title from name"]);
    }

    #[test]
    fn test_absorb_model_ledger_keeps_top_five() {
        let mut store = KnowledgeStore::new();
        for (i, s) in [0.5, 0.7, 0.6, 0.8, 0.4, 0.9, 0.3].iter().enumerate() {
            let stdout = format!(r#"{{"cv_score": {s}, "model_type": "lightgbm"}}"#);
            store.append(IterationRecord::new(
                i as u32,
                vec![phase(PhaseName::Modeling, Some(*s), &stdout)],
            ));
        }
        let models = store.best_models();
        assert_eq!(models.len(), 5);
        assert_eq!(models[0].cv_score, 0.9);
        assert_eq!(models[0].model_type, "lightgbm");
    }

    #[test]
    fn test_parse_idea_lines() {
        let ideas = parse_idea_lines("intro\n- one\n  - two\nnot a bullet\n- \n");
        assert_eq!(ideas, vec!["one", "two"]);
    }
}
