// src/core/mod.rs — Run control: context, records, orchestrator

pub mod orchestrator;
pub mod types;

pub use orchestrator::Orchestrator;
pub use types::{
    AgentResult, CompetitionContext, EngineConfig, IterationRecord, PhaseName, PhaseRecord,
    TaskType, TerminationReason,
};
