// src/cli/run.rs — Wire config into a run and report the result

use std::path::Path;
use std::sync::Arc;

use crate::cli::Cli;
use crate::core::orchestrator::Orchestrator;
use crate::core::types::{AgentResult, CompetitionContext, EngineConfig};
use crate::gateway::openai_compat::OpenAICompatBackend;
use crate::gateway::retry::RetryPolicy;
use crate::gateway::{ModelGateway, RoleBinding};
use crate::infra::config::Config;
use crate::infra::errors::AgentError;
use crate::memory::{Archive, KnowledgeStore};
use crate::phases::Pipeline;
use crate::sandbox::Sandbox;

/// Resolve the competition, build the run components, and drive the
/// orchestrator to completion. Writes `agent_result.json` next to the
/// data so callers can consume the outcome without parsing logs.
pub async fn run_competition(cli: &Cli, config: &Config) -> Result<AgentResult, AgentError> {
    let ctx = CompetitionContext::resolve(
        Path::new(&cli.competition),
        cli.metric.as_deref(),
        cli.target_column.as_deref(),
        cli.target_score.or(config.run.target_score),
        cli.max_iterations.unwrap_or(config.run.max_iterations),
    )?;

    let mut engine = EngineConfig::from(config);
    engine.max_iterations = ctx.max_iterations;
    engine.target_score = ctx.target_score;
    if let Some(budget) = cli.run_budget {
        engine.run_budget = Some(std::time::Duration::from_secs(budget));
    }

    let backend = Arc::new(OpenAICompatBackend::new(
        "openai-compat",
        config.models.base_url.clone(),
        config.models.api_key.clone(),
    ));
    let gateway = ModelGateway::new(
        RoleBinding::new(backend.clone(), config.models.reasoning_model.clone()),
        RoleBinding::new(backend, config.models.code_model.clone()),
    )
    .with_retry(RetryPolicy::default().with_max_retries(config.models.max_retries));

    if which::which(&config.sandbox.interpreter).is_err() {
        return Err(AgentError::Configuration(format!(
            "interpreter '{}' not found on PATH",
            config.sandbox.interpreter
        )));
    }
    let sandbox = Sandbox::new(config.sandbox.interpreter.clone(), ctx.data_dir.clone());

    let mut store = KnowledgeStore::new();
    if config.memory.archive {
        let db_path = ctx.data_dir.join(".tabiter").join("history.db");
        store = store.with_archive(Archive::open(&db_path, &ctx)?);
    }

    let pipeline = Pipeline::standard(engine.retry_limit);
    let result_path = ctx.data_dir.join("agent_result.json");

    let orchestrator = Orchestrator::new(ctx, engine, pipeline, gateway, sandbox, store);
    let result = orchestrator.run().await;

    let json = serde_json::to_string_pretty(&result)
        .map_err(|e| AgentError::Infrastructure(format!("serialize result: {e}")))?;
    std::fs::write(&result_path, json)?;

    print_summary(&result);
    Ok(result)
}

fn print_summary(result: &AgentResult) {
    println!("Run finished: {}", result.termination_reason);
    match result.final_score {
        Some(score) => println!(
            "Best score: {score:.5} (iteration {})",
            result.best_iteration.map_or(0, |i| i + 1)
        ),
        None => println!("No scored iteration completed"),
    }
    println!("Iterations: {}", result.total_iterations);
    if let Some(ref path) = result.submission_path {
        println!("Submission: {}", path.display());
    }
    if let Some(ref err) = result.error_context {
        println!("Error: {err}");
    }
}
