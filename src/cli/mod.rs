// src/cli/mod.rs — CLI definition (clap derive)

pub mod run;

use clap::Parser;

#[derive(Parser)]
#[command(name = "tabiter", about = "Iterative tabular competition agent", version)]
pub struct Cli {
    /// Competition data directory (must contain train.csv)
    pub competition: String,

    /// Evaluation metric (auc, rmse, ...); drives task-type inference
    #[arg(short, long)]
    pub metric: Option<String>,

    /// Target column; inferred from train.csv when omitted
    #[arg(short, long)]
    pub target_column: Option<String>,

    /// Max improvement iterations
    #[arg(short = 'n', long)]
    pub max_iterations: Option<u32>,

    /// Stop early once the best CV score reaches this value
    #[arg(short = 's', long)]
    pub target_score: Option<f64>,

    /// Wall-clock budget for the whole run, in seconds
    #[arg(long)]
    pub run_budget: Option<u64>,

    /// Config file path (defaults to ./tabiter.toml when present)
    #[arg(long)]
    pub config: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}
