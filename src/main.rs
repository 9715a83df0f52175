// src/main.rs — tabiter entry point

use clap::Parser;

use tabiter::cli::{run, Cli};
use tabiter::infra::config::Config;
use tabiter::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    // RUST_LOG takes precedence over the flag
    logger::init_logging(&cli.log_level);

    if let Err(e) = run_cli(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let config = match cli.config {
        Some(ref path) => Config::load_from(std::path::Path::new(path))?,
        None => Config::load()?,
    };

    run::run_competition(&cli, &config).await?;
    Ok(())
}
