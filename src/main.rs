//! GridWorker CLI entry point

use anyhow::{Context, Result};
use gridworker::config::cli::Cli;
use gridworker::config::{Config, Mode};
use gridworker::workload::primes::{self, SearchPlan};
use gridworker::GridWorker;
use std::time::Instant;

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse_args();
    cli.validate()?;

    let config = gridworker::config::toml::load_config(&cli)?;
    gridworker::config::validator::validate_config(&config)
        .context("Configuration validation failed")?;

    gridworker::logging::init(config.logging.level)?;
    tracing::info!("GridWorker v{} starting as {}", env!("CARGO_PKG_VERSION"), config.mode);

    let runtime = tokio::runtime::Runtime::new()
        .context("Failed to create tokio runtime")?;

    runtime.block_on(async {
        match config.mode {
            Mode::Coordinator => run_coordinator(config).await,
            Mode::Worker => run_worker(config).await,
        }
    })
}

/// Serve workers and run the prime search job
async fn run_coordinator(config: Config) -> Result<()> {
    let job = config.job.clone();
    let mut grid = GridWorker::new(config);
    let addr = grid.start_server().await?;
    tracing::info!(%addr, "waiting for workers");

    let commander = grid.commander().cloned()
        .context("Coordinator has no commander")?;

    let start = Instant::now();
    let searched = primes::search(&commander, SearchPlan::from(&job)).await;
    grid.stop_server().await?;
    let report = searched?;

    primes::write_primes(&job.output, &report.primes)?;
    tracing::info!(
        found = report.primes.len(),
        completed = report.completed_tasks,
        failed = report.failed_tasks,
        elapsed_ms = start.elapsed().as_millis() as u64,
        output = %job.output.display(),
        "search complete"
    );

    if report.failed_tasks > 0 {
        anyhow::bail!("{} search tasks failed", report.failed_tasks);
    }

    Ok(())
}

/// Connect to the coordinator and serve `findPrimes` until it hangs up
async fn run_worker(config: Config) -> Result<()> {
    let grid = GridWorker::new(config);
    let registry = grid.registry()
        .context("Worker has no command registry")?;
    primes::register(registry);

    let session = grid.connect_to_server().await?;
    session.wait().await
}
