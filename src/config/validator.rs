//! Configuration validation

use super::*;
use anyhow::Result;

/// Validate complete configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_network(&config.network, config.mode)?;
    validate_logging(&config.logging)?;

    match config.mode {
        Mode::Worker => validate_worker(&config.worker)?,
        Mode::Coordinator => validate_job(&config.job)?,
    }

    Ok(())
}

/// Validate network configuration
pub fn validate_network(network: &NetworkConfig, mode: Mode) -> Result<()> {
    if network.host.trim().is_empty() {
        anyhow::bail!("host must not be empty");
    }

    // Port 0 lets the coordinator pick a free port, but a worker cannot dial it
    if mode == Mode::Worker && network.port == 0 {
        anyhow::bail!("port must be set when running as a worker");
    }

    Ok(())
}

/// Validate logging configuration
pub fn validate_logging(logging: &LoggingConfig) -> Result<()> {
    if logging.level > 2 {
        anyhow::bail!("log level must be 0, 1 or 2, got {}", logging.level);
    }

    Ok(())
}

/// Validate worker configuration
pub fn validate_worker(worker: &WorkerConfig) -> Result<()> {
    if worker.connect_attempts == 0 {
        anyhow::bail!("connect_attempts must be at least 1");
    }

    if let Some(ref node_id) = worker.node_id {
        if node_id.trim().is_empty() {
            anyhow::bail!("node_id must not be empty");
        }
    }

    Ok(())
}

/// Validate prime search job configuration
pub fn validate_job(job: &JobConfig) -> Result<()> {
    if job.range == 0 {
        anyhow::bail!("range must be at least 1");
    }

    if job.buffered == 0 {
        anyhow::bail!("buffered must be at least 1");
    }

    if job.tasks.checked_add(1).and_then(|n| n.checked_mul(job.range)).is_none() {
        anyhow::bail!(
            "tasks ({}) x range ({}) exceeds the searchable number space",
            job.tasks,
            job.range
        );
    }

    Ok(())
}
