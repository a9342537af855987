//! TOML configuration file parsing

use super::*;
use crate::config::cli::{Cli, ExecutionMode};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse TOML configuration file
pub fn parse_toml_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse TOML configuration from string
pub fn parse_toml_string(contents: &str) -> Result<Config> {
    let config: Config = ::toml::from_str(contents)
        .context("Failed to parse TOML configuration")?;

    Ok(config)
}

/// Merge CLI arguments with TOML configuration (CLI takes precedence)
pub fn merge_cli_with_config(cli: &Cli, mut config: Config) -> Config {
    if let Some(mode) = cli.requested_mode() {
        config.mode = match mode {
            ExecutionMode::Coordinator => Mode::Coordinator,
            ExecutionMode::Worker => Mode::Worker,
        };
    }

    // Override network settings
    if let Some(ref host) = cli.host {
        config.network.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }

    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }

    // Override worker settings
    if let Some(ref node_id) = cli.node_id {
        config.worker.node_id = Some(node_id.clone());
    }
    if let Some(attempts) = cli.connect_attempts {
        config.worker.connect_attempts = attempts;
    }

    // Override job settings
    if let Some(tasks) = cli.tasks {
        config.job.tasks = tasks;
    }
    if let Some(range) = cli.range {
        config.job.range = range;
    }
    if let Some(buffered) = cli.buffered {
        config.job.buffered = buffered;
    }
    if let Some(ref output) = cli.output {
        config.job.output = output.clone();
    }

    config
}

/// Build the effective configuration for this process
///
/// Starts from the file named by `--config` (or defaults) and applies CLI
/// overrides on top.
pub fn load_config(cli: &Cli) -> Result<Config> {
    let base = match cli.config {
        Some(ref path) => parse_toml_file(path)?,
        None => Config::default(),
    };

    Ok(merge_cli_with_config(cli, base))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::io::Write;

    #[test]
    fn test_parse_full_file() {
        let config = parse_toml_string(
            r#"
            mode = "worker"

            [network]
            host = "10.0.1.10"
            port = 9000

            [worker]
            node_id = "rack-3"
            connect_attempts = 3

            [logging]
            level = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.mode, Mode::Worker);
        assert_eq!(config.network.host, "10.0.1.10");
        assert_eq!(config.network.port, 9000);
        assert_eq!(config.worker.node_id.as_deref(), Some("rack-3"));
        assert_eq!(config.worker.connect_attempts, 3);
        assert_eq!(config.worker.connect_delay_ms, 500);
        assert_eq!(config.logging.level, 1);
        assert_eq!(config.job, JobConfig::default());
    }

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(parse_toml_string("").unwrap(), Config::default());
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(parse_toml_string(r#"mode = "supervisor""#).is_err());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[network]\nport = 9000\nhost = \"10.0.0.1\"\n[job]\ntasks = 8").unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from(["gridworker", "--config", &path, "--port", "7000", "--worker"]).unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.mode, Mode::Worker);
        assert_eq!(config.network.port, 7000);
        assert_eq!(config.network.host, "10.0.0.1");
        assert_eq!(config.job.tasks, 8);
    }

    #[test]
    fn test_missing_file_is_error() {
        let cli = Cli::try_parse_from(["gridworker", "--config", "/nonexistent/gridworker.toml"]).unwrap();
        let err = load_config(&cli).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read config file"));
    }
}
