//! CLI argument parsing using clap

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Execution mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExecutionMode {
    /// Coordinator mode (default) - hand out tasks to connected workers
    Coordinator,
    /// Worker mode - connect to a coordinator and execute its tasks
    Worker,
}

/// GridWorker - distribute commands across a pool of workers
#[derive(Parser, Debug)]
#[command(name = "gridworker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Execution mode: coordinator or worker
    #[arg(long, value_enum)]
    pub mode: Option<ExecutionMode>,

    /// Shorthand for --mode worker
    #[arg(long, conflicts_with = "mode")]
    pub worker: bool,

    /// TOML configuration file (CLI flags take precedence)
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Host to listen on (coordinator) or connect to (worker)
    #[arg(long, env = "GRIDWORKER_HOST")]
    pub host: Option<String>,

    /// Port to listen on (coordinator) or connect to (worker)
    #[arg(short = 'p', long, env = "GRIDWORKER_PORT")]
    pub port: Option<u16>,

    /// Log level: 0 = errors, 1 = info, 2 = debug
    #[arg(short = 'l', long)]
    pub log_level: Option<u8>,

    /// Node identifier reported to the coordinator (worker mode only)
    #[arg(long)]
    pub node_id: Option<String>,

    /// Connection attempts before giving up (worker mode only)
    #[arg(long)]
    pub connect_attempts: Option<u32>,

    // === Prime Search Job (coordinator mode only) ===
    /// Index of the last task to run
    #[arg(long)]
    pub tasks: Option<u64>,

    /// Numbers searched per task
    #[arg(long)]
    pub range: Option<u64>,

    /// Tasks kept in flight at once
    #[arg(long)]
    pub buffered: Option<usize>,

    /// Output file for the primes found
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Mode requested on the command line, if any
    pub fn requested_mode(&self) -> Option<ExecutionMode> {
        if self.worker {
            Some(ExecutionMode::Worker)
        } else {
            self.mode
        }
    }

    /// Validate CLI arguments
    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(level) = self.log_level {
            if level > 2 {
                anyhow::bail!("log_level must be 0, 1 or 2, got {}", level);
            }
        }

        if self.range == Some(0) {
            anyhow::bail!("range must be at least 1");
        }

        if self.buffered == Some(0) {
            anyhow::bail!("buffered must be at least 1");
        }

        if self.connect_attempts == Some(0) {
            anyhow::bail!("connect_attempts must be at least 1");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worker_flag() {
        let cli = Cli::try_parse_from(["gridworker", "--worker", "--port", "8080", "--host", "localhost"]).unwrap();
        assert_eq!(cli.requested_mode(), Some(ExecutionMode::Worker));
        assert_eq!(cli.port, Some(8080));
        assert_eq!(cli.host.as_deref(), Some("localhost"));
        cli.validate().unwrap();
    }

    #[test]
    fn test_worker_conflicts_with_mode() {
        assert!(Cli::try_parse_from(["gridworker", "--worker", "--mode", "coordinator"]).is_err());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let cli = Cli::try_parse_from(["gridworker", "--log-level", "3"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["gridworker", "--buffered", "0"]).unwrap();
        assert!(cli.validate().is_err());

        let cli = Cli::try_parse_from(["gridworker", "--range", "0"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[test]
    fn test_no_mode_defaults_to_config() {
        let cli = Cli::try_parse_from(["gridworker"]).unwrap();
        assert_eq!(cli.requested_mode(), None);
    }
}
