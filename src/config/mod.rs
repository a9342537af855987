//! Configuration module
//!
//! Handles CLI argument parsing, TOML configuration files, and validation.
//! Precedence, lowest first: built-in defaults, TOML file, CLI flags.

pub mod cli;
pub mod toml;
pub mod validator;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Complete process configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub mode: Mode,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub job: JobConfig,
}

/// Role of this process in the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Hand out tasks and collect results
    #[default]
    Coordinator,
    /// Execute tasks handed out by a coordinator
    Worker,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Coordinator => write!(f, "coordinator"),
            Mode::Worker => write!(f, "worker"),
        }
    }
}

/// Address the coordinator listens on, or the worker connects to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl NetworkConfig {
    /// Address for the coordinator to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Address for a worker to dial
    ///
    /// The wildcard host is not dialable, so it maps to loopback.
    pub fn connect_address(&self) -> String {
        let host = match self.host.as_str() {
            "0.0.0.0" => "127.0.0.1",
            "::" | "[::]" => "[::1]",
            other => other,
        };
        format!("{}:{}", host, self.port)
    }
}

/// Worker connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Node identifier sent to the coordinator (defaults to hostname)
    pub node_id: Option<String>,
    /// Connection attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,
    /// Delay between connection attempts (milliseconds)
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,
}

fn default_connect_attempts() -> u32 {
    10
}

fn default_connect_delay_ms() -> u64 {
    500
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            connect_attempts: default_connect_attempts(),
            connect_delay_ms: default_connect_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 0 = errors, 1 = info, 2 = debug
    #[serde(default = "default_log_level")]
    pub level: u8,
}

fn default_log_level() -> u8 {
    2
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Prime search job run by the coordinator binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Index of the last task; tasks 0..=tasks are run
    #[serde(default = "default_tasks")]
    pub tasks: u64,
    /// Numbers searched per task
    #[serde(default = "default_range")]
    pub range: u64,
    /// Tasks kept in flight at once
    #[serde(default = "default_buffered")]
    pub buffered: usize,
    /// File the sorted primes are written to
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_tasks() -> u64 {
    64
}

fn default_range() -> u64 {
    256
}

fn default_buffered() -> usize {
    16
}

fn default_output() -> PathBuf {
    PathBuf::from("primes.txt")
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            tasks: default_tasks(),
            range: default_range(),
            buffered: default_buffered(),
            output: default_output(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mode, Mode::Coordinator);
        assert_eq!(config.network.host, "0.0.0.0");
        assert_eq!(config.network.port, 8000);
        assert_eq!(config.logging.level, 2);
        assert_eq!(config.job.tasks, 64);
        assert_eq!(config.job.range, 256);
        assert_eq!(config.job.buffered, 16);
    }

    #[test]
    fn test_connect_address_maps_wildcard() {
        let mut network = NetworkConfig::default();
        assert_eq!(network.bind_address(), "0.0.0.0:8000");
        assert_eq!(network.connect_address(), "127.0.0.1:8000");

        network.host = "grid.example".to_string();
        network.port = 8080;
        assert_eq!(network.connect_address(), "grid.example:8080");
    }
}
