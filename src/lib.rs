//! GridWorker - distribute commands across a pool of workers
//!
//! A coordinator queues named commands with JSON-like arguments; workers
//! connect over TCP, run whatever they are handed and report back. Each
//! submission yields a handle that settles with the worker's result.
//!
//! # Architecture
//!
//! - **Commander**: FIFO matching of pending tasks to idle workers
//! - **RPC layer**: correlation ids and single-resolution result handles
//! - **Command registry**: name → function table on the worker side
//! - **Distributed**: wire protocol, coordinator server, worker loop
//! - **Grid**: one facade per process, coordinator or worker

pub mod commander;
pub mod config;
pub mod distributed;
pub mod error;
pub mod grid;
pub mod logging;
pub mod registry;
pub mod rpc;
pub mod workload;

// Re-export commonly used types
pub use commander::{Commander, WorkerId};
pub use config::Config;
pub use error::{CommandError, TaskError};
pub use grid::GridWorker;
pub use registry::CommandRegistry;
pub use rpc::{CorrelationId, PendingResult};

/// Dynamic value carried as command arguments and results
pub type Value = serde_json::Value;

/// Result type used throughout GridWorker
pub type Result<T> = anyhow::Result<T>;
