//! Error types for command execution and task resolution
//!
//! Plumbing failures (sockets, framing, configuration) travel as `anyhow::Error`
//! with context attached. The two enums here are the structured failures that
//! cross API boundaries: `CommandError` on the worker side, `TaskError` on the
//! caller side of a submitted task.

use crate::commander::WorkerId;
use thiserror::Error;

/// Failure of a single command invocation on a worker
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// No function is registered under the requested name
    #[error("command not found: {0}")]
    NotFound(String),

    /// Arguments could not be decoded into the command's input type
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// The command returned an error
    #[error("{0}")]
    Failed(String),

    /// The command panicked while executing
    #[error("command panicked: {0}")]
    Panicked(String),
}

/// Failure observed by the caller awaiting a submitted task
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    /// The worker reported `success = false`; carries its error description
    #[error("task failed: {0}")]
    Failed(String),

    /// The worker holding the task disconnected before reporting
    #[error("worker {0} disconnected before finishing the task")]
    WorkerLost(WorkerId),

    /// The coordinator dropped the task without resolving it
    #[error("task abandoned by the coordinator")]
    Abandoned,

    /// The task succeeded but its result did not match the expected type
    #[error("failed to decode task result: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_error_messages() {
        assert_eq!(
            CommandError::NotFound("findPrimes".to_string()).to_string(),
            "command not found: findPrimes"
        );
        assert_eq!(CommandError::Failed("boom".to_string()).to_string(), "boom");
    }

    #[test]
    fn test_task_error_messages() {
        assert_eq!(
            TaskError::WorkerLost(WorkerId(7)).to_string(),
            "worker 7 disconnected before finishing the task"
        );
        assert!(TaskError::Failed("x".into()).to_string().contains("x"));
    }
}
