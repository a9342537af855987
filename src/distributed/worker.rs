//! Worker execution loop
//!
//! A worker process connects to the coordinator, introduces itself with
//! HELLO, then runs every EXEC it receives through its `CommandRegistry`.
//! Each EXEC produces exactly one FINISH carrying the same correlation id:
//! success with the command's return value, or failure with an error
//! description. Neither a command error nor a command panic escapes the loop.
//!
//! Commands run on tokio's blocking pool so a long computation does not stall
//! the connection. Only one task is in flight per connection; the
//! coordinator never sends a second EXEC before the FINISH for the first.

use crate::distributed::protocol::*;
use crate::error::CommandError;
use crate::registry::CommandRegistry;
use anyhow::{Context, Result};
use std::any::Any;
use std::net::SocketAddr;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Worker side of a grid
#[derive(Debug, Clone)]
pub struct WorkerNode {
    registry: Arc<CommandRegistry>,

    /// Identifier sent in HELLO (hostname by default)
    node_id: String,

    /// Connection attempts before giving up
    connect_attempts: u32,

    /// Pause between connection attempts
    connect_delay: Duration,
}

impl WorkerNode {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self {
            registry,
            node_id: get_node_id(),
            connect_attempts: 1,
            connect_delay: Duration::from_millis(500),
        }
    }

    pub fn with_node_id(mut self, node_id: impl Into<String>) -> Self {
        self.node_id = node_id.into();
        self
    }

    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.connect_attempts = attempts.max(1);
        self.connect_delay = delay;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Connect to the coordinator at `addr` and start serving tasks
    ///
    /// Returns once the connection is up and HELLO has been sent; the task
    /// loop keeps running in the background until the coordinator hangs up.
    pub async fn connect(&self, addr: &str) -> Result<WorkerSession> {
        let stream = self.connect_with_retry(addr).await?;
        let peer = stream.peer_addr().context("Failed to read coordinator address")?;
        let (reader, mut writer) = stream.into_split();

        let hello = Message::Hello(HelloMessage {
            protocol_version: PROTOCOL_VERSION,
            node_id: self.node_id.clone(),
        });
        write_message(&mut writer, &hello).await
            .context("Failed to send HELLO")?;

        tracing::info!(node_id = %self.node_id, %peer, "connected to coordinator");

        let registry = self.registry.clone();
        let task = tokio::spawn(async move { serve(registry, reader, writer).await });

        Ok(WorkerSession { peer, task })
    }

    async fn connect_with_retry(&self, addr: &str) -> Result<TcpStream> {
        let mut attempt = 1;
        loop {
            tracing::debug!(%addr, attempt, "attempting to connect to coordinator");
            match TcpStream::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) if attempt < self.connect_attempts => {
                    tracing::debug!(%addr, "connect failed: {}", e);
                    attempt += 1;
                    sleep(self.connect_delay).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to connect to {}", addr));
                }
            }
        }
    }
}

/// A running connection to the coordinator
#[derive(Debug)]
pub struct WorkerSession {
    peer: SocketAddr,
    task: JoinHandle<Result<()>>,
}

impl WorkerSession {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Wait until the coordinator closes the connection
    pub async fn wait(self) -> Result<()> {
        self.task.await.context("Worker loop panicked")?
    }
}

/// Serve EXEC frames from `reader` until end-of-stream or SHUTDOWN
pub async fn serve<R, W>(registry: Arc<CommandRegistry>, mut reader: R, mut writer: W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    loop {
        match read_message(&mut reader).await? {
            Some(Message::Exec(exec)) => {
                let finish = run_exec(registry.clone(), exec).await;
                write_message(&mut writer, &Message::Finish(finish)).await?;
            }
            Some(Message::Shutdown) => {
                tracing::info!("coordinator is shutting down");
                return Ok(());
            }
            Some(other) => {
                tracing::warn!("Unexpected message: {:?}", other);
            }
            None => {
                tracing::info!("coordinator closed the connection");
                return Ok(());
            }
        }
    }
}

async fn run_exec(registry: Arc<CommandRegistry>, exec: ExecMessage) -> FinishMessage {
    let id = exec.id;
    match tokio::task::spawn_blocking(move || handle_exec(&registry, exec)).await {
        Ok(finish) => finish,
        Err(e) => FinishMessage::failure(id, format!("command execution aborted: {}", e)),
    }
}

/// Execute one EXEC and build its FINISH
///
/// Always returns a FINISH for `exec.id`, whatever the command does.
pub fn handle_exec(registry: &CommandRegistry, exec: ExecMessage) -> FinishMessage {
    let ExecMessage { id, command, args } = exec;
    tracing::debug!(task = %id, command = %command, "execution requested");

    let result = panic::catch_unwind(AssertUnwindSafe(|| registry.execute(&command, args)))
        .unwrap_or_else(|payload| Err(CommandError::Panicked(panic_message(&*payload))));

    let finish = match result {
        Ok(value) => {
            tracing::debug!(task = %id, command = %command, "command success");
            FinishMessage::success(id, value)
        }
        Err(e) => {
            tracing::error!(task = %id, command = %command, "command failure: {}", e);
            FinishMessage::failure(id, e.to_string())
        }
    };

    tracing::debug!(task = %id, command = %command, "execution complete");
    finish
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Get node identifier (hostname)
fn get_node_id() -> String {
    if let Ok(hostname) = hostname::get() {
        if let Ok(hostname_str) = hostname.into_string() {
            return hostname_str;
        }
    }

    "unknown".to_string()
}
