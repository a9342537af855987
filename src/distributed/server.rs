//! Coordinator server
//!
//! Listens for worker connections and plugs each one into the `Commander`:
//!
//! - Reads the worker's HELLO and checks the protocol version
//! - Registers the worker with a `ChannelLink` to its writer task
//! - Routes every FINISH frame to `Commander::finish`
//! - Unregisters the worker when the connection drops
//!
//! Stopping the server sends SHUTDOWN to every connected worker, closes the
//! listener and waits for the connection tasks to wind down.

use crate::commander::link::ChannelLink;
use crate::commander::{Commander, WorkerId};
use crate::distributed::protocol::*;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;

/// How long a new connection may take to send HELLO
const HELLO_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to a running coordinator server
///
/// Dropping the handle without calling `stop` also shuts the server down,
/// but without waiting for it.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    accept_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener is bound to (useful when the port was 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting workers and disconnect the connected ones
    ///
    /// Tasks still running on a worker are rejected with `WorkerLost`.
    /// Tasks still queued stay in the commander.
    pub async fn stop(self) -> Result<()> {
        let _ = self.shutdown.send(true);
        self.accept_task.await
            .context("Server task panicked")?;

        tracing::info!(addr = %self.local_addr, "server stopped");
        Ok(())
    }
}

/// Bind `addr` and start serving workers for `commander`
pub async fn start(addr: &str, commander: Arc<Commander>) -> Result<ServerHandle> {
    let listener = TcpListener::bind(addr).await
        .with_context(|| format!("Failed to bind coordinator to {}", addr))?;
    let local_addr = listener.local_addr()
        .context("Failed to read listener address")?;

    tracing::info!(addr = %local_addr, "server started");

    let (shutdown, shutdown_rx) = watch::channel(false);
    let accept_task = tokio::spawn(accept_loop(listener, commander, shutdown_rx));

    Ok(ServerHandle {
        local_addr,
        shutdown,
        accept_task,
    })
}

async fn accept_loop(listener: TcpListener, commander: Arc<Commander>, mut shutdown: watch::Receiver<bool>) {
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::debug!(%addr, "new connection");
                    connections.spawn(handle_connection(stream, addr, commander.clone(), shutdown.clone()));
                }
                Err(e) => {
                    tracing::warn!("Failed to accept connection: {}", e);
                }
            },

            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("connection task failed: {}", e);
                }
            }
        }
    }

    drop(listener);
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            tracing::error!("connection task failed: {}", e);
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commander: Arc<Commander>,
    mut shutdown: watch::Receiver<bool>,
) {
    let (mut reader, writer) = stream.into_split();

    let first = tokio::select! {
        _ = shutdown.changed() => {
            tracing::debug!(%addr, "server stopping before HELLO");
            return;
        }
        first = timeout(HELLO_TIMEOUT, read_message(&mut reader)) => first,
    };

    let hello = match first {
        Ok(Ok(Some(Message::Hello(hello)))) => hello,
        Ok(Ok(Some(other))) => {
            tracing::warn!(%addr, "Expected HELLO, got {:?}", other);
            return;
        }
        Ok(Ok(None)) => {
            tracing::debug!(%addr, "connection closed before HELLO");
            return;
        }
        Ok(Err(e)) => {
            tracing::warn!(%addr, "Failed to read HELLO: {:#}", e);
            return;
        }
        Err(_) => {
            tracing::warn!(%addr, "timed out waiting for HELLO");
            return;
        }
    };

    if hello.protocol_version != PROTOCOL_VERSION {
        tracing::warn!(
            %addr,
            "Protocol version mismatch: coordinator={}, worker={}",
            PROTOCOL_VERSION,
            hello.protocol_version
        );
        return;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(write_loop(writer, rx));

    let peer = format!("{}@{}", hello.node_id, addr);
    let worker_id = commander.register_worker(ChannelLink::new(peer, tx.clone()));

    let reason = read_loop(&mut reader, worker_id, &commander, &mut shutdown, &tx).await;
    tracing::debug!(worker = %worker_id, "connection ending: {}", reason);

    commander.unregister_worker(worker_id);
    drop(tx);
    if let Err(e) = writer_task.await {
        tracing::error!(worker = %worker_id, "writer task failed: {}", e);
    }
}

async fn read_loop(
    reader: &mut OwnedReadHalf,
    worker_id: WorkerId,
    commander: &Commander,
    shutdown: &mut watch::Receiver<bool>,
    tx: &mpsc::UnboundedSender<Message>,
) -> String {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                let _ = tx.send(Message::Shutdown);
                return "server shutting down".to_string();
            }

            msg = read_message(&mut *reader) => match msg {
                Ok(Some(Message::Finish(finish))) => commander.finish(worker_id, finish),
                Ok(Some(other)) => {
                    tracing::warn!(worker = %worker_id, "Unexpected message: {:?}", other);
                }
                Ok(None) => return "worker closed the connection".to_string(),
                Err(e) => return format!("read error: {:#}", e),
            }
        }
    }
}

async fn write_loop(mut writer: OwnedWriteHalf, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(msg) = rx.recv().await {
        let last = matches!(msg, Message::Shutdown);
        if let Err(e) = write_message(&mut writer, &msg).await {
            tracing::warn!("Failed to write to worker: {:#}", e);
            break;
        }
        if last {
            break;
        }
    }
}
