//! Process-level entry point
//!
//! `GridWorker` bundles the pieces one process needs for its role. A
//! coordinator owns a `Commander` and the listening server; a worker owns a
//! `CommandRegistry` and dials the coordinator. Calling an operation that
//! belongs to the other role is an error.

use crate::commander::Commander;
use crate::config::{Config, Mode};
use crate::distributed::server::{self, ServerHandle};
use crate::distributed::{WorkerNode, WorkerSession};
use crate::registry::CommandRegistry;
use crate::rpc::PendingResult;
use crate::Value;
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug)]
pub struct GridWorker {
    config: Config,
    commander: Option<Arc<Commander>>,
    registry: Option<Arc<CommandRegistry>>,
    server: Option<ServerHandle>,
}

impl GridWorker {
    pub fn new(config: Config) -> Self {
        let (commander, registry) = match config.mode {
            Mode::Coordinator => (Some(Arc::new(Commander::new())), None),
            Mode::Worker => (None, Some(Arc::new(CommandRegistry::new()))),
        };

        Self {
            config,
            commander,
            registry,
            server: None,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn commander(&self) -> Option<&Arc<Commander>> {
        self.commander.as_ref()
    }

    pub fn registry(&self) -> Option<&Arc<CommandRegistry>> {
        self.registry.as_ref()
    }

    /// Start listening for workers; returns the bound address
    pub async fn start_server(&mut self) -> Result<SocketAddr> {
        let Some(commander) = self.commander.clone() else {
            anyhow::bail!("start_server is only available in coordinator mode");
        };
        if self.server.is_some() {
            anyhow::bail!("server is already running");
        }

        let handle = server::start(&self.config.network.bind_address(), commander).await?;
        let addr = handle.local_addr();
        self.server = Some(handle);

        Ok(addr)
    }

    /// Stop the server if it is running
    pub async fn stop_server(&mut self) -> Result<()> {
        match self.server.take() {
            Some(handle) => handle.stop().await,
            None => Ok(()),
        }
    }

    /// Connect to the configured coordinator and start serving its tasks
    pub async fn connect_to_server(&self) -> Result<WorkerSession> {
        let Some(registry) = self.registry.clone() else {
            anyhow::bail!("connect_to_server is only available in worker mode");
        };

        let worker = &self.config.worker;
        let mut node = WorkerNode::new(registry).with_retry(
            worker.connect_attempts,
            Duration::from_millis(worker.connect_delay_ms),
        );
        if let Some(ref node_id) = worker.node_id {
            node = node.with_node_id(node_id.clone());
        }

        node.connect(&self.config.network.connect_address()).await
    }

    /// Make `name` callable by the coordinator
    ///
    /// Commands may be registered before or after connecting.
    pub fn register_command<F>(&self, name: impl Into<String>, func: F) -> Result<()>
    where
        F: Fn(Value) -> Result<Value> + Send + Sync + 'static,
    {
        let Some(ref registry) = self.registry else {
            anyhow::bail!("register_command is only available in worker mode");
        };

        registry.register(name, func);
        Ok(())
    }

    /// Queue `command` for the next free worker
    pub fn execute_command(&self, command: impl Into<String>, args: Value) -> Result<PendingResult> {
        let Some(ref commander) = self.commander else {
            anyhow::bail!("execute_command is only available in coordinator mode");
        };

        Ok(commander.submit(command, args))
    }
}
