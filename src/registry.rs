//! Command registry
//!
//! Workers register the commands they can run here, by name. The execution
//! loop looks commands up by the name carried in each `exec` frame.
//!
//! Registration goes through `&self`, so commands can still be added after the
//! worker has connected.

use crate::error::CommandError;
use crate::Value;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// A locally executable command
pub type CommandFn = Arc<dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync>;

/// Name to function directory
#[derive(Default)]
pub struct CommandRegistry {
    commands: RwLock<HashMap<String, CommandFn>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `name`, replacing any earlier registration
    pub fn register<F>(&self, name: impl Into<String>, func: F)
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        let name = name.into();
        let mut commands = self.commands.write().unwrap_or_else(|e| e.into_inner());
        if commands.insert(name.clone(), Arc::new(func)).is_some() {
            tracing::debug!(command = %name, "replaced registered command");
        } else {
            tracing::debug!(command = %name, "registered command");
        }
    }

    /// Register a command with typed input and output
    ///
    /// Arguments are decoded into `A` before the call; a decode failure is
    /// reported as `CommandError::InvalidArguments`.
    pub fn register_typed<A, R, F>(&self, name: impl Into<String>, func: F)
    where
        A: DeserializeOwned,
        R: Serialize,
        F: Fn(A) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        self.register(name, move |args: Value| {
            let input: A = serde_json::from_value(args)
                .map_err(|e| CommandError::InvalidArguments(e.to_string()))?;
            let output = func(input)?;
            Ok(serde_json::to_value(output)?)
        });
    }

    /// Run the command registered under `name`
    ///
    /// The registry lock is released before the command runs. Panics are not
    /// caught here; that is the execution loop's job.
    pub fn execute(&self, name: &str, args: Value) -> Result<Value, CommandError> {
        let command = {
            let commands = self.commands.read().unwrap_or_else(|e| e.into_inner());
            commands.get(name).cloned()
        };

        let Some(command) = command else {
            tracing::error!(command = %name, "command not found");
            return Err(CommandError::NotFound(name.to_string()));
        };

        tracing::debug!(command = %name, "executing command");
        command(args).map_err(|e| match e.downcast::<CommandError>() {
            Ok(command_error) => command_error,
            Err(other) => CommandError::Failed(format!("{:#}", other)),
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.commands
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(name)
    }

    /// Registered command names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .commands
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.commands.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.names())
            .finish()
    }
}
