//! Recording worker link for testing
//!
//! `RecordingLink` stands in for a real connection. Every dispatched task is
//! appended to a log shared by all links created from the same
//! `DispatchLog`, so tests can check which worker received which task, and
//! in what order, without any networking.

use super::link::WorkerLink;
use super::Task;
use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// One recorded dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatch {
    pub worker: String,
    pub task: Task,
}

/// Shared log of dispatches across links
#[derive(Debug, Clone, Default)]
pub struct DispatchLog {
    entries: Arc<Mutex<Vec<Dispatch>>>,
}

impl DispatchLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a link named `name` that records into this log
    pub fn link(&self, name: impl Into<String>) -> RecordingLink {
        RecordingLink {
            name: name.into(),
            log: self.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn entries(&self) -> Vec<Dispatch> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tasks dispatched to `worker`, oldest first
    pub fn for_worker(&self, worker: &str) -> Vec<Task> {
        self.entries()
            .into_iter()
            .filter(|d| d.worker == worker)
            .map(|d| d.task)
            .collect()
    }
}

/// In-memory worker link
#[derive(Debug, Clone)]
pub struct RecordingLink {
    name: String,
    log: DispatchLog,
    closed: Arc<AtomicBool>,
}

impl RecordingLink {
    /// Make every later dispatch fail, like a dropped connection
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl WorkerLink for RecordingLink {
    fn dispatch(&self, task: &Task) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            anyhow::bail!("link {} is closed", self.name);
        }

        self.log
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Dispatch {
                worker: self.name.clone(),
                task: task.clone(),
            });
        Ok(())
    }

    fn peer(&self) -> String {
        self.name.clone()
    }
}
