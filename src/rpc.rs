//! Request/response correlation
//!
//! Every submitted task gets a `CorrelationId`. The coordinator keeps one
//! `Resolver` per id in a `PendingTable`; the caller holds the matching
//! `PendingResult`. When the worker's `finish` frame comes back (in any order
//! relative to other tasks) the table hands the outcome to the resolver, which
//! wakes the caller.
//!
//! A resolver is consumed by `resolve`, so each id is settled at most once.
//! Removing the entry from the table on first resolution makes any duplicate
//! `finish` for the same id a no-op.

use crate::error::TaskError;
use crate::Value;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

/// Outcome delivered to a caller
pub type TaskOutcome = std::result::Result<Value, TaskError>;

/// Unique token linking a dispatched task to its result
///
/// A random 128-bit value. On the wire it is a 32 character lowercase hex string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(u128);

impl CorrelationId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for CorrelationId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        u128::from_str_radix(s, 16).map(Self)
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Coordinator-side half of a pending task
///
/// Holds the only sender for the caller's `PendingResult`.
#[derive(Debug)]
pub struct Resolver {
    tx: oneshot::Sender<TaskOutcome>,
}

impl Resolver {
    /// Settle the task. Consumes the resolver.
    ///
    /// Returns false if the caller already dropped its `PendingResult`.
    pub fn resolve(self, outcome: TaskOutcome) -> bool {
        self.tx.send(outcome).is_ok()
    }
}

/// Caller-visible handle for an in-flight task
///
/// Await it to get the task's result. If the coordinator drops the task
/// without settling it, the handle yields `TaskError::Abandoned`.
#[derive(Debug)]
pub struct PendingResult {
    id: CorrelationId,
    rx: oneshot::Receiver<TaskOutcome>,
}

impl PendingResult {
    pub fn id(&self) -> CorrelationId {
        self.id
    }
}

impl Future for PendingResult {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(TaskError::Abandoned)))
    }
}

/// Create a linked resolver/result pair for `id`
pub fn pending_pair(id: CorrelationId) -> (Resolver, PendingResult) {
    let (tx, rx) = oneshot::channel();
    (Resolver { tx }, PendingResult { id, rx })
}

/// Table of unresolved tasks keyed by correlation id
#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<CorrelationId, Resolver>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id and store its resolver
    pub fn register(&mut self) -> (CorrelationId, PendingResult) {
        let mut id = CorrelationId::generate();
        while self.entries.contains_key(&id) {
            id = CorrelationId::generate();
        }

        let (resolver, pending) = pending_pair(id);
        self.entries.insert(id, resolver);
        (id, pending)
    }

    /// Settle and remove the entry for `id`
    ///
    /// Returns false if no entry exists (already resolved or never issued).
    pub fn resolve(&mut self, id: &CorrelationId, outcome: TaskOutcome) -> bool {
        match self.entries.remove(id) {
            Some(resolver) => {
                if !resolver.resolve(outcome) {
                    tracing::debug!(%id, "caller dropped result handle before resolution");
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
