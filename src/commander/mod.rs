//! Task scheduling
//!
//! The `Commander` is the coordinator's single authority for who runs what.
//! It owns two FIFO pools, idle workers and pending tasks, and pairs their
//! oldest entries whenever both are non-empty. A dispatched worker leaves
//! the idle pool until it reports FINISH for its task.
//!
//! # Pools
//!
//! - **idle**: worker ids ready for work, in the order they became ready
//! - **pending**: submitted tasks not yet dispatched, in submission order
//! - **in_flight**: worker id → correlation id of the task it is running
//! - **results**: correlation id → resolver for the caller's handle
//!
//! Worker identity (`WorkerId`) is kept apart from the live connection
//! (`WorkerLink`); pools hold ids and the link is looked up in `links`.
//!
//! # Concurrency
//!
//! All state sits behind one mutex. Every operation runs to completion under
//! the lock without awaiting, so no caller ever observes a half-applied
//! match.

pub mod link;
pub mod mock;

use crate::distributed::protocol::{ExecMessage, FinishMessage};
use crate::error::TaskError;
use crate::rpc::{CorrelationId, PendingResult, PendingTable, TaskOutcome};
use crate::Value;
use link::WorkerLink;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard};
use std::task::{Context, Poll};

/// Coordinator-assigned identifier of one worker connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkerId(pub u64);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work awaiting or undergoing execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: CorrelationId,
    pub command: String,
    pub args: Value,
}

impl Task {
    pub fn to_exec(&self) -> ExecMessage {
        ExecMessage {
            id: self.id,
            command: self.command.clone(),
            args: self.args.clone(),
        }
    }
}

/// Point-in-time view of the commander's pools
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommanderStats {
    pub connected_workers: usize,
    pub idle_workers: usize,
    pub pending_tasks: usize,
    pub in_flight: usize,
    /// Submitted tasks whose result has not been delivered yet
    pub awaiting_results: usize,
    /// Total dispatches since creation
    pub dispatched: u64,
}

#[derive(Default)]
struct CommanderState {
    next_worker_id: u64,
    links: HashMap<WorkerId, Box<dyn WorkerLink>>,
    idle: VecDeque<WorkerId>,
    pending: VecDeque<Task>,
    in_flight: HashMap<WorkerId, CorrelationId>,
    results: PendingTable,
    dispatched: u64,
}

impl CommanderState {
    /// Pair idle workers with pending tasks until one pool runs dry
    fn attempt_match(&mut self) {
        while !self.idle.is_empty() && !self.pending.is_empty() {
            let (Some(worker_id), Some(task)) = (self.idle.pop_front(), self.pending.pop_front()) else {
                break;
            };

            let Some(link) = self.links.get(&worker_id) else {
                // Worker vanished while idle; keep the task at the head.
                self.pending.push_front(task);
                continue;
            };

            match link.dispatch(&task) {
                Ok(()) => {
                    tracing::debug!(task = %task.id, worker = %worker_id, command = %task.command, "dispatched task");
                    self.in_flight.insert(worker_id, task.id);
                    self.dispatched += 1;
                }
                Err(e) => {
                    tracing::warn!(worker = %worker_id, "dropping worker after failed dispatch: {:#}", e);
                    self.links.remove(&worker_id);
                    self.pending.push_front(task);
                }
            }
        }
    }
}

/// Matches pending tasks to idle workers in strict FIFO order
#[derive(Default)]
pub struct Commander {
    state: Mutex<CommanderState>,
}

impl Commander {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CommanderState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Submit `command` with `args` for execution on some worker
    ///
    /// Never blocks. The returned handle resolves with the worker's result,
    /// or rejects with the worker's error description.
    pub fn submit(&self, command: impl Into<String>, args: Value) -> PendingResult {
        let mut state = self.lock();
        let (id, handle) = state.results.register();
        let task = Task {
            id,
            command: command.into(),
            args,
        };

        tracing::debug!(task = %id, command = %task.command, "adding task to pool");
        state.pending.push_back(task);
        state.attempt_match();

        handle
    }

    /// Typed variant of `submit`
    ///
    /// Fails immediately only if `args` cannot be serialized.
    pub fn submit_as<A, R>(&self, command: impl Into<String>, args: &A) -> anyhow::Result<TypedResult<R>>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let args = serde_json::to_value(args)?;
        Ok(TypedResult {
            inner: self.submit(command, args),
            _marker: PhantomData,
        })
    }

    /// Add a newly connected worker to the idle pool
    pub fn register_worker<L>(&self, link: L) -> WorkerId
    where
        L: WorkerLink + 'static,
    {
        let mut state = self.lock();
        let worker_id = WorkerId(state.next_worker_id);
        state.next_worker_id += 1;

        tracing::info!(worker = %worker_id, peer = %link.peer(), "registering worker");
        state.links.insert(worker_id, Box::new(link));
        state.idle.push_back(worker_id);
        state.attempt_match();

        worker_id
    }

    /// Handle a FINISH reported by `worker_id`
    ///
    /// Only a FINISH for the task the worker is running counts: it settles
    /// that task's pending result, re-admits the worker and matches again.
    /// Any other FINISH is ignored and the worker keeps its task, so a later
    /// disconnect still rejects it with `TaskError::WorkerLost`.
    pub fn finish(&self, worker_id: WorkerId, finish: FinishMessage) {
        let mut state = self.lock();

        match state.in_flight.get(&worker_id).copied() {
            Some(running) if running == finish.id => {
                state.in_flight.remove(&worker_id);
            }
            Some(running) => {
                tracing::warn!(worker = %worker_id, expected = %running, got = %finish.id, "ignoring finish that does not match the task in flight");
                return;
            }
            None => {
                tracing::debug!(worker = %worker_id, task = %finish.id, "ignoring finish from worker with no task in flight");
                return;
            }
        }

        let outcome: TaskOutcome = if finish.success {
            Ok(finish.result)
        } else {
            Err(TaskError::Failed(finish_error(&finish)))
        };

        if !state.results.resolve(&finish.id, outcome) {
            tracing::debug!(task = %finish.id, "caller no longer tracked for finished task");
        }

        if state.links.contains_key(&worker_id) {
            tracing::debug!(worker = %worker_id, "adding worker to pool");
            state.idle.push_back(worker_id);
        }

        state.attempt_match();
    }

    /// Forget a disconnected worker
    ///
    /// A task the worker was running is not retried; its caller is rejected
    /// with `TaskError::WorkerLost`.
    pub fn unregister_worker(&self, worker_id: WorkerId) {
        let mut state = self.lock();

        if state.links.remove(&worker_id).is_none() {
            return;
        }
        state.idle.retain(|id| *id != worker_id);
        tracing::info!(worker = %worker_id, "worker disconnected");

        if let Some(task_id) = state.in_flight.remove(&worker_id) {
            tracing::warn!(worker = %worker_id, task = %task_id, "worker lost with task in flight");
            state.results.resolve(&task_id, Err(TaskError::WorkerLost(worker_id)));
        }
    }

    pub fn stats(&self) -> CommanderStats {
        let state = self.lock();
        CommanderStats {
            connected_workers: state.links.len(),
            idle_workers: state.idle.len(),
            pending_tasks: state.pending.len(),
            in_flight: state.in_flight.len(),
            awaiting_results: state.results.len(),
            dispatched: state.dispatched,
        }
    }

    /// Whether `worker_id` is currently in the idle pool
    pub fn is_idle(&self, worker_id: WorkerId) -> bool {
        self.lock().idle.contains(&worker_id)
    }
}

impl fmt::Debug for Commander {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commander").field("stats", &self.stats()).finish()
    }
}

fn finish_error(finish: &FinishMessage) -> String {
    let description = finish.error_description();
    if description.is_empty() {
        "worker reported failure without a description".to_string()
    } else {
        description
    }
}

/// Handle returned by `Commander::submit_as`
///
/// Resolves to the decoded result type.
#[derive(Debug)]
pub struct TypedResult<R> {
    inner: PendingResult,
    _marker: PhantomData<fn() -> R>,
}

impl<R> TypedResult<R> {
    pub fn id(&self) -> CorrelationId {
        self.inner.id()
    }
}

impl<R: DeserializeOwned> Future for TypedResult<R> {
    type Output = Result<R, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner).poll(cx).map(|outcome| {
            outcome.and_then(|value| {
                serde_json::from_value(value).map_err(|e| TaskError::Decode(e.to_string()))
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::mock::DispatchLog;
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use serde_json::json;

    #[tokio::test]
    async fn test_round_trip_through_finish() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w1 = commander.register_worker(log.link("w1"));

        let handle = commander.submit("inc", json!({"x": 1}));
        let dispatched = log.for_worker("w1");
        assert_eq!(dispatched.len(), 1);
        assert_eq!(dispatched[0].command, "inc");
        assert_eq!(dispatched[0].args, json!({"x": 1}));
        assert!(!commander.is_idle(w1));

        commander.finish(w1, FinishMessage::success(dispatched[0].id, json!({"x": 2})));

        assert_eq!(handle.await.unwrap(), json!({"x": 2}));
        assert!(commander.is_idle(w1));
    }

    #[tokio::test]
    async fn test_failure_rejects_handle() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w1 = commander.register_worker(log.link("w1"));

        let handle = commander.submit("explode", Value::Null);
        let id = log.for_worker("w1")[0].id;
        commander.finish(w1, FinishMessage::failure(id, "kaboom"));

        match handle.await {
            Err(TaskError::Failed(msg)) => assert_eq!(msg, "kaboom"),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(commander.is_idle(w1));
    }

    #[tokio::test]
    async fn test_failure_without_description_is_not_empty() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w1 = commander.register_worker(log.link("w1"));

        let handle = commander.submit("explode", Value::Null);
        let id = log.for_worker("w1")[0].id;
        commander.finish(w1, FinishMessage { id, success: false, result: json!({"error": ""}) });

        match handle.await {
            Err(TaskError::Failed(msg)) => assert!(!msg.is_empty()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_tasks_wait_for_workers() {
        let commander = Commander::new();
        let log = DispatchLog::new();

        let _handles: Vec<_> = (0..3).map(|i| commander.submit("t", json!(i))).collect();
        assert!(log.is_empty());
        assert_eq!(commander.stats().pending_tasks, 3);

        commander.register_worker(log.link("w1"));
        assert_eq!(log.len(), 1);
        assert_eq!(commander.stats().pending_tasks, 2);
        assert_eq!(commander.stats().in_flight, 1);
    }

    #[test]
    fn test_fifo_matching() {
        let commander = Commander::new();
        let log = DispatchLog::new();

        let handles: Vec<_> = (0..4).map(|i| commander.submit("t", json!(i))).collect();
        for name in ["w0", "w1", "w2", "w3"] {
            commander.register_worker(log.link(name));
        }

        let entries = log.entries();
        assert_eq!(entries.len(), 4);
        for (n, entry) in entries.iter().enumerate() {
            assert_eq!(entry.worker, format!("w{}", n));
            assert_eq!(entry.task.id, handles[n].id());
            assert_eq!(entry.task.args, json!(n));
        }
    }

    #[test]
    fn test_burst_of_workers_drains_queue() {
        let commander = Commander::new();
        let log = DispatchLog::new();

        for name in ["a", "b", "c"] {
            commander.register_worker(log.link(name));
        }
        let _handles: Vec<_> = (0..5).map(|i| commander.submit("t", json!(i))).collect();

        let stats = commander.stats();
        assert_eq!(log.len(), 3);
        assert_eq!(stats.idle_workers, 0);
        assert_eq!(stats.pending_tasks, 2);
        assert_eq!(stats.in_flight, 3);
        assert_eq!(stats.awaiting_results, 5);
    }

    #[test]
    fn test_finish_feeds_next_task_to_same_worker() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w = commander.register_worker(log.link("solo"));

        let _handles: Vec<_> = (0..3).map(|i| commander.submit("t", json!(i))).collect();
        for expected in 0..3 {
            let tasks = log.for_worker("solo");
            assert_eq!(tasks.len(), expected + 1);
            let current = &tasks[expected];
            assert_eq!(current.args, json!(expected));
            assert!(!commander.is_idle(w));
            commander.finish(w, FinishMessage::success(current.id, Value::Null));
        }

        assert!(commander.is_idle(w));
        assert_eq!(commander.stats().dispatched, 3);
        assert_eq!(commander.stats().awaiting_results, 0);
    }

    #[tokio::test]
    async fn test_duplicate_finish_is_noop() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w = commander.register_worker(log.link("w"));

        let handle = commander.submit("t", Value::Null);
        let id = log.for_worker("w")[0].id;

        commander.finish(w, FinishMessage::success(id, json!("first")));
        commander.finish(w, FinishMessage::success(id, json!("second")));

        assert_eq!(handle.await.unwrap(), json!("first"));
        // Re-admitted once only.
        assert_eq!(commander.stats().idle_workers, 1);
    }

    #[test]
    fn test_unknown_finish_is_ignored() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w = commander.register_worker(log.link("w"));

        commander.finish(w, FinishMessage::success(CorrelationId::generate(), Value::Null));

        let stats = commander.stats();
        assert_eq!(stats.idle_workers, 1);
        assert_eq!(stats.awaiting_results, 0);
    }

    #[tokio::test]
    async fn test_mismatched_finish_keeps_task_in_flight() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w = commander.register_worker(log.link("a"));

        let handle = commander.submit("t", Value::Null);
        let queued = commander.submit("t", Value::Null);

        commander.finish(w, FinishMessage::success(CorrelationId::generate(), json!("stray")));
        // Not even the id of another caller's queued task settles anything
        commander.finish(w, FinishMessage::success(queued.id(), json!("stray")));

        let stats = commander.stats();
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.idle_workers, 0);
        assert_eq!(stats.pending_tasks, 1);
        assert_eq!(stats.awaiting_results, 2);
        assert_eq!(log.len(), 1);

        commander.unregister_worker(w);
        assert_eq!(handle.await, Err(TaskError::WorkerLost(w)));
        assert_eq!(commander.stats().pending_tasks, 1);
    }

    #[tokio::test]
    async fn test_disconnect_rejects_in_flight_task() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w = commander.register_worker(log.link("w"));

        let handle = commander.submit("t", Value::Null);
        let queued = commander.submit("t", Value::Null);
        commander.unregister_worker(w);

        assert_eq!(handle.await, Err(TaskError::WorkerLost(w)));

        let stats = commander.stats();
        assert_eq!(stats.connected_workers, 0);
        assert_eq!(stats.pending_tasks, 1);

        // The queued task goes to the next worker that shows up.
        let w2 = commander.register_worker(log.link("w2"));
        let id = log.for_worker("w2")[0].id;
        assert_eq!(id, queued.id());
        commander.finish(w2, FinishMessage::success(id, json!(7)));
        assert_eq!(queued.await.unwrap(), json!(7));
    }

    #[test]
    fn test_idle_worker_disconnect() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let w = commander.register_worker(log.link("w"));
        commander.unregister_worker(w);
        commander.unregister_worker(w);

        let _handle = commander.submit("t", Value::Null);
        assert!(log.is_empty());
        assert_eq!(commander.stats().pending_tasks, 1);
    }

    #[test]
    fn test_failed_dispatch_requeues_task() {
        let commander = Commander::new();
        let log = DispatchLog::new();
        let dead = log.link("dead");
        dead.close();
        commander.register_worker(dead);

        let handle = commander.submit("t", json!("payload"));
        assert!(log.is_empty());
        assert_eq!(commander.stats().connected_workers, 0);

        commander.register_worker(log.link("alive"));
        let tasks = log.for_worker("alive");
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, handle.id());
    }

    #[tokio::test]
    async fn test_typed_submit() {
        #[derive(Serialize)]
        struct Args {
            x: i64,
        }
        #[derive(Deserialize, Debug, PartialEq)]
        struct Out {
            x: i64,
        }

        let commander = Commander::new();
        let log = DispatchLog::new();
        let w = commander.register_worker(log.link("w"));

        let handle = commander.submit_as::<_, Out>("inc", &Args { x: 1 }).unwrap();
        let task = &log.for_worker("w")[0];
        assert_eq!(task.args, json!({"x": 1}));
        commander.finish(w, FinishMessage::success(task.id, json!({"x": 2})));
        assert_eq!(handle.await.unwrap(), Out { x: 2 });

        let bad = commander.submit_as::<_, Out>("inc", &Args { x: 1 }).unwrap();
        let task = &log.for_worker("w")[1];
        commander.finish(w, FinishMessage::success(task.id, json!("nope")));
        assert!(matches!(bad.await, Err(TaskError::Decode(_))));
    }

    #[test]
    fn test_dispatch_count_is_min_of_workers_and_tasks() {
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..50 {
            let commander = Commander::new();
            let log = DispatchLog::new();
            let mut workers = 0usize;
            let mut tasks = 0usize;
            let mut handles = Vec::new();

            for _ in 0..rng.gen_range(1..40) {
                if rng.gen_bool(0.5) {
                    commander.register_worker(log.link(format!("w{}", workers)));
                    workers += 1;
                } else {
                    handles.push(commander.submit("t", json!(tasks)));
                    tasks += 1;
                }
                assert_eq!(log.len(), workers.min(tasks));

                let stats = commander.stats();
                assert!(stats.idle_workers == 0 || stats.pending_tasks == 0);
                assert_eq!(stats.in_flight, workers.min(tasks));
            }

            // Every task reaches a distinct worker slot and never twice.
            let mut ids: Vec<_> = log.entries().into_iter().map(|d| d.task.id).collect();
            let before = ids.len();
            ids.sort_by_key(|id| id.as_u128());
            ids.dedup();
            assert_eq!(ids.len(), before);
        }
    }
}
