//! Worker connection handles
//!
//! The commander never touches sockets. It sees each connected worker as a
//! `WorkerLink`: something that can take a task and get it onto the wire in
//! order. The server's implementation is `ChannelLink`, which hands EXEC
//! frames to the connection's writer task.

use super::Task;
use crate::distributed::protocol::Message;
use anyhow::Result;
use tokio::sync::mpsc;

/// Live connection to one worker
///
/// `dispatch` is called with the commander's lock held, so it must not
/// block. Ordering of successive dispatches on one link must be preserved.
pub trait WorkerLink: Send + Sync {
    /// Queue `task` for delivery to the worker
    ///
    /// An error means the connection is gone; the commander then drops the
    /// worker and puts the task back at the head of the queue.
    fn dispatch(&self, task: &Task) -> Result<()>;

    /// Peer description for logs
    fn peer(&self) -> String;
}

/// Link backed by a connection's outbound message channel
#[derive(Debug, Clone)]
pub struct ChannelLink {
    peer: String,
    tx: mpsc::UnboundedSender<Message>,
}

impl ChannelLink {
    pub fn new(peer: impl Into<String>, tx: mpsc::UnboundedSender<Message>) -> Self {
        Self { peer: peer.into(), tx }
    }
}

impl WorkerLink for ChannelLink {
    fn dispatch(&self, task: &Task) -> Result<()> {
        self.tx
            .send(Message::Exec(task.to_exec()))
            .map_err(|_| anyhow::anyhow!("connection to {} is closed", self.peer))
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::CorrelationId;
    use serde_json::json;

    fn task() -> Task {
        Task {
            id: CorrelationId::generate(),
            command: "echo".to_string(),
            args: json!([1, 2]),
        }
    }

    #[test]
    fn test_channel_link_sends_exec() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let link = ChannelLink::new("10.0.0.1:5000", tx);
        let task = task();

        link.dispatch(&task).unwrap();

        match rx.try_recv().unwrap() {
            Message::Exec(exec) => {
                assert_eq!(exec.id, task.id);
                assert_eq!(exec.command, "echo");
                assert_eq!(exec.args, json!([1, 2]));
            }
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_channel_link_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let link = ChannelLink::new("peer", tx);

        let err = link.dispatch(&task()).unwrap_err();
        assert!(err.to_string().contains("peer"));
    }
}
