//! Networked coordinator/worker implementation
//!
//! # Architecture
//!
//! - **Server**: runs in the coordinator, accepts worker connections and
//!   feeds them to the `Commander`
//! - **Worker**: runs in each worker process, executes dispatched commands
//!   and reports back
//!
//! # Modules
//!
//! - `protocol`: Message definitions and framing
//! - `server`: Coordinator-side connection handling
//! - `worker`: Worker-side execution loop

pub mod protocol;
pub mod server;
pub mod worker;

// Re-export key types
pub use protocol::{
    Message,
    HelloMessage,
    ExecMessage,
    FinishMessage,
    PROTOCOL_VERSION,
};

pub use server::ServerHandle;
pub use worker::{WorkerNode, WorkerSession};
