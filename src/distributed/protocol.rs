//! Coordinator/worker wire protocol
//!
//! Messages are encoded with MessagePack (rmp-serde), which round-trips the
//! dynamic `Value` arguments and results exactly as serde sees them.
//!
//! # Message Flow
//!
//! ```text
//! Coordinator                     Worker
//!     |                              |
//!     |<------- HELLO ---------------|
//!     |                              |
//!     |-- EXEC(id, command, args) -->|
//!     |                              |
//!     |<- FINISH(id, success, res) --|
//!     |           ...                |
//!     |-------- SHUTDOWN ----------->|
//! ```
//!
//! A worker never has more than one EXEC outstanding.
//!
//! # Message Framing
//!
//! Each message is prefixed with a 4-byte length field (little-endian u32):
//!
//! ```text
//! [4 bytes: message length][N bytes: MessagePack-serialized message]
//! ```

use crate::rpc::CorrelationId;
use crate::Value;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Protocol version
///
/// Coordinator and workers must agree; the coordinator refuses a HELLO with
/// any other version.
pub const PROTOCOL_VERSION: u32 = 1;

/// Largest accepted frame body
pub const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

/// Protocol message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Worker introduction (Worker → Coordinator), always the first frame
    Hello(HelloMessage),

    /// Dispatch of one task (Coordinator → Worker)
    Exec(ExecMessage),

    /// Outcome of one task (Worker → Coordinator)
    Finish(FinishMessage),

    /// Coordinator is stopping (Coordinator → Worker)
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloMessage {
    pub protocol_version: u32,

    /// Hostname or configured node id of the worker
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecMessage {
    pub id: CorrelationId,
    pub command: String,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishMessage {
    pub id: CorrelationId,
    pub success: bool,

    /// Return value on success, `{"error": description}` on failure
    pub result: Value,
}

impl FinishMessage {
    pub fn success(id: CorrelationId, result: Value) -> Self {
        Self { id, success: true, result }
    }

    pub fn failure(id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: serde_json::json!({ "error": error.into() }),
        }
    }

    /// Human-readable failure description carried in `result`
    pub fn error_description(&self) -> String {
        match &self.result {
            Value::Object(map) => match map.get("error") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => self.result.to_string(),
            },
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// Serialize a message to a length-prefixed frame
pub fn serialize_message(msg: &Message) -> Result<Vec<u8>> {
    let msg_bytes = rmp_serde::to_vec(msg)
        .context("Failed to serialize message")?;

    if msg_bytes.len() > MAX_MESSAGE_LEN {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_bytes.len(), MAX_MESSAGE_LEN);
    }

    let msg_len = msg_bytes.len() as u32;
    let mut framed = Vec::with_capacity(4 + msg_bytes.len());
    framed.extend_from_slice(&msg_len.to_le_bytes());
    framed.extend_from_slice(&msg_bytes);

    Ok(framed)
}

/// Read one complete message from a stream
///
/// Returns `Ok(None)` if the stream ends before a complete length prefix.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context("Failed to read message length"),
    }

    let msg_len = u32::from_le_bytes(len_buf) as usize;
    if msg_len > MAX_MESSAGE_LEN {
        anyhow::bail!("Message too large: {} bytes (max {})", msg_len, MAX_MESSAGE_LEN);
    }

    let mut msg_buf = vec![0u8; msg_len];
    reader.read_exact(&mut msg_buf).await
        .context("Failed to read message body")?;

    let msg = rmp_serde::from_slice(&msg_buf)
        .context("Failed to deserialize message")?;

    Ok(Some(msg))
}

/// Write one message to a stream and flush it
pub async fn write_message<W>(writer: &mut W, msg: &Message) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let framed = serialize_message(msg)?;

    writer.write_all(&framed).await
        .context("Failed to write message")?;
    writer.flush().await
        .context("Failed to flush stream")?;

    Ok(())
}
