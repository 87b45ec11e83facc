//! Byte-stream transports for a DAP connection (§4.1): stdio, TCP, and
//! "server" (spawn + watch stdout for a port, shared across sibling
//! sessions). All three frame messages the same way — see `framing`.

pub mod framing;
pub mod server;
pub mod stdio;
pub mod tcp;

use crate::error::Result;
use crate::protocol::types::Message;
use async_trait::async_trait;

pub use server::ServerTransport;
pub use stdio::StdioTransport;
pub use tcp::TcpTransport;

/// The contract every transport variant implements: `write(bytes) -> ()`,
/// `read -> stream<bytes>`, `close -> ()`, expressed here at message
/// granularity since framing is shared (`framing::Framing`).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn read_message(&self) -> Result<Message>;
    async fn write_message(&self, msg: &Message) -> Result<()>;

    /// Idempotent. The `on_close` transport hook (§4.1) is invoked exactly
    /// once by callers that observe EOF from `read_message`; `close` itself
    /// may be called any number of times.
    async fn close(&self) -> Result<()>;
}
