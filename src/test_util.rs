//! Shared test-only harness: an in-process fake adapter transport, the same
//! style as the teacher's `mockall`-generated `MockDapTransport` standing in
//! for a real subprocess (`dap/transport.rs`), but hand-written here as a
//! pair of channels so a test can script both directions of the DAP wire
//! without a mocking crate. Reused by `session_runtime`, `graph`, and
//! `breakpoints` tests that need a live `protocol::Client` without spawning
//! a real adapter process.

use crate::error::{Error, Result};
use crate::protocol::types::{Event, Message, Request, Response};
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

pub(crate) struct FakeTransport {
    to_adapter: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
    from_adapter: Arc<AsyncMutex<mpsc::UnboundedReceiver<Message>>>,
    write_tap: mpsc::UnboundedSender<Message>,
}

pub(crate) struct FakeAdapter {
    inbound: mpsc::UnboundedSender<Message>,
    outbound: Arc<AsyncMutex<mpsc::UnboundedReceiver<Message>>>,
}

pub(crate) fn fake_pair() -> (Arc<FakeTransport>, FakeAdapter) {
    let (to_adapter_tx, to_adapter_rx) = mpsc::unbounded_channel();
    let (from_adapter_tx, from_adapter_rx) = mpsc::unbounded_channel();
    let from_adapter_rx = Arc::new(AsyncMutex::new(from_adapter_rx));
    let transport = Arc::new(FakeTransport {
        to_adapter: AsyncMutex::new(to_adapter_rx),
        from_adapter: from_adapter_rx.clone(),
        write_tap: from_adapter_tx,
    });
    let adapter = FakeAdapter {
        inbound: to_adapter_tx,
        outbound: from_adapter_rx,
    };
    (transport, adapter)
}

#[async_trait]
impl Transport for FakeTransport {
    async fn read_message(&self) -> Result<Message> {
        self.to_adapter
            .lock()
            .await
            .recv()
            .await
            .ok_or_else(|| Error::Transport("fake transport closed".to_string()))
    }

    async fn write_message(&self, msg: &Message) -> Result<()> {
        self.write_tap
            .send(msg.clone())
            .map_err(|_| Error::Transport("fake transport closed".to_string()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

impl FakeAdapter {
    /// Wait for the next message the client wrote, regardless of kind.
    pub(crate) async fn recv(&self) -> Message {
        self.outbound
            .lock()
            .await
            .recv()
            .await
            .expect("fake adapter channel closed while a test still expected a message")
    }

    /// Wait for the next outgoing request, panicking on anything else —
    /// for tests asserting exactly what the client sends.
    pub(crate) async fn recv_request(&self) -> Request {
        match self.recv().await {
            Message::Request(r) => r,
            other => panic!("expected a request, got {other:?}"),
        }
    }

    pub(crate) fn reply(&self, to: &Request, success: bool, body: Option<Value>) {
        let _ = self.inbound.send(Message::Response(Response {
            seq: to.seq + 1_000_000,
            request_seq: to.seq,
            command: to.command.clone(),
            success,
            message: if success { None } else { Some("failed".to_string()) },
            body,
        }));
    }

    pub(crate) fn send_event(&self, event: &str, body: Option<Value>) {
        let _ = self.inbound.send(Message::Event(Event {
            seq: 1,
            event: event.to_string(),
            body,
        }));
    }

    /// Drain any messages already queued, without blocking — used to assert
    /// a batch window produced exactly one request rather than several.
    pub(crate) fn try_recv_all(&self) -> Vec<Message> {
        let mut out = Vec::new();
        let mut guard = match self.outbound.try_lock() {
            Ok(g) => g,
            Err(_) => return out,
        };
        while let Ok(msg) = guard.try_recv() {
            out.push(msg);
        }
        out
    }
}
