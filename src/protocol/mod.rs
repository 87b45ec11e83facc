//! Protocol Client (C2, §4.2): sequence numbering, request/response
//! correlation, event dispatch in registration order, reverse-request
//! handling, and the 30s default request timeout.
//!
//! Grounded on the teacher's `dap/client.rs` (`DapClient` — `pending_requests`,
//! `event_callbacks`, the message-reader-task dispatch loop). The teacher
//! stubs reverse requests out (`warn!("reverse requests not implemented")`);
//! this builds that handling out per §4.2, in the same message-dispatch
//! shape. Unlike the teacher's separate reader/writer tasks talking over an
//! `mpsc` channel to avoid lock contention, writes here go straight through
//! `Transport::write_message` — `transport::Framing` already serializes
//! writers behind its own internal lock, so a second application-level
//! queue would just be a redundant one.

pub mod types;

use crate::error::{Error, Result};
use crate::scheduler::{CancelToken, Scheduler, TaskHandle};
use crate::transport::Transport;
use types::{Event, Message, Request, Response};

use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, warn};

/// §4.2: every outgoing request carries this timeout unless overridden.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;
type ReverseFuture = std::pin::Pin<Box<dyn std::future::Future<Output = Result<Value>> + Send>>;
type ReverseHandler = Arc<dyn Fn(Option<Value>) -> ReverseFuture + Send + Sync>;
type CloseHandler = Arc<dyn Fn() + Send + Sync>;

struct Shared {
    transport: Arc<dyn Transport>,
    seq: AtomicI64,
    pending: RwLock<HashMap<i64, oneshot::Sender<Response>>>,
    event_handlers: RwLock<HashMap<String, Vec<EventHandler>>>,
    reverse_handlers: RwLock<HashMap<String, ReverseHandler>>,
    close_handler: RwLock<Option<CloseHandler>>,
    closed_once: std::sync::atomic::AtomicBool,
}

/// A live DAP connection. Cheap to clone — every handle shares the same
/// transport, pending-request table, and handler registries.
#[derive(Clone)]
pub struct Client {
    shared: Arc<Shared>,
    reader: Arc<AsyncMutex<Option<TaskHandle<()>>>>,
}

impl Client {
    pub fn new(transport: Arc<dyn Transport>, scheduler: &Scheduler) -> Self {
        let shared = Arc::new(Shared {
            transport,
            seq: AtomicI64::new(1),
            pending: RwLock::new(HashMap::new()),
            event_handlers: RwLock::new(HashMap::new()),
            reverse_handlers: RwLock::new(HashMap::new()),
            close_handler: RwLock::new(None),
            closed_once: std::sync::atomic::AtomicBool::new(false),
        });

        let reader_shared = shared.clone();
        let reader_handle = scheduler.run(move |token| async move {
            Self::reader_loop(reader_shared, token).await;
            Ok::<(), Error>(())
        });

        Self {
            shared,
            reader: Arc::new(AsyncMutex::new(Some(reader_handle))),
        }
    }

    /// Register a callback for `event_name`. Multiple handlers for the same
    /// event fire in registration order (§4.2, §5).
    pub async fn on_event<F>(&self, event_name: &str, handler: F)
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        self.shared
            .event_handlers
            .write()
            .await
            .entry(event_name.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Register the handler for a reverse request (§4.2: `runInTerminal`,
    /// `startDebugging`). Only one handler per command; registering again
    /// replaces it. The handler may resolve synchronously or after
    /// `.await`ing further work — the client doesn't care, it just awaits
    /// the returned future before writing the response frame.
    pub async fn on_request<F>(&self, command: &str, handler: F)
    where
        F: Fn(Option<Value>) -> ReverseFuture + Send + Sync + 'static,
    {
        self.shared
            .reverse_handlers
            .write()
            .await
            .insert(command.to_string(), Arc::new(handler));
    }

    /// Invoked exactly once when the transport closes (EOF or read error),
    /// whichever comes first.
    pub async fn on_close<F>(&self, handler: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.close_handler.write().await = Some(Arc::new(handler));
    }

    fn next_seq(&self) -> i64 {
        self.shared.seq.fetch_add(1, Ordering::SeqCst)
    }

    /// Send `command` with `arguments` and await its response, using the
    /// default 30s timeout (§4.2, §5).
    pub async fn request(&self, command: &str, arguments: Option<Value>) -> Result<Value> {
        self.request_with_timeout(command, arguments, DEFAULT_REQUEST_TIMEOUT)
            .await
    }

    pub async fn request_with_timeout(
        &self,
        command: &str,
        arguments: Option<Value>,
        timeout: Duration,
    ) -> Result<Value> {
        let seq = self.next_seq();
        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };

        let (tx, rx) = oneshot::channel();
        self.shared.pending.write().await.insert(seq, tx);

        debug!(command, seq, "sending DAP request");
        if let Err(e) = self.shared.transport.write_message(&Message::Request(request)).await {
            self.shared.pending.write().await.remove(&seq);
            return Err(e);
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(resp)) => resp,
            Ok(Err(_)) => {
                return Err(Error::Transport(format!(
                    "connection closed while awaiting response to '{command}' (seq {seq})"
                )))
            }
            Err(_) => {
                // §4.2: "later responses are dropped" — remove the pending
                // entry so a late arrival finds nothing to deliver to.
                self.shared.pending.write().await.remove(&seq);
                return Err(Error::Timeout {
                    command: command.to_string(),
                    elapsed_ms: timeout.as_millis() as u64,
                });
            }
        };

        if !response.success {
            return Err(Error::Adapter(
                response
                    .error_message()
                    .unwrap_or_else(|| format!("'{command}' failed with no message")),
            ));
        }

        Ok(response.body.unwrap_or(Value::Null))
    }

    /// Send `command` without waiting for a response — used for `launch`
    /// during the handshake, where the response may not arrive until after
    /// `configurationDone` (§4.3).
    pub async fn request_nowait(&self, command: &str, arguments: Option<Value>) -> Result<i64> {
        let seq = self.next_seq();
        let request = Request {
            seq,
            command: command.to_string(),
            arguments,
        };
        self.shared.transport.write_message(&Message::Request(request)).await?;
        Ok(seq)
    }

    /// Register a waiter for the eventual response to a request already
    /// sent via `request_nowait`.
    pub async fn await_response(&self, seq: i64, timeout: Duration) -> Result<Value> {
        let (tx, rx) = oneshot::channel();
        self.shared.pending.write().await.insert(seq, tx);
        let response = tokio::time::timeout(timeout, rx).await.map_err(|_| {
            Error::Timeout {
                command: format!("seq {seq}"),
                elapsed_ms: timeout.as_millis() as u64,
            }
        })?;
        let response = response
            .map_err(|_| Error::Transport(format!("connection closed while awaiting seq {seq}")))?;
        if !response.success {
            return Err(Error::Adapter(
                response
                    .error_message()
                    .unwrap_or_else(|| format!("seq {seq} failed with no message")),
            ));
        }
        Ok(response.body.unwrap_or(Value::Null))
    }

    pub async fn close(&self) -> Result<()> {
        if let Some(handle) = self.reader.lock().await.take() {
            handle.cancel();
        }
        self.shared.transport.close().await
    }

    async fn reader_loop(shared: Arc<Shared>, token: CancelToken) {
        loop {
            let msg = tokio::select! {
                _ = token.cancelled() => break,
                msg = shared.transport.read_message() => msg,
            };

            match msg {
                Ok(Message::Response(resp)) => {
                    let sender = shared.pending.write().await.remove(&resp.request_seq);
                    match sender {
                        Some(tx) => {
                            let _ = tx.send(resp);
                        }
                        None => warn!(
                            request_seq = resp.request_seq,
                            "response for unknown or already-timed-out request; dropped"
                        ),
                    }
                }
                Ok(Message::Event(event)) => {
                    let handlers = {
                        let all = shared.event_handlers.read().await;
                        all.get(&event.event).cloned().unwrap_or_default()
                    };
                    debug!(event = %event.event, handlers = handlers.len(), "dispatching DAP event");
                    for handler in handlers {
                        handler(event.clone());
                    }
                }
                Ok(Message::Request(req)) => {
                    Self::handle_reverse_request(shared.clone(), req);
                }
                Err(e) => {
                    info!(error = %e, "DAP transport closed");
                    break;
                }
            }
        }

        if !shared.closed_once.swap(true, Ordering::SeqCst) {
            if let Some(handler) = shared.close_handler.read().await.clone() {
                handler();
            }
        }
        // Any requests still awaiting a response will never get one now.
        shared.pending.write().await.clear();
    }

    fn handle_reverse_request(shared: Arc<Shared>, req: Request) {
        tokio::spawn(async move {
            let handler = shared.reverse_handlers.read().await.get(&req.command).cloned();
            let result = match handler {
                Some(h) => h(req.arguments).await,
                None => Err(Error::ReverseRequestHandlerMissing(req.command.clone())),
            };

            let response = match result {
                Ok(body) => Response {
                    seq: 0,
                    request_seq: req.seq,
                    command: req.command.clone(),
                    success: true,
                    message: None,
                    body: if body.is_null() { None } else { Some(body) },
                },
                Err(e) => Response {
                    seq: 0,
                    request_seq: req.seq,
                    command: req.command.clone(),
                    success: false,
                    message: Some(e.to_string()),
                    body: None,
                },
            };

            if let Err(e) = shared
                .transport
                .write_message(&Message::Response(response))
                .await
            {
                warn!(error = %e, command = %req.command, "failed to write reverse-request response");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::Message;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    /// An in-process fake transport driven by channels, standing in for a
    /// real adapter — the same style the teacher's test suite uses via
    /// `MockTestTransport`, but hand-written so both sides of a round trip
    /// (client writes -> test reads, test writes -> client reads) are
    /// directly controllable without a mocking crate.
    /// Two unbounded channels standing in for an adapter's stdin/stdout: the
    /// client reads from `to_adapter` and writes into `from_adapter`; the
    /// `FakeAdapter` handle is the other end of both.
    struct FakeTransport {
        to_adapter: AsyncMutex<mpsc::UnboundedReceiver<Message>>,
        from_adapter: Arc<AsyncMutex<mpsc::UnboundedReceiver<Message>>>,
        write_tap: mpsc::UnboundedSender<Message>,
    }

    struct FakeAdapter {
        inbound: mpsc::UnboundedSender<Message>,
        outbound: Arc<AsyncMutex<mpsc::UnboundedReceiver<Message>>>,
    }

    fn fake_pair() -> (Arc<FakeTransport>, FakeAdapter) {
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
        async fn recv_request(&self) -> Request {
            match self.outbound.lock().await.recv().await {
                Some(Message::Request(r)) => r,
                other => panic!("expected request, got {other:?}"),
            }
        }

        fn reply(&self, to: &Request, success: bool, body: Option<Value>) {
            let _ = self.inbound.send(Message::Response(Response {
                seq: to.seq + 1000,
                request_seq: to.seq,
                command: to.command.clone(),
                success,
                message: if success { None } else { Some("failed".to_string()) },
                body,
            }));
        }

        fn send_event(&self, event: &str, body: Option<Value>) {
            let _ = self.inbound.send(Message::Event(Event {
                seq: 1,
                event: event.to_string(),
                body,
            }));
        }
    }

    #[tokio::test]
    async fn request_resolves_with_the_response_body() {
        let (transport, adapter) = fake_pair();
        let scheduler = Scheduler::new();
        let client = Client::new(transport, &scheduler);

        let client2 = client.clone();
        let call = tokio::spawn(async move {
            client2
                .request("initialize", Some(serde_json::json!({"adapterID": "x"})))
                .await
        });

        let req = adapter.recv_request().await;
        assert_eq!(req.command, "initialize");
        adapter.reply(&req, true, Some(serde_json::json!({"supportsConfigurationDoneRequest": true})));

        let body = call.await.unwrap().unwrap();
        assert_eq!(body["supportsConfigurationDoneRequest"], true);
    }

    #[tokio::test]
    async fn failed_response_surfaces_as_adapter_error() {
        let (transport, adapter) = fake_pair();
        let scheduler = Scheduler::new();
        let client = Client::new(transport, &scheduler);

        let client2 = client.clone();
        let call = tokio::spawn(async move { client2.request("launch", None).await });
        let req = adapter.recv_request().await;
        adapter.reply(&req, false, None);

        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Adapter(_)));
    }

    #[tokio::test]
    async fn events_dispatch_to_registered_handlers_in_order() {
        let (transport, adapter) = fake_pair();
        let scheduler = Scheduler::new();
        let client = Client::new(transport, &scheduler);

        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        for i in 0..3 {
            let order = order.clone();
            client
                .on_event("stopped", move |_e| order.lock().unwrap().push(i))
                .await;
        }

        adapter.send_event("stopped", Some(serde_json::json!({"reason": "breakpoint"})));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn request_times_out_and_a_later_response_is_dropped() {
        let (transport, adapter) = fake_pair();
        let scheduler = Scheduler::new();
        let client = Client::new(transport, &scheduler);

        let client2 = client.clone();
        let call = tokio::spawn(async move {
            client2
                .request_with_timeout("next", None, Duration::from_millis(20))
                .await
        });

        let req = adapter.recv_request().await;
        let err = call.await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));

        // Late response for the already-timed-out request must not panic
        // the reader loop or be deliverable anywhere.
        adapter.reply(&req, true, None);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    #[tokio::test]
    async fn reverse_request_without_a_handler_gets_a_failure_response() {
        let (transport, adapter) = fake_pair();
        let scheduler = Scheduler::new();
        let _client = Client::new(transport.clone(), &scheduler);

        let _ = adapter.inbound.send(Message::Request(Request {
            seq: 5,
            command: "runInTerminal".to_string(),
            arguments: None,
        }));

        let resp = tokio::time::timeout(Duration::from_millis(200), async {
            loop {
                if let Some(Message::Response(r)) = transport.from_adapter.lock().await.recv().await {
                    return r;
                }
            }
        })
        .await
        .unwrap();

        assert!(!resp.success);
        assert_eq!(resp.request_seq, 5);
    }

    #[tokio::test]
    async fn reverse_request_with_handler_gets_its_body_back() {
        let (transport, adapter) = fake_pair();
        let scheduler = Scheduler::new();
        let client = Client::new(transport.clone(), &scheduler);

        client
            .on_request("runInTerminal", |_args| {
                Box::pin(async move { Ok(serde_json::json!({"processId": 123})) })
            })
            .await;

        let _ = adapter.inbound.send(Message::Request(Request {
            seq: 9,
            command: "runInTerminal".to_string(),
            arguments: None,
        }));

        let resp = tokio::time::timeout(Duration::from_millis(200), async {
            loop {
                if let Some(Message::Response(r)) = transport.from_adapter.lock().await.recv().await {
                    return r;
                }
            }
        })
        .await
        .unwrap();

        assert!(resp.success);
        assert_eq!(resp.body.unwrap()["processId"], 123);
    }
}
