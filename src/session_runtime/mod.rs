//! Session Runtime (C3, §4.3): the initialize/launch/attach/
//! configurationDone handshake, session lifecycle state, `startDebugging`
//! child sessions capped at depth 5, and graceful shutdown.
//!
//! Grounded on the teacher's `debug/session.rs::DebugSession::initialize_and_launch`
//! (the initialize → wait-for-`initialized` → configurationDone → await
//! launch-response ordering this module also follows) and
//! `debug/multi_session.rs::MultiSessionManager` (owning child sessions and
//! tearing them down before their parent). Unlike the teacher, which only
//! ever has one adapter kind per process, this generalizes the handshake to
//! any `Adapter` and adds the depth cap `startDebugging` needs that a
//! single-session manager never had to enforce.

pub mod hooks;

pub use hooks::{DefaultHooks, SessionHooks};

use crate::adapter::Adapter;
use crate::error::{Error, Result};
use crate::protocol::types::{
    Capabilities, DisconnectArguments, InitializeRequestArguments, StartDebuggingRequestArguments,
    TerminateArguments,
};
use crate::protocol::Client;
use crate::reactive::Signal;
use crate::scheduler::Scheduler;
use serde_json::Value;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tracing::{info, warn};
use uuid::Uuid;

/// §4.3: a `startDebugging` chain deeper than this is rejected rather than
/// spawned.
pub const MAX_CHILD_DEPTH: u32 = 5;

/// §4.3: the ceiling on the whole initialize→configurationDone handshake,
/// independent of `protocol::DEFAULT_REQUEST_TIMEOUT` on any one request.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// The `launch` vs `attach` choice a host makes when starting a session.
/// Wraps the adapter-specific configuration object verbatim — this crate
/// does not validate or interpret its shape (§4.10 Non-goals: no
/// `launch.json` schema).
#[derive(Debug, Clone)]
pub enum StartRequest {
    Launch(Value),
    Attach(Value),
}

impl StartRequest {
    fn command(&self) -> &'static str {
        match self {
            StartRequest::Launch(_) => "launch",
            StartRequest::Attach(_) => "attach",
        }
    }

    fn into_args(self) -> Value {
        match self {
            StartRequest::Launch(v) | StartRequest::Attach(v) => v,
        }
    }
}

/// §3: a session's coarse lifecycle state. Finer handshake sub-states
/// (awaiting `initialized`, configurationDone sent) are not externally
/// observable — only this and `capabilities()` are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    Running,
    Stopped,
    Terminated,
}

/// A running (or starting, or torn down) debug session. Cheap to clone —
/// every `Arc<SessionRuntime>` shares the same protocol client and state
/// signals.
pub struct SessionRuntime {
    id: String,
    depth: u32,
    adapter: Arc<Adapter>,
    client: Client,
    scheduler: Scheduler,
    state: Signal<SessionState>,
    capabilities: Signal<Capabilities>,
    hooks: Arc<dyn SessionHooks>,
    children: AsyncMutex<Vec<Arc<SessionRuntime>>>,
    parent: Option<Weak<SessionRuntime>>,
    child_depth_counter: AtomicU32,
}

impl SessionRuntime {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn state(&self) -> Signal<SessionState> {
        self.state.clone()
    }

    pub fn capabilities(&self) -> Signal<Capabilities> {
        self.capabilities.clone()
    }

    pub fn parent(&self) -> Option<Arc<SessionRuntime>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    pub async fn children(&self) -> Vec<Arc<SessionRuntime>> {
        self.children.lock().await.clone()
    }

    /// Start a root session: connects the adapter, runs the handshake, and
    /// returns once the adapter has acknowledged `configurationDone` and the
    /// `launch`/`attach` response has arrived.
    pub async fn start(
        adapter: Arc<Adapter>,
        request: StartRequest,
        hooks: Arc<dyn SessionHooks>,
        scheduler: Scheduler,
    ) -> Result<Arc<SessionRuntime>> {
        Self::start_inner(adapter, request, hooks, scheduler, 0, None).await
    }

    async fn start_inner(
        adapter: Arc<Adapter>,
        request: StartRequest,
        hooks: Arc<dyn SessionHooks>,
        scheduler: Scheduler,
        depth: u32,
        parent: Option<Weak<SessionRuntime>>,
    ) -> Result<Arc<SessionRuntime>> {
        if depth > MAX_CHILD_DEPTH {
            return Err(Error::SessionDepthExceeded { max: MAX_CHILD_DEPTH });
        }

        let transport = if depth == 0 {
            adapter.connect().await?
        } else {
            adapter.connect_child().await?
        };
        let client = Client::new(transport, &scheduler);

        let session = Arc::new(SessionRuntime {
            id: Uuid::new_v4().to_string(),
            depth,
            adapter: adapter.clone(),
            client: client.clone(),
            scheduler: scheduler.clone(),
            state: Signal::new(SessionState::Starting),
            capabilities: Signal::new(Capabilities::default()),
            hooks: hooks.clone(),
            children: AsyncMutex::new(Vec::new()),
            parent,
            child_depth_counter: AtomicU32::new(0),
        });

        Self::wire_events(&session).await;
        Self::wire_reverse_requests(&session).await;
        hooks.on_session_created(&session).await;

        let initialized = Arc::new(Notify::new());
        {
            let initialized = initialized.clone();
            client
                .on_event("initialized", move |_ev| initialized.notify_one())
                .await;
        }

        let mut init_args = InitializeRequestArguments::default();
        init_args.adapter_id = adapter.adapter_id();
        let init_value = serde_json::to_value(&init_args)?;
        let init_resp = client
            .request_with_timeout("initialize", Some(init_value), STARTUP_TIMEOUT)
            .await?;
        if let Ok(caps) = serde_json::from_value::<Capabilities>(init_resp) {
            session.capabilities.set(caps);
        }

        // Sent without waiting: most adapters don't answer `launch`/`attach`
        // until after `configurationDone`, so the response is collected
        // later (§4.3: "parallel initialize+launch+configurationDone").
        let launch_seq = client
            .request_nowait(request.command(), Some(request.into_args()))
            .await?;

        tokio::time::timeout(STARTUP_TIMEOUT, initialized.notified())
            .await
            .map_err(|_| Error::Timeout {
                command: "initialized".to_string(),
                elapsed_ms: STARTUP_TIMEOUT.as_millis() as u64,
            })?;

        if !hooks.before_configuration_done(&session).await {
            return Err(Error::InvalidState(
                "configurationDone aborted by session hooks".to_string(),
            ));
        }

        client
            .request_with_timeout("configurationDone", None, STARTUP_TIMEOUT)
            .await?;

        client.await_response(launch_seq, STARTUP_TIMEOUT).await?;

        session.state.set(SessionState::Running);
        info!(session_id = %session.id, depth, "session handshake complete");
        Ok(session)
    }

    /// Test-only constructor: wraps an already-connected `Client` into a
    /// `Running` session, skipping the initialize/launch/configurationDone
    /// handshake `start` runs. Mirrors the teacher's own
    /// `DapClient::new_with_transport` test-injection path
    /// (`dap/client.rs`) at this crate's equivalent seam, so tests can drive
    /// event wiring and outgoing requests against a fake transport without
    /// a real adapter process.
    #[cfg(test)]
    pub(crate) async fn new_for_test(client: Client, scheduler: Scheduler) -> Arc<SessionRuntime> {
        Self::new_for_test_at_depth(client, scheduler, 0).await
    }

    #[cfg(test)]
    pub(crate) async fn new_for_test_at_depth(
        client: Client,
        scheduler: Scheduler,
        depth: u32,
    ) -> Arc<SessionRuntime> {
        let session = Arc::new(SessionRuntime {
            id: Uuid::new_v4().to_string(),
            depth,
            adapter: Arc::new(Adapter::new(crate::adapter::AdapterConfig::stdio(
                "fake-adapter",
                vec![],
            ))),
            client,
            scheduler,
            state: Signal::new(SessionState::Running),
            capabilities: Signal::new(Capabilities::default()),
            hooks: Arc::new(DefaultHooks),
            children: AsyncMutex::new(Vec::new()),
            parent: None,
            child_depth_counter: AtomicU32::new(0),
        });
        Self::wire_events(&session).await;
        Self::wire_reverse_requests(&session).await;
        session
    }

    async fn wire_events(session: &Arc<SessionRuntime>) {
        let client = session.client.clone();

        let weak = Arc::downgrade(session);
        client
            .on_event("stopped", move |_ev| {
                if let Some(s) = weak.upgrade() {
                    s.state.set(SessionState::Stopped);
                }
            })
            .await;

        let weak = Arc::downgrade(session);
        client
            .on_event("continued", move |_ev| {
                if let Some(s) = weak.upgrade() {
                    s.state.set(SessionState::Running);
                }
            })
            .await;

        let weak = Arc::downgrade(session);
        client
            .on_event("terminated", move |_ev| {
                if let Some(s) = weak.upgrade() {
                    s.state.set(SessionState::Terminated);
                }
            })
            .await;

        let weak = Arc::downgrade(session);
        client
            .on_event("capabilities", move |ev| {
                let Some(s) = weak.upgrade() else { return };
                let Some(body) = ev.body else { return };
                let Some(update) = body.get("capabilities").cloned() else { return };
                match serde_json::from_value::<Capabilities>(update) {
                    Ok(update) => {
                        let mut caps = s.capabilities.get();
                        caps.merge(&update);
                        s.capabilities.set(caps);
                    }
                    Err(e) => warn!(error = %e, "malformed capabilities event body"),
                }
            })
            .await;
    }

    async fn wire_reverse_requests(session: &Arc<SessionRuntime>) {
        let client = session.client.clone();

        let hooks = session.hooks.clone();
        client
            .on_request("runInTerminal", move |args| {
                let hooks = hooks.clone();
                Box::pin(async move { hooks.run_in_terminal(args.unwrap_or(Value::Null)).await })
            })
            .await;

        let weak = Arc::downgrade(session);
        client
            .on_request("startDebugging", move |args| {
                let weak = weak.clone();
                Box::pin(async move {
                    let session = weak
                        .upgrade()
                        .ok_or_else(|| Error::InvalidState("session already dropped".to_string()))?;
                    let args = args.ok_or_else(|| {
                        Error::Protocol("startDebugging: missing arguments".to_string())
                    })?;
                    let parsed: StartDebuggingRequestArguments = serde_json::from_value(args)?;
                    session.spawn_child(parsed).await?;
                    Ok(Value::Null)
                })
            })
            .await;
    }

    async fn spawn_child(
        self: &Arc<Self>,
        args: StartDebuggingRequestArguments,
    ) -> Result<Arc<SessionRuntime>> {
        if self.depth + 1 > MAX_CHILD_DEPTH {
            return Err(Error::SessionDepthExceeded { max: MAX_CHILD_DEPTH });
        }
        self.child_depth_counter.fetch_add(1, Ordering::SeqCst);

        let request = match args.request.as_str() {
            "attach" => StartRequest::Attach(args.configuration),
            _ => StartRequest::Launch(args.configuration),
        };

        let child = Self::start_inner(
            self.adapter.clone(),
            request,
            self.hooks.clone(),
            self.scheduler.clone(),
            self.depth + 1,
            Some(Arc::downgrade(self)),
        )
        .await?;

        self.children.lock().await.push(child.clone());
        Ok(child)
    }

    /// Tear the session down, children first (§4.3). `terminate` picks
    /// `terminate` over `disconnect` when the adapter supports it; either
    /// way the session is marked `Terminated` once the request resolves (or
    /// immediately, if the transport is already gone).
    pub async fn shutdown(self: &Arc<Self>, terminate: bool) -> Result<()> {
        let children: Vec<Arc<SessionRuntime>> = self.children.lock().await.drain(..).collect();
        for child in children {
            if let Err(e) = Box::pin(child.shutdown(terminate)).await {
                warn!(child_id = %child.id, error = %e, "child session shutdown failed");
            }
        }

        if self.state.get() == SessionState::Terminated {
            return Ok(());
        }

        let caps = self.capabilities.get();
        let result = if terminate && caps.supports_terminate_request {
            self.client
                .request(
                    "terminate",
                    Some(serde_json::to_value(TerminateArguments::default())?),
                )
                .await
        } else {
            self.client
                .request(
                    "disconnect",
                    Some(serde_json::to_value(DisconnectArguments {
                        terminate_debuggee: Some(terminate),
                        ..Default::default()
                    })?),
                )
                .await
        };

        self.state.set(SessionState::Terminated);
        self.client.close().await?;
        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_request_picks_the_right_command_name() {
        assert_eq!(StartRequest::Launch(Value::Null).command(), "launch");
        assert_eq!(StartRequest::Attach(Value::Null).command(), "attach");
    }

    #[test]
    fn session_state_terminated_is_not_equal_to_running() {
        assert_ne!(SessionState::Terminated, SessionState::Running);
    }

    #[tokio::test]
    async fn spawn_child_past_the_depth_cap_is_rejected_without_touching_the_adapter() {
        let (transport, _adapter) = crate::test_util::fake_pair();
        let scheduler = Scheduler::new();
        let client = Client::new(transport, &scheduler);
        let session = SessionRuntime::new_for_test_at_depth(client, scheduler, MAX_CHILD_DEPTH).await;

        let err = session
            .spawn_child(StartDebuggingRequestArguments {
                request: "launch".to_string(),
                configuration: Value::Null,
            })
            .await
            .expect_err("spawning a child past MAX_CHILD_DEPTH must fail");

        assert!(matches!(
            err,
            Error::SessionDepthExceeded { max } if max == MAX_CHILD_DEPTH
        ));
        assert!(session.children.lock().await.is_empty());
    }
}
