//! Entity types (§4.6, §3). Every entity is a cheap-to-clone handle over
//! `Signal`/`Edge` fields — the same shape `protocol::Client` and
//! `scheduler::Scheduler` already use — so cloning an entity out of an
//! `Edge` snapshot shares the live state rather than copying a point-in-time
//! value.

use crate::graph::uri::Uri;
use crate::protocol::types::Capabilities;
use crate::reactive::{Edge, Keyed, Signal};
use crate::session_runtime::{SessionRuntime, SessionState};
use std::sync::Arc;

/// `session:stopped` state detail; distinct from `SessionRuntime`'s own
/// coarse `SessionState` — this tracks the thread, which is what a
/// `stopped`/`continued` event actually names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Stopped {
        reason: String,
        description: Option<String>,
        hit_breakpoint_ids: Vec<i64>,
    },
    Exited,
}

#[derive(Clone)]
pub struct Thread {
    pub id: i64,
    pub uri: Uri,
    pub name: Signal<String>,
    pub state: Signal<ThreadState>,
    pub stack: Signal<Option<Stack>>,
}

impl Keyed for Thread {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl Thread {
    pub fn new(session_uri: &Uri, id: i64, name: String) -> Self {
        let uri = session_uri.child("thread", &id.to_string());
        Thread {
            id,
            uri,
            name: Signal::new(name),
            state: Signal::new(ThreadState::Running),
            stack: Signal::new(None),
        }
    }
}

/// A single stack-trace snapshot (§4.6: "a single new Stack (seq
/// incremented)"). Immutable once built — a new `stopped` produces a whole
/// new `Stack`, it never mutates an old one in place.
#[derive(Clone, PartialEq)]
pub struct Stack {
    pub seq: u64,
    pub uri: Uri,
    pub frames: Vec<Frame>,
}

impl Keyed for Stack {
    fn key(&self) -> String {
        self.seq.to_string()
    }
}

#[derive(Clone)]
pub struct Frame {
    pub id: i64,
    pub uri: Uri,
    pub name: String,
    pub source: Option<SourceBinding>,
    pub line: i64,
    pub column: i64,
    pub scopes: Edge<Scope>,
}

impl Keyed for Frame {
    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl PartialEq for Frame {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.line == other.line && self.column == other.column
    }
}

#[derive(Clone)]
pub struct Scope {
    pub name: String,
    pub uri: Uri,
    pub variables_reference: i64,
    pub expensive: bool,
    pub variables: Edge<Variable>,
}

impl Keyed for Scope {
    fn key(&self) -> String {
        self.name.clone()
    }
}

#[derive(Clone)]
pub struct Variable {
    pub name: String,
    pub uri: Uri,
    pub value: Signal<String>,
    pub type_name: Option<String>,
    pub variables_reference: i64,
    pub children: Edge<Variable>,
}

impl Keyed for Variable {
    fn key(&self) -> String {
        self.name.clone()
    }
}

/// A source file or virtual (`sourceReference`-addressed) buffer. Merged by
/// path or reference (§4.6), so the identifier is whichever of the two DAP
/// gave first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
    Path(String),
    Reference(i64),
}

impl SourceId {
    pub fn from_dap(source: &crate::protocol::types::Source) -> Option<Self> {
        if let Some(path) = &source.path {
            Some(SourceId::Path(path.clone()))
        } else {
            source.source_reference.map(SourceId::Reference)
        }
    }

    fn as_key(&self) -> String {
        match self {
            SourceId::Path(p) => p.clone(),
            SourceId::Reference(r) => format!("ref:{r}"),
        }
    }
}

#[derive(Clone)]
pub struct Source {
    pub id: SourceId,
    pub name: Signal<Option<String>>,
    pub path: Signal<Option<String>>,
    pub source_reference: Signal<Option<i64>>,
}

impl Source {
    pub fn from_dap(source: &crate::protocol::types::Source) -> Option<Self> {
        let id = SourceId::from_dap(source)?;
        Some(Source {
            id,
            name: Signal::new(source.name.clone()),
            path: Signal::new(source.path.clone()),
            source_reference: Signal::new(source.source_reference),
        })
    }
}

/// A source as it relates to one session (§4.6 ownership: "Sessions own ...
/// Sources via SourceBinding").
#[derive(Clone)]
pub struct SourceBinding {
    pub uri: Uri,
    pub source: Source,
}

impl Keyed for SourceBinding {
    fn key(&self) -> String {
        self.source.id.as_key()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub seq: i64,
    pub category: String,
    pub text: String,
    pub source_line: Option<i64>,
}

impl Keyed for Output {
    fn key(&self) -> String {
        self.seq.to_string()
    }
}

/// User intent (§4.8): survives session restarts, adapters, and binding
/// failures. Owned by the `Debugger`, not by any session.
#[derive(Clone)]
pub struct Breakpoint {
    pub id: String,
    pub uri: Uri,
    pub source_path: String,
    pub line: i64,
    pub column: Option<i64>,
    pub condition: Signal<Option<String>>,
    pub hit_condition: Signal<Option<String>>,
    pub log_message: Signal<Option<String>>,
    pub enabled: Signal<bool>,
}

impl Keyed for Breakpoint {
    fn key(&self) -> String {
        self.id.clone()
    }
}

impl Breakpoint {
    pub fn effective_enabled(&self) -> bool {
        self.enabled.get()
    }
}

/// The adapter's view of a `Breakpoint` within one session (§4.8). Co-owned
/// by `(Session, Breakpoint)`; dies when either does.
#[derive(Clone)]
pub struct BreakpointBinding {
    pub breakpoint_id: String,
    pub session_id: String,
    pub uri: Uri,
    pub adapter_id: Signal<Option<i64>>,
    pub verified: Signal<bool>,
    pub actual_line: Signal<Option<i64>>,
    pub actual_column: Signal<Option<i64>>,
    pub message: Signal<Option<String>>,
    pub hit: Signal<bool>,
}

impl Keyed for BreakpointBinding {
    fn key(&self) -> String {
        format!("{}:{}", self.breakpoint_id, self.session_id)
    }
}

#[derive(Clone)]
pub struct ExceptionFilter {
    pub id: String,
    pub label: String,
    pub enabled: Signal<bool>,
}

impl Keyed for ExceptionFilter {
    fn key(&self) -> String {
        self.id.clone()
    }
}

#[derive(Clone)]
pub struct ExceptionFilterBinding {
    pub filter_id: String,
    pub session_id: String,
}

impl Keyed for ExceptionFilterBinding {
    fn key(&self) -> String {
        format!("{}:{}", self.filter_id, self.session_id)
    }
}

/// The graph-level wrapper around a `SessionRuntime`: adds the entity edges
/// §4.6 says a session owns. `Session::state`/`capabilities` are plain
/// pass-throughs to the runtime's own signals, kept here so query/watch
/// traversal never needs to reach into `session_runtime` directly.
#[derive(Clone)]
pub struct Session {
    pub uri: Uri,
    pub runtime: Arc<SessionRuntime>,
    pub threads: Edge<Thread>,
    pub sources: Edge<SourceBinding>,
    pub outputs: Edge<Output>,
    pub exception_filter_bindings: Edge<ExceptionFilterBinding>,
}

impl Keyed for Session {
    fn key(&self) -> String {
        self.runtime.id().to_string()
    }
}

impl Session {
    pub fn new(runtime: Arc<SessionRuntime>) -> Self {
        let uri = Uri::root().child("session", runtime.id());
        Session {
            uri,
            runtime,
            threads: Edge::new(),
            sources: Edge::new(),
            outputs: Edge::new(),
            exception_filter_bindings: Edge::new(),
        }
    }

    pub fn state(&self) -> Signal<SessionState> {
        self.runtime.state()
    }

    pub fn capabilities(&self) -> Signal<Capabilities> {
        self.runtime.capabilities()
    }
}
