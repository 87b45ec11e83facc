//! A type-erased view over graph entities (§4.7 needs to walk them
//! generically; the graph itself stays strongly typed). `Node::edge` is the
//! traversal primitive; `Node::property` backs `(prop=val)` filters.

use crate::graph::{
    Breakpoint, BreakpointBinding, Debugger, ExceptionFilter, ExceptionFilterBinding, Frame, Output,
    Scope, Session, SourceBinding, Uri, Variable,
};
use std::sync::Arc;

#[derive(Clone)]
pub enum Node {
    Debugger(Arc<Debugger>),
    Session(Session),
    Thread(crate::graph::Thread),
    Stack(crate::graph::Stack),
    Frame(Frame),
    Scope(Scope),
    Variable(Variable),
    Source(SourceBinding),
    Breakpoint(Breakpoint),
    BreakpointBinding(BreakpointBinding),
    ExceptionFilter(ExceptionFilter),
    ExceptionFilterBinding(ExceptionFilterBinding),
    Output(Output),
}

/// Matches variant-by-variant so a `Frame`/`Stack`/`Output` (which already
/// carry their own content-aware `PartialEq`) compare deeply, while handle
/// types with no natural content equality (`Session`, `Thread`, ...) compare
/// by `uri()` — cheap and enough for `watch`'s dedup, since two nodes at the
/// same uri are the same entity. The match is on variant first so a
/// `Debugger` and a `Frame` are never equal even if a `uri()`-only comparison
/// would otherwise have collided.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Debugger(a), Node::Debugger(b)) => Arc::ptr_eq(a, b),
            (Node::Session(a), Node::Session(b)) => a.uri == b.uri,
            (Node::Thread(a), Node::Thread(b)) => a.uri == b.uri,
            (Node::Stack(a), Node::Stack(b)) => a == b,
            (Node::Frame(a), Node::Frame(b)) => a == b,
            (Node::Scope(a), Node::Scope(b)) => a.uri == b.uri,
            (Node::Variable(a), Node::Variable(b)) => a.uri == b.uri,
            (Node::Source(a), Node::Source(b)) => a.uri == b.uri,
            (Node::Breakpoint(a), Node::Breakpoint(b)) => a.uri == b.uri,
            (Node::BreakpointBinding(a), Node::BreakpointBinding(b)) => a.uri == b.uri,
            (Node::ExceptionFilter(a), Node::ExceptionFilter(b)) => a.id == b.id,
            (Node::ExceptionFilterBinding(a), Node::ExceptionFilterBinding(b)) => {
                a.filter_id == b.filter_id && a.session_id == b.session_id
            }
            (Node::Output(a), Node::Output(b)) => a == b,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Node {
    pub fn uri(&self) -> Uri {
        match self {
            Node::Debugger(_) => Uri::root(),
            Node::Session(s) => s.uri.clone(),
            Node::Thread(t) => t.uri.clone(),
            Node::Stack(s) => s.uri.clone(),
            Node::Frame(f) => f.uri.clone(),
            Node::Scope(s) => s.uri.clone(),
            Node::Variable(v) => v.uri.clone(),
            Node::Source(s) => s.uri.clone(),
            Node::Breakpoint(b) => b.uri.clone(),
            Node::BreakpointBinding(b) => b.uri.clone(),
            Node::ExceptionFilter(f) => Uri::root().child("exception_filter", &f.id),
            Node::ExceptionFilterBinding(b) => {
                Uri::root().child("exception_filter_binding", &format!("{}:{}", b.filter_id, b.session_id))
            }
            Node::Output(o) => Uri::root().child("output", &o.seq.to_string()),
        }
    }

    /// Follow a named edge, returning every child currently reachable.
    pub fn edge(&self, name: &str) -> Vec<Node> {
        match (self, name) {
            (Node::Debugger(d), "sessions") => d.sessions.iter().map(Node::Session).collect(),
            (Node::Debugger(d), "breakpoints") => d.breakpoints.iter().map(Node::Breakpoint).collect(),
            (Node::Debugger(d), "breakpoint_bindings") => {
                d.breakpoint_bindings.iter().map(Node::BreakpointBinding).collect()
            }
            (Node::Debugger(d), "exception_filters") => {
                d.exception_filters.iter().map(Node::ExceptionFilter).collect()
            }
            (Node::Session(s), "threads") => s.threads.iter().map(Node::Thread).collect(),
            (Node::Session(s), "sources") => s.sources.iter().map(Node::Source).collect(),
            (Node::Session(s), "outputs") => s.outputs.iter().map(Node::Output).collect(),
            (Node::Session(s), "exception_filter_bindings") => {
                s.exception_filter_bindings.iter().map(Node::ExceptionFilterBinding).collect()
            }
            (Node::Thread(t), "stack") => t.stack.get().map(Node::Stack).into_iter().collect(),
            (Node::Stack(s), "frames") => s.frames.iter().cloned().map(Node::Frame).collect(),
            (Node::Frame(f), "scopes") => f.scopes.iter().map(Node::Scope).collect(),
            (Node::Frame(f), "source") => f.source.clone().map(Node::Source).into_iter().collect(),
            (Node::Scope(s), "variables") => s.variables.iter().map(Node::Variable).collect(),
            (Node::Variable(v), "children") => v.children.iter().map(Node::Variable).collect(),
            _ => Vec::new(),
        }
    }

    /// Look up a reactive property by name, for `(prop=val)` filters.
    pub fn property(&self, name: &str) -> Option<PropValue> {
        match (self, name) {
            (Node::Session(s), "state") => {
                Some(PropValue::Str(format!("{:?}", s.state().get()).to_lowercase()))
            }
            (Node::Thread(t), "id") => Some(PropValue::Int(t.id)),
            (Node::Thread(t), "name") => Some(PropValue::Str(t.name.get())),
            (Node::Frame(f), "line") => Some(PropValue::Int(f.line)),
            (Node::Frame(f), "name") => Some(PropValue::Str(f.name.clone())),
            (Node::Variable(v), "name") => Some(PropValue::Str(v.name.clone())),
            (Node::Variable(v), "value") => Some(PropValue::Str(v.value.get())),
            (Node::Breakpoint(b), "line") => Some(PropValue::Int(b.line)),
            (Node::Breakpoint(b), "enabled") => Some(PropValue::Bool(b.enabled.get())),
            (Node::Breakpoint(b), "source_path") => Some(PropValue::Str(b.source_path.clone())),
            (Node::BreakpointBinding(b), "verified") => Some(PropValue::Bool(b.verified.get())),
            (Node::BreakpointBinding(b), "hit") => Some(PropValue::Bool(b.hit.get())),
            (Node::Output(o), "category") => Some(PropValue::Str(o.category.clone())),
            _ => None,
        }
    }
}
