//! Entity Graph (C6, §4.6): the sole mutable model. `Debugger` is the root;
//! every other entity is reachable from it by URI.
//!
//! Grounded on the teacher's `debug/manager.rs::SessionManager` for the
//! "one owner of all sessions" shape, generalized from a flat `HashMap<id,
//! Session>` into the URI-addressed, edge-connected graph §4.6 names —
//! entities here hold `Signal`/`Edge` fields instead of the teacher's plain
//! struct fields so query/watch (C7) has something to subscribe to.

mod entities;
mod fetch;
mod mutate;
mod uri;

pub use entities::{
    Breakpoint, BreakpointBinding, ExceptionFilter, ExceptionFilterBinding, Frame, Output, Scope,
    Session, Source, SourceBinding, SourceId, Stack, Thread, ThreadState, Variable,
};
pub use uri::Uri;

use crate::reactive::{Edge, Signal};
use crate::session_runtime::SessionRuntime;
use std::sync::{Arc, Weak};

/// The process-wide root (§5: "the Debugger's entity graph is process-wide
/// state; only the main thread mutates it"). A host typically holds one
/// `Arc<Debugger>` for the process lifetime.
pub struct Debugger {
    pub sessions: Edge<Session>,
    pub breakpoints: Edge<Breakpoint>,
    pub breakpoint_bindings: Edge<BreakpointBinding>,
    pub exception_filters: Edge<ExceptionFilter>,
    /// §4.7: "a mutable cell on the Debugger holds a reference to the
    /// currently-focused entity", represented as the entity's URI.
    pub focus: Signal<Option<Uri>>,
}

impl Default for Debugger {
    fn default() -> Self {
        Self::new()
    }
}

impl Debugger {
    pub fn new() -> Arc<Self> {
        Arc::new(Debugger {
            sessions: Edge::new(),
            breakpoints: Edge::new(),
            breakpoint_bindings: Edge::new(),
            exception_filters: Edge::new(),
            focus: Signal::new(None),
        })
    }

    /// Wrap an already-started `SessionRuntime` into a graph `Session`,
    /// wire its DAP-event mutation (§4.6 item 1), and register it for
    /// cascade-destruction on `terminated`/`exited`.
    pub async fn add_session(self: &Arc<Self>, runtime: Arc<SessionRuntime>) -> Session {
        let session = Session::new(runtime);
        mutate::wire_session(session.clone()).await;

        let debugger: Weak<Debugger> = Arc::downgrade(self);
        let key = session.runtime.id().to_string();
        let client = session.runtime.client().clone();
        {
            let key = key.clone();
            client
                .on_event("terminated", move |_ev| {
                    if let Some(d) = debugger.upgrade() {
                        d.sessions.remove(&key);
                    }
                })
                .await;
        }
        let debugger: Weak<Debugger> = Arc::downgrade(self);
        client
            .on_event("exited", move |_ev| {
                if let Some(d) = debugger.upgrade() {
                    d.sessions.remove(&key);
                }
            })
            .await;

        self.sessions.push(session.clone());
        session
    }

    pub fn session(&self, id: &str) -> Option<Session> {
        self.sessions.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_debugger_has_no_sessions_and_no_focus() {
        let debugger = Debugger::new();
        assert!(debugger.sessions.is_empty());
        assert_eq!(debugger.focus.get(), None);
    }
}
