//! URL Query Engine (C7, §4.7): a small addressing language over the entity
//! graph, with `query`/`queryAll` for one-shot lookups and `watch` for a
//! reactive signal that re-evaluates on graph changes.

mod ast;
mod engine;
mod node;

pub use engine::{query, query_all, resolve_uri};
pub use node::{Node, PropValue};

use crate::graph::Debugger;
use crate::reactive::{derive, Signal};
use std::sync::Arc;

/// Re-evaluate `url` on every session/breakpoint add-or-remove and every
/// focus change, emitting a new `Vec<Node>` each time the match set differs.
///
/// This is deliberately coarse-grained: it does not subscribe to every
/// `Signal` touched along a query's own traversal (a thread's `state`
/// changing, say, without any session or breakpoint being added or removed,
/// does not re-trigger). Query results rooted at `Debugger.sessions` or
/// `.breakpoints`, or at `@context` references following `focus`, stay
/// fresh; a watch of something nested arbitrarily deep that only changes via
/// an intra-entity signal mutation will not.
pub fn watch(debugger: &Arc<Debugger>, url: &str) -> Signal<Option<Vec<Node>>> {
    let debugger_for_compute = debugger.clone();
    let url = url.to_string();
    let compute = move || Some(query_all(&debugger_for_compute, &url));

    let debugger_for_subscribe = debugger.clone();
    derive(compute, move |trigger| {
        let t1 = trigger.clone();
        let unsub_sessions = debugger_for_subscribe.sessions.each(move |_session| {
            t1();
            None::<fn()>
        });

        let t2 = trigger.clone();
        let unsub_breakpoints = debugger_for_subscribe.breakpoints.each(move |_bp| {
            t2();
            None::<fn()>
        });

        let unsub_focus = debugger_for_subscribe.focus.use_(move |_focus| {
            trigger();
            None::<fn()>
        });

        move || {
            unsub_sessions();
            unsub_breakpoints();
            unsub_focus();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_reflects_an_absolute_session_query_with_no_sessions() {
        let debugger = Debugger::new();
        let signal = watch(&debugger, "/sessions");
        assert_eq!(signal.get().map(|v| v.len()), Some(0));
    }

    #[test]
    fn watch_picks_up_a_breakpoint_added_after_subscription() {
        let debugger = Debugger::new();
        let signal = watch(&debugger, "/breakpoints");
        assert_eq!(signal.get().map(|v| v.len()), Some(0));

        let engine = crate::breakpoints::BreakpointEngine::new(debugger.clone(), crate::scheduler::Scheduler::new());
        engine.add_breakpoint("/tmp/foo.rs", 10, None, Default::default());

        assert_eq!(signal.get().map(|v| v.len()), Some(1));
    }
}
