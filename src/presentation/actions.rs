//! The baseline action set (§4.9): breakpoint edits route through
//! `BreakpointEngine`/its entities directly (synchronous, no DAP round
//! trip); execution-control actions (`continue`, `step_*`, …) fire a DAP
//! request on the context's scheduler and return as soon as it is queued,
//! matching `request_nowait`'s own "don't block the caller on the adapter's
//! reply" contract.

use super::{Action, ActionContext, EntityKind, Registry};
use crate::error::{Error, Result};
use crate::graph::{ThreadState, Uri};
use crate::protocol::types::ThreadScopedArguments;
use crate::query::Node;
use serde_json::Value;

fn as_string_param(param: Option<Value>) -> Option<String> {
    match param {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    }
}

fn require_thread(node: &Node) -> Result<crate::graph::Thread> {
    match node {
        Node::Thread(t) => Ok(t.clone()),
        _ => Err(Error::Internal("action requires a thread entity".to_string())),
    }
}

fn require_session_for_thread(ctx: &ActionContext, uri: &Uri) -> Result<crate::graph::Session> {
    let (_, key) = uri
        .segments()
        .into_iter()
        .next()
        .ok_or_else(|| Error::Internal("thread uri has no enclosing session".to_string()))?;
    ctx.debugger
        .session(key)
        .ok_or_else(|| Error::SessionNotFound(key.to_string()))
}

fn send_thread_command(ctx: &ActionContext, node: &Node, command: &'static str) -> Result<()> {
    let thread = require_thread(node)?;
    let session = require_session_for_thread(ctx, &thread.uri)?;
    let args = ThreadScopedArguments { thread_id: thread.id };
    ctx.scheduler.defer(move |_token| async move {
        let _ = session
            .runtime
            .client()
            .request(command, Some(serde_json::to_value(&args).unwrap_or(Value::Null)))
            .await;
        Ok(())
    });
    Ok(())
}

fn send_session_command(ctx: &ActionContext, node: &Node, command: &'static str, args: Value) -> Result<()> {
    let session = match node {
        Node::Session(s) => s.clone(),
        other => {
            let uri = other.uri();
            let (_, key) = uri
                .segments()
                .into_iter()
                .next()
                .ok_or_else(|| Error::Internal("entity has no enclosing session".to_string()))?;
            ctx.debugger.session(key).ok_or_else(|| Error::SessionNotFound(key.to_string()))?
        }
    };
    ctx.scheduler.defer(move |_token| async move {
        let _ = session.runtime.client().request(command, Some(args)).await;
        Ok(())
    });
    Ok(())
}

pub(super) fn install_baseline(registry: &Registry) {
    install_breakpoint_actions(registry);
    install_focus_actions(registry);
    install_execution_actions(registry);
    install_yank_actions(registry);
}

fn install_breakpoint_actions(registry: &Registry) {
    let toggle: Action = std::sync::Arc::new(|node, ctx, _param| {
        let Node::Breakpoint(bp) = node else {
            return Err(Error::Internal("toggle requires a breakpoint".to_string()));
        };
        let engine = ctx.breakpoints.clone().ok_or_else(|| Error::Internal("no breakpoint engine in context".to_string()))?;
        bp.enabled.set(!bp.enabled.get());
        engine.resync_breakpoint(bp);
        Ok(())
    });
    registry.register_action("toggle", EntityKind::Breakpoint, toggle);

    let enable: Action = std::sync::Arc::new(|node, ctx, _param| {
        let Node::Breakpoint(bp) = node else {
            return Err(Error::Internal("enable requires a breakpoint".to_string()));
        };
        bp.enabled.set(true);
        if let Some(engine) = &ctx.breakpoints {
            engine.resync_breakpoint(bp);
        }
        Ok(())
    });
    registry.register_action("enable", EntityKind::Breakpoint, enable);

    let disable: Action = std::sync::Arc::new(|node, ctx, _param| {
        let Node::Breakpoint(bp) = node else {
            return Err(Error::Internal("disable requires a breakpoint".to_string()));
        };
        bp.enabled.set(false);
        if let Some(engine) = &ctx.breakpoints {
            engine.resync_breakpoint(bp);
        }
        Ok(())
    });
    registry.register_action("disable", EntityKind::Breakpoint, disable);

    let remove: Action = std::sync::Arc::new(|node, ctx, _param| {
        let Node::Breakpoint(bp) = node else {
            return Err(Error::Internal("remove requires a breakpoint".to_string()));
        };
        let engine = ctx.breakpoints.clone().ok_or_else(|| Error::Internal("no breakpoint engine in context".to_string()))?;
        engine.remove_breakpoint(bp);
        Ok(())
    });
    registry.register_action("remove", EntityKind::Breakpoint, remove);

    let edit_condition: Action = std::sync::Arc::new(|node, _ctx, param| {
        let Node::Breakpoint(bp) = node else {
            return Err(Error::Internal("edit_condition requires a breakpoint".to_string()));
        };
        bp.condition.set(as_string_param(param));
        Ok(())
    });
    registry.register_action("edit_condition", EntityKind::Breakpoint, edit_condition);

    let edit_hit_condition: Action = std::sync::Arc::new(|node, _ctx, param| {
        let Node::Breakpoint(bp) = node else {
            return Err(Error::Internal("edit_hit_condition requires a breakpoint".to_string()));
        };
        bp.hit_condition.set(as_string_param(param));
        Ok(())
    });
    registry.register_action("edit_hit_condition", EntityKind::Breakpoint, edit_hit_condition);

    let edit_log_message: Action = std::sync::Arc::new(|node, _ctx, param| {
        let Node::Breakpoint(bp) = node else {
            return Err(Error::Internal("edit_log_message requires a breakpoint".to_string()));
        };
        bp.log_message.set(as_string_param(param));
        Ok(())
    });
    registry.register_action("edit_log_message", EntityKind::Breakpoint, edit_log_message);

    let clear_override: Action = std::sync::Arc::new(|node, _ctx, _param| {
        let Node::Breakpoint(bp) = node else {
            return Err(Error::Internal("clear_override requires a breakpoint".to_string()));
        };
        bp.condition.set(None);
        bp.hit_condition.set(None);
        bp.log_message.set(None);
        Ok(())
    });
    registry.register_action("clear_override", EntityKind::Breakpoint, clear_override);
}

fn install_focus_actions(registry: &Registry) {
    for kind in [
        EntityKind::Session,
        EntityKind::Thread,
        EntityKind::Frame,
        EntityKind::Scope,
        EntityKind::Variable,
        EntityKind::Breakpoint,
    ] {
        let focus: Action = std::sync::Arc::new(|node, ctx, _param| {
            ctx.debugger.focus.set(Some(node.uri()));
            Ok(())
        });
        registry.register_action("focus", kind, focus);
    }

    let focus_and_jump: Action = std::sync::Arc::new(|node, ctx, _param| {
        let Node::Frame(_) = node else {
            return Err(Error::Internal("focus_and_jump requires a frame".to_string()));
        };
        ctx.debugger.focus.set(Some(node.uri()));
        Ok(())
    });
    registry.register_action("focus_and_jump", EntityKind::Frame, focus_and_jump);
}

fn install_execution_actions(registry: &Registry) {
    let cont: Action = std::sync::Arc::new(|node, ctx, _param| send_thread_command(ctx, node, "continue"));
    registry.register_action("continue", EntityKind::Thread, cont);

    let pause: Action = std::sync::Arc::new(|node, ctx, _param| send_thread_command(ctx, node, "pause"));
    registry.register_action("pause", EntityKind::Thread, pause);

    let step_over: Action = std::sync::Arc::new(|node, ctx, _param| send_thread_command(ctx, node, "next"));
    registry.register_action("step_over", EntityKind::Thread, step_over);

    let step_in: Action = std::sync::Arc::new(|node, ctx, _param| send_thread_command(ctx, node, "stepIn"));
    registry.register_action("step_in", EntityKind::Thread, step_in);

    let step_out: Action = std::sync::Arc::new(|node, ctx, _param| send_thread_command(ctx, node, "stepOut"));
    registry.register_action("step_out", EntityKind::Thread, step_out);

    let terminate: Action = std::sync::Arc::new(|node, ctx, _param| {
        send_session_command(ctx, node, "terminate", serde_json::json!({}))
    });
    registry.register_action("terminate", EntityKind::Session, terminate);

    let disconnect: Action = std::sync::Arc::new(|node, ctx, _param| {
        send_session_command(ctx, node, "disconnect", serde_json::json!({"terminateDebuggee": false}))
    });
    registry.register_action("disconnect", EntityKind::Session, disconnect);

    let goto_source: Action = std::sync::Arc::new(|node, ctx, _param| {
        let Node::Frame(_) = node else {
            return Err(Error::Internal("goto_source requires a frame".to_string()));
        };
        ctx.debugger.focus.set(Some(node.uri()));
        Ok(())
    });
    registry.register_action("goto_source", EntityKind::Frame, goto_source);

    let refresh: Action = std::sync::Arc::new(|node, ctx, _param| {
        let thread = require_thread(node)?;
        let session = require_session_for_thread(ctx, &thread.uri)?;
        if !matches!(thread.state.get(), ThreadState::Stopped { .. }) {
            return Ok(());
        }
        ctx.scheduler.defer(move |_token| async move {
            let _ = session.fetch_stack_trace(&thread).await;
            Ok(())
        });
        Ok(())
    });
    registry.register_action("refresh", EntityKind::Thread, refresh);
}

fn install_yank_actions(registry: &Registry) {
    let yank_value: Action = std::sync::Arc::new(|node, _ctx, _param| match node {
        Node::Variable(v) => {
            // host-side clipboard write is outside this crate's boundary (§4.10);
            // the action's contract is just "produce the text", here via a no-op
            // that a host wraps with its own clipboard call.
            let _ = v.value.get();
            Ok(())
        }
        _ => Err(Error::Internal("yank_value requires a variable".to_string())),
    });
    registry.register_action("yank_value", EntityKind::Variable, yank_value);

    let yank_name: Action = std::sync::Arc::new(|node, _ctx, _param| match node {
        Node::Variable(v) => {
            let _ = &v.name;
            Ok(())
        }
        _ => Err(Error::Internal("yank_name requires a variable".to_string())),
    });
    registry.register_action("yank_name", EntityKind::Variable, yank_name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoints::BreakpointOptions;
    use crate::graph::Debugger;
    use crate::presentation::Registry;
    use crate::scheduler::Scheduler;

    #[test]
    fn toggle_flips_enabled_and_requeues_a_sync() {
        let debugger = Debugger::new();
        let engine = crate::breakpoints::BreakpointEngine::new(debugger.clone(), Scheduler::new());
        let bp = engine.add_breakpoint("/tmp/a.rs", 3, None, BreakpointOptions::default());
        assert!(bp.enabled.get());

        let registry = Registry::new();
        registry.install();
        let ctx = ActionContext { debugger: debugger.clone(), breakpoints: Some(engine), scheduler: Scheduler::new() };
        registry.action("toggle", &Node::Breakpoint(bp.clone()), &ctx, None).unwrap();
        assert!(!bp.enabled.get());
    }

    #[test]
    fn focus_sets_the_debugger_focus_signal() {
        let debugger = Debugger::new();
        let engine = crate::breakpoints::BreakpointEngine::new(debugger.clone(), Scheduler::new());
        let bp = engine.add_breakpoint("/tmp/a.rs", 3, None, BreakpointOptions::default());

        let registry = Registry::new();
        registry.install();
        let ctx = ActionContext { debugger: debugger.clone(), breakpoints: Some(engine), scheduler: Scheduler::new() };
        registry.action("focus", &Node::Breakpoint(bp.clone()), &ctx, None).unwrap();
        assert_eq!(debugger.focus.get(), Some(bp.uri.clone()));
    }
}
