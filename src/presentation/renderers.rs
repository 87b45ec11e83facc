//! The baseline renderer set (§4.9): icons per state, titles, ids, counts,
//! conditions, locations, and tokenised output pretty-printing. Every
//! renderer here is a pure `&Node -> Option<Rendered>` function, consistent
//! with "purely-functional" in §4.9 — none read anything but the node
//! itself.

use super::{EntityKind, Registry, Rendered, Segment};
use crate::graph::ThreadState;
use crate::query::Node;
use std::sync::Arc;

fn one(text: impl Into<String>) -> Option<Rendered> {
    Some(Rendered::One(Segment::plain(text)))
}

fn styled(text: impl Into<String>, hl: &'static str) -> Option<Rendered> {
    Some(Rendered::One(Segment::styled(text, hl)))
}

pub(super) fn install_baseline(registry: &Registry) {
    install_icons(registry);
    install_titles(registry);
    install_ids(registry);
    install_counts(registry);
    install_conditions(registry);
    install_locations(registry);
    install_output(registry);
}

fn install_icons(registry: &Registry) {
    let session_icon: super::Renderer = Arc::new(|node| {
        let Node::Session(s) = node else { return None };
        match s.state().get() {
            crate::session_runtime::SessionState::Starting => styled("\u{25cb}", "Comment"),
            crate::session_runtime::SessionState::Running => styled("\u{25b6}", "DiagnosticOk"),
            crate::session_runtime::SessionState::Stopped => styled("\u{23f8}", "DiagnosticWarn"),
            crate::session_runtime::SessionState::Terminated => styled("\u{25a0}", "Comment"),
        }
    });
    registry.register_renderer("icon", EntityKind::Session, session_icon);

    let thread_icon: super::Renderer = Arc::new(|node| {
        let Node::Thread(t) = node else { return None };
        match t.state.get() {
            ThreadState::Running => styled("\u{25b6}", "DiagnosticOk"),
            ThreadState::Stopped { .. } => styled("\u{23f8}", "DiagnosticWarn"),
            ThreadState::Exited => styled("\u{25a0}", "Comment"),
        }
    });
    registry.register_renderer("icon", EntityKind::Thread, thread_icon);

    let breakpoint_icon: super::Renderer = Arc::new(|node| {
        let Node::Breakpoint(b) = node else { return None };
        if !b.enabled.get() {
            return styled("\u{25cb}", "Comment");
        }
        styled("\u{25cf}", "DiagnosticError")
    });
    registry.register_renderer("icon", EntityKind::Breakpoint, breakpoint_icon);

    let binding_icon: super::Renderer = Arc::new(|node| {
        let Node::BreakpointBinding(b) = node else { return None };
        if b.hit.get() {
            return styled("\u{25cf}", "DiagnosticError");
        }
        if b.verified.get() {
            styled("\u{25cf}", "DiagnosticOk")
        } else {
            styled("\u{25cb}", "DiagnosticWarn")
        }
    });
    registry.register_renderer("icon", EntityKind::BreakpointBinding, binding_icon);
}

fn install_titles(registry: &Registry) {
    let session_title: super::Renderer = Arc::new(|node| {
        let Node::Session(s) = node else { return None };
        one(format!("session {}", s.runtime.id()))
    });
    registry.register_renderer("title", EntityKind::Session, session_title);

    let thread_title: super::Renderer = Arc::new(|node| {
        let Node::Thread(t) = node else { return None };
        one(t.name.get())
    });
    registry.register_renderer("title", EntityKind::Thread, thread_title);

    let frame_title: super::Renderer = Arc::new(|node| {
        let Node::Frame(f) = node else { return None };
        one(f.name.clone())
    });
    registry.register_renderer("title", EntityKind::Frame, frame_title);

    let scope_title: super::Renderer = Arc::new(|node| {
        let Node::Scope(s) = node else { return None };
        one(s.name.clone())
    });
    registry.register_renderer("title", EntityKind::Scope, scope_title);

    let variable_title: super::Renderer = Arc::new(|node| {
        let Node::Variable(v) = node else { return None };
        let ty = v.type_name.as_deref().map(|t| format!(": {t}")).unwrap_or_default();
        one(format!("{}{ty} = {}", v.name, v.value.get()))
    });
    registry.register_renderer("title", EntityKind::Variable, variable_title);

    let source_title: super::Renderer = Arc::new(|node| {
        let Node::Source(s) = node else { return None };
        let path = s.source.path.get().or_else(|| s.source.name.get()).unwrap_or_else(|| "<unknown source>".to_string());
        one(path)
    });
    registry.register_renderer("title", EntityKind::Source, source_title);

    let filter_title: super::Renderer = Arc::new(|node| {
        let Node::ExceptionFilter(f) = node else { return None };
        one(f.label.clone())
    });
    registry.register_renderer("title", EntityKind::ExceptionFilter, filter_title);
}

fn install_ids(registry: &Registry) {
    let session_id: super::Renderer = Arc::new(|node| {
        let Node::Session(s) = node else { return None };
        one(s.runtime.id().to_string())
    });
    registry.register_renderer("id", EntityKind::Session, session_id);

    let thread_id: super::Renderer = Arc::new(|node| {
        let Node::Thread(t) = node else { return None };
        one(t.id.to_string())
    });
    registry.register_renderer("id", EntityKind::Thread, thread_id);

    let breakpoint_id: super::Renderer = Arc::new(|node| {
        let Node::Breakpoint(b) = node else { return None };
        one(b.id.clone())
    });
    registry.register_renderer("id", EntityKind::Breakpoint, breakpoint_id);
}

fn install_counts(registry: &Registry) {
    let session_thread_count: super::Renderer = Arc::new(|node| {
        let Node::Session(s) = node else { return None };
        one(s.threads.iter().len().to_string())
    });
    registry.register_renderer("thread_count", EntityKind::Session, session_thread_count);

    let scope_variable_count: super::Renderer = Arc::new(|node| {
        let Node::Scope(s) = node else { return None };
        one(s.variables.iter().len().to_string())
    });
    registry.register_renderer("variable_count", EntityKind::Scope, scope_variable_count);
}

fn install_conditions(registry: &Registry) {
    let breakpoint_condition: super::Renderer = Arc::new(|node| {
        let Node::Breakpoint(b) = node else { return None };
        let mut segments = Vec::new();
        if let Some(cond) = b.condition.get() {
            segments.push(Segment::styled(format!("if {cond}"), "Comment"));
        }
        if let Some(hit) = b.hit_condition.get() {
            segments.push(Segment::styled(format!("hit {hit}"), "Comment"));
        }
        if let Some(log) = b.log_message.get() {
            segments.push(Segment::styled(format!("log {log}"), "Comment"));
        }
        if segments.is_empty() {
            None
        } else {
            Some(Rendered::Many(segments))
        }
    });
    registry.register_renderer("condition", EntityKind::Breakpoint, breakpoint_condition);

    let binding_message: super::Renderer = Arc::new(|node| {
        let Node::BreakpointBinding(b) = node else { return None };
        b.message.get().map(|m| Rendered::One(Segment::styled(m, "DiagnosticWarn")))
    });
    registry.register_renderer("message", EntityKind::BreakpointBinding, binding_message);
}

fn install_locations(registry: &Registry) {
    let breakpoint_location: super::Renderer = Arc::new(|node| {
        let Node::Breakpoint(b) = node else { return None };
        let loc = match b.column {
            Some(c) => format!("{}:{}:{}", b.source_path, b.line, c),
            None => format!("{}:{}", b.source_path, b.line),
        };
        one(loc)
    });
    registry.register_renderer("location", EntityKind::Breakpoint, breakpoint_location);

    let binding_location: super::Renderer = Arc::new(|node| {
        let Node::BreakpointBinding(b) = node else { return None };
        let line = b.actual_line.get()?;
        match b.actual_column.get() {
            Some(c) => one(format!("{line}:{c}")),
            None => one(line.to_string()),
        }
    });
    registry.register_renderer("location", EntityKind::BreakpointBinding, binding_location);

    let frame_location: super::Renderer = Arc::new(|node| {
        let Node::Frame(f) = node else { return None };
        let path = f.source.as_ref().and_then(|s| s.source.path.get()).unwrap_or_else(|| "<unknown>".to_string());
        one(format!("{path}:{}:{}", f.line, f.column))
    });
    registry.register_renderer("location", EntityKind::Frame, frame_location);
}

fn install_output(registry: &Registry) {
    // §4.9 "tokenised output pretty-printing": split on whitespace runs so a
    // host can apply per-token highlighting (e.g. highlighting a stack-trace
    // path token differently from the surrounding prose) without this crate
    // knowing the host's highlight groups.
    let output_tokens: super::Renderer = Arc::new(|node| {
        let Node::Output(o) = node else { return None };
        let highlight = match o.category.as_str() {
            "stderr" => "DiagnosticError",
            "console" => "Comment",
            _ => "Normal",
        };
        let tokens: Vec<Segment> = o
            .text
            .split_inclusive(char::is_whitespace)
            .map(|tok| Segment::styled(tok, highlight))
            .collect();
        if tokens.is_empty() {
            None
        } else {
            Some(Rendered::Many(tokens))
        }
    });
    registry.register_renderer("text", EntityKind::Output, output_tokens);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::breakpoints::BreakpointOptions;
    use crate::graph::Debugger;

    #[test]
    fn breakpoint_icon_differs_when_disabled() {
        let debugger = Debugger::new();
        let engine = crate::breakpoints::BreakpointEngine::new(debugger, crate::scheduler::Scheduler::new());
        let bp = engine.add_breakpoint("/tmp/a.rs", 1, None, BreakpointOptions::default());

        let registry = Registry::new();
        registry.install();
        let node = Node::Breakpoint(bp.clone());
        let enabled_icon = registry.components(&node).get("icon").cloned();
        bp.enabled.set(false);
        let disabled_icon = registry.components(&node).get("icon").cloned();
        assert_ne!(enabled_icon, disabled_icon);
    }

    #[test]
    fn output_text_tokenises_into_segments() {
        let registry = Registry::new();
        registry.install();
        let output = crate::graph::Output { seq: 1, category: "stdout".to_string(), text: "hello world".to_string(), source_line: None };
        let node = Node::Output(output);
        let rendered = registry.components(&node).get("text").cloned().unwrap();
        assert!(rendered.segments().len() >= 2);
    }
}
