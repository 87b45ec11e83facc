//! Evaluation (§4.7): walk the parsed URL against the graph, applying
//! selectors left-to-right with filters before indices (per segment).

use super::ast::{self, Context, FilterValue, Root, Selector};
use super::node::{Node, PropValue};
use crate::error::{Error, Result};
use crate::graph::{Debugger, Uri};
use std::sync::Arc;

/// §4.7 `query`: evaluate once, return the first match.
pub fn query(debugger: &Arc<Debugger>, url: &str) -> Option<Node> {
    resolve(debugger, url).ok().and_then(|mut v| if v.is_empty() { None } else { Some(v.remove(0)) })
}

/// §4.7 `queryAll`: evaluate once, return every match.
pub fn query_all(debugger: &Arc<Debugger>, url: &str) -> Vec<Node> {
    resolve(debugger, url).unwrap_or_default()
}

fn resolve(debugger: &Arc<Debugger>, url: &str) -> Result<Vec<Node>> {
    let parsed = ast::parse(url)?;
    let mut current = match &parsed.root {
        Root::Abs => vec![Node::Debugger(debugger.clone())],
        Root::Rel { context, offset } => resolve_context(debugger, context, *offset)?,
    };

    for segment in &parsed.segments {
        let mut next = Vec::new();
        for node in &current {
            next.extend(node.edge(&segment.edge));
        }
        for selector in &segment.selectors {
            next = apply_selector(next, selector);
        }
        current = next;
    }
    Ok(current)
}

fn resolve_context(debugger: &Arc<Debugger>, context: &Context, offset: i64) -> Result<Vec<Node>> {
    let focus_uri = debugger
        .focus
        .get()
        .ok_or_else(|| Error::InvalidUrl("@context reference with no focus set".to_string()))?;
    let focus = resolve_uri(debugger, &focus_uri)?;

    match context {
        Context::Debugger => Ok(vec![Node::Debugger(debugger.clone())]),
        Context::Session => Ok(vec![enclosing_session(debugger, &focus)?]),
        Context::Thread => Ok(vec![enclosing_thread(debugger, &focus)?]),
        Context::Stack => {
            let thread = enclosing_thread(debugger, &focus)?;
            Ok(thread.edge("stack"))
        }
        Context::Frame => {
            let Node::Frame(_) = &focus else {
                return Err(Error::InvalidUrl("@frame reference but focus is not a frame".to_string()));
            };
            let thread = enclosing_thread(debugger, &focus)?;
            let frames = thread.edge("stack").into_iter().flat_map(|s| s.edge("frames")).collect::<Vec<_>>();
            let Node::Frame(f) = &focus else { unreachable!() };
            let idx = frames.iter().position(|n| matches!(n, Node::Frame(other) if other.id == f.id));
            let Some(idx) = idx else {
                return Err(Error::InvalidUrl("focused frame not found in its own stack".to_string()));
            };
            let target = idx as i64 + offset;
            if target < 0 || target as usize >= frames.len() {
                return Ok(Vec::new());
            }
            Ok(vec![frames[target as usize].clone()])
        }
    }
}

/// URI round-trip (§6: "`query(entity.uri) == entity`"): resolve a `Uri`
/// back into its `Node` by walking its `type:key` segments from the root.
pub fn resolve_uri(debugger: &Arc<Debugger>, uri: &Uri) -> Result<Node> {
    let mut current = Node::Debugger(debugger.clone());
    for (entity_type, key) in uri.segments() {
        let edge_name = edge_name_for(entity_type)
            .ok_or_else(|| Error::InvalidUrl(format!("unknown entity type '{entity_type}'")))?;
        let candidates = current.edge(edge_name);
        current = candidates
            .into_iter()
            .find(|n| key_matches(n, key))
            .ok_or_else(|| Error::InvalidUrl(format!("no '{entity_type}:{key}' reachable from current position")))?;
    }
    Ok(current)
}

fn edge_name_for(entity_type: &str) -> Option<&'static str> {
    match entity_type {
        "session" => Some("sessions"),
        "thread" => Some("threads"),
        "stack" => Some("stack"),
        "frame" => Some("frames"),
        "scope" => Some("scopes"),
        "variable" => Some("variables"),
        "source" => Some("sources"),
        "breakpoint" => Some("breakpoints"),
        "breakpoint_binding" => Some("breakpoint_bindings"),
        "exception_filter" => Some("exception_filters"),
        "output" => Some("outputs"),
        _ => None,
    }
}

fn key_matches(node: &Node, key: &str) -> bool {
    use crate::reactive::Keyed;
    match node {
        Node::Session(s) => s.key() == key,
        Node::Thread(t) => t.key() == key,
        Node::Stack(s) => s.key() == key,
        Node::Frame(f) => f.key() == key,
        Node::Scope(s) => s.key() == key,
        Node::Variable(v) => v.key() == key,
        Node::Source(s) => s.key() == key,
        Node::Breakpoint(b) => b.key() == key,
        Node::BreakpointBinding(b) => b.key() == key,
        Node::ExceptionFilter(f) => f.key() == key,
        Node::Output(o) => o.key() == key,
        _ => false,
    }
}

fn enclosing_session(debugger: &Arc<Debugger>, node: &Node) -> Result<Node> {
    let uri = node.uri();
    let segments = uri.segments();
    let (_, key) = segments
        .first()
        .ok_or_else(|| Error::InvalidUrl("focused entity has no enclosing session".to_string()))?;
    debugger
        .session(key)
        .map(Node::Session)
        .ok_or_else(|| Error::InvalidUrl(format!("session '{key}' no longer exists")))
}

fn enclosing_thread(debugger: &Arc<Debugger>, node: &Node) -> Result<Node> {
    let session = enclosing_session(debugger, node)?;
    let Node::Session(s) = &session else { unreachable!() };
    let uri = node.uri();
    let segments = uri.segments();
    let (_, key) = segments
        .get(1)
        .ok_or_else(|| Error::InvalidUrl("focused entity has no enclosing thread".to_string()))?;
    s.threads.get(key).map(Node::Thread).ok_or_else(|| Error::InvalidUrl(format!("thread '{key}' no longer exists")))
}

fn apply_selector(nodes: Vec<Node>, selector: &Selector) -> Vec<Node> {
    match selector {
        Selector::Key(key) => nodes.into_iter().filter(|n| key_matches(n, key)).collect(),
        Selector::Filters(filters) => nodes
            .into_iter()
            .filter(|n| filters.iter().all(|(prop, val)| matches_filter(n, prop, val)))
            .collect(),
        Selector::Index(i) => nodes.into_iter().nth(*i).into_iter().collect(),
    }
}

fn matches_filter(node: &Node, prop: &str, value: &FilterValue) -> bool {
    let Some(actual) = node.property(prop) else { return false };
    match (actual, value) {
        (PropValue::Str(a), FilterValue::Str(b)) => &a == b,
        (PropValue::Int(a), FilterValue::Int(b)) => &a == b,
        (PropValue::Bool(a), FilterValue::Bool(b)) => &a == b,
        _ => false,
    }
}
