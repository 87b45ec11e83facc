//! Presentation Registry (C9, §4.9): purely-functional `(name, EntityKind) →
//! Renderer` and `(name, EntityKind) → Action` maps, plus a baseline set
//! installed once, idempotently.
//!
//! Grounded on `Alb-O-xeno`'s `panels::registry::PanelRegistry` for the
//! "trait-object map keyed by a small enum, looked up by name" shape;
//! generalized from one `HashMap<PanelId, Box<dyn SplitBuffer>>` into the
//! two parallel `(name, EntityKind)` maps this registry needs.

mod actions;
mod renderers;

use crate::breakpoints::BreakpointEngine;
use crate::error::{Error, Result};
use crate::graph::Debugger;
use crate::query::Node;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Mirrors the entity-type names used in URIs (§6) and the query engine's
/// edge names, so a renderer/action registered for `EntityKind::Frame`
/// applies to every `Node::Frame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Debugger,
    Session,
    Thread,
    Frame,
    Scope,
    Variable,
    Source,
    Breakpoint,
    BreakpointBinding,
    ExceptionFilter,
    Output,
}

impl EntityKind {
    pub fn of(node: &Node) -> Self {
        match node {
            Node::Debugger(_) => EntityKind::Debugger,
            Node::Session(_) => EntityKind::Session,
            Node::Thread(_) => EntityKind::Thread,
            Node::Stack(_) => EntityKind::Thread,
            Node::Frame(_) => EntityKind::Frame,
            Node::Scope(_) => EntityKind::Scope,
            Node::Variable(_) => EntityKind::Variable,
            Node::Source(_) => EntityKind::Source,
            Node::Breakpoint(_) => EntityKind::Breakpoint,
            Node::BreakpointBinding(_) => EntityKind::BreakpointBinding,
            Node::ExceptionFilter(_) => EntityKind::ExceptionFilter,
            Node::ExceptionFilterBinding(_) => EntityKind::ExceptionFilter,
            Node::Output(_) => EntityKind::Output,
        }
    }
}

/// A single styled run of text. `highlight` names a host-defined highlight
/// group (e.g. `"Comment"`, `"DiagnosticError"`); the registry itself never
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub highlight: Option<String>,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Segment { text: text.into(), highlight: None }
    }

    pub fn styled(text: impl Into<String>, highlight: impl Into<String>) -> Self {
        Segment { text: text.into(), highlight: Some(highlight.into()) }
    }
}

/// A renderer's output: one run, or several concatenated in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    One(Segment),
    Many(Vec<Segment>),
}

impl Rendered {
    pub fn segments(&self) -> Vec<Segment> {
        match self {
            Rendered::One(s) => vec![s.clone()],
            Rendered::Many(v) => v.clone(),
        }
    }
}

pub type Renderer = Arc<dyn Fn(&Node) -> Option<Rendered> + Send + Sync>;

/// Actions run against a `Node` plus whatever collaborators they need to
/// mutate state (the graph's own root, the breakpoint engine). Actions are
/// the one non-pure part of the registry; everything else here is a lookup
/// table over functions.
pub struct ActionContext {
    pub debugger: Arc<Debugger>,
    pub breakpoints: Option<Arc<BreakpointEngine>>,
    pub scheduler: crate::scheduler::Scheduler,
}

/// Actions that edit a value (`edit_condition`, `edit_log_message`, …) need
/// host-supplied input the bare `(name, entity)` pair in §4.9 doesn't carry;
/// `param` fills that gap without splitting editing actions into their own
/// registry.
pub type Action = Arc<dyn Fn(&Node, &ActionContext, Option<serde_json::Value>) -> Result<()> + Send + Sync>;

#[derive(Default)]
struct Maps {
    renderers: HashMap<(String, EntityKind), Renderer>,
    actions: HashMap<(String, EntityKind), Action>,
    installed: bool,
}

/// The registry itself. Cheap to clone (an `Arc<RwLock<..>>` handle),
/// consistent with how `graph`/`reactive` entities are shared here.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RwLock<Maps>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry { inner: Arc::new(RwLock::new(Maps::default())) }
    }

    pub fn register_renderer(&self, name: impl Into<String>, kind: EntityKind, f: Renderer) {
        self.inner.write().renderers.insert((name.into(), kind), f);
    }

    pub fn register_action(&self, name: impl Into<String>, kind: EntityKind, f: Action) {
        self.inner.write().actions.insert((name.into(), kind), f);
    }

    /// §4.9 `components(entity)`: every registered renderer applicable to
    /// `node`'s kind, evaluated now.
    pub fn components(&self, node: &Node) -> HashMap<String, Rendered> {
        let kind = EntityKind::of(node);
        let renderers = self.inner.read();
        renderers
            .renderers
            .iter()
            .filter(|((_, k), _)| *k == kind)
            .filter_map(|((name, _), f)| f(node).map(|r| (name.clone(), r)))
            .collect()
    }

    /// §4.9 `action(name, entity)`: run the named action if one is
    /// registered for `node`'s kind.
    pub fn action(
        &self,
        name: &str,
        node: &Node,
        ctx: &ActionContext,
        param: Option<serde_json::Value>,
    ) -> Result<()> {
        let kind = EntityKind::of(node);
        let f = {
            let maps = self.inner.read();
            maps.actions.get(&(name.to_string(), kind)).cloned()
        };
        match f {
            Some(f) => f(node, ctx, param),
            None => Err(Error::Internal(format!("no action '{name}' registered for {kind:?}"))),
        }
    }

    /// Install the baseline renderer/action set. Idempotent: repeat calls
    /// after the first are a no-op.
    pub fn install(&self) {
        {
            let maps = self.inner.read();
            if maps.installed {
                return;
            }
        }
        renderers::install_baseline(self);
        actions::install_baseline(self);
        self.inner.write().installed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_is_idempotent() {
        let registry = Registry::new();
        registry.install();
        let count_after_first = registry.inner.read().renderers.len();
        registry.install();
        assert_eq!(registry.inner.read().renderers.len(), count_after_first);
    }
}
