//! On-demand fetch operations (§4.6: "subsequently `fetchStackTrace`
//! replaces `thread.stacks` with a single new Stack"). These are the one
//! part of the graph that isn't purely event-driven — a host asks for a
//! thread's stack, a frame's scopes, a scope's variables, when it actually
//! needs them (most DAP adapters treat `stackTrace`/`scopes`/`variables` as
//! expensive, paged calls, so the graph never fetches eagerly on `stopped`).

use super::entities::{Frame, Scope, SourceId, Stack, Thread, Variable};
use super::Session;
use crate::error::Result;
use crate::protocol::types::{
    ScopesArguments, StackTraceArguments, VariablesArguments,
};
use crate::reactive::{Edge, Signal};
use serde::Deserialize;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StackTraceResponseBody {
    stack_frames: Vec<crate::protocol::types::StackFrame>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScopesResponseBody {
    scopes: Vec<crate::protocol::types::Scope>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VariablesResponseBody {
    variables: Vec<crate::protocol::types::Variable>,
}

impl Session {
    /// §4.6: replace `thread.stack` with a freshly-fetched, incremented-seq
    /// snapshot. Also merges any newly-seen `Source` into `self.sources`.
    pub async fn fetch_stack_trace(&self, thread: &Thread) -> Result<()> {
        let args = StackTraceArguments {
            thread_id: thread.id,
            start_frame: None,
            levels: None,
        };
        let body = self
            .runtime
            .client()
            .request("stackTrace", Some(serde_json::to_value(&args)?))
            .await?;
        let resp: StackTraceResponseBody = serde_json::from_value(body)?;

        let seq = thread.stack.get().map(|prev| prev.seq + 1).unwrap_or(1);
        let stack_uri = thread.uri.child("stack", &seq.to_string());

        let frames = resp
            .stack_frames
            .into_iter()
            .map(|sf| {
                let source = sf.source.as_ref().and_then(|s| self.merge_source(s));
                Frame {
                    id: sf.id,
                    uri: stack_uri.child("frame", &sf.id.to_string()),
                    name: sf.name,
                    source,
                    line: sf.line,
                    column: sf.column,
                    scopes: Edge::new(),
                }
            })
            .collect();

        thread.stack.set(Some(Stack { seq, uri: stack_uri, frames }));
        Ok(())
    }

    fn merge_source(&self, dap_source: &crate::protocol::types::Source) -> Option<super::entities::SourceBinding> {
        let id = SourceId::from_dap(dap_source)?;
        let key = match &id {
            SourceId::Path(p) => p.clone(),
            SourceId::Reference(r) => format!("ref:{r}"),
        };
        if let Some(existing) = self.sources.get(&key) {
            return Some(existing);
        }
        let source = super::entities::Source::from_dap(dap_source)?;
        let binding = super::entities::SourceBinding {
            uri: self.uri.child("source", &key),
            source,
        };
        self.sources.push(binding.clone());
        Some(binding)
    }
}

impl Frame {
    /// Populate `self.scopes` for this frame (idempotent: re-fetching
    /// replaces the set wholesale, matching `stackTrace`'s own semantics for
    /// frame identity).
    pub async fn fetch_scopes(&self, session: &Session) -> Result<()> {
        let args = ScopesArguments { frame_id: self.id };
        let body = session
            .runtime
            .client()
            .request("scopes", Some(serde_json::to_value(&args)?))
            .await?;
        let resp: ScopesResponseBody = serde_json::from_value(body)?;
        self.scopes.clear();
        for (i, s) in resp.scopes.into_iter().enumerate() {
            self.scopes.push(Scope {
                name: s.name.clone(),
                uri: self.uri.child("scope", &format!("{i}:{}", s.name)),
                variables_reference: s.variables_reference,
                expensive: s.expensive,
                variables: Edge::new(),
            });
        }
        Ok(())
    }
}

impl Scope {
    /// Populate `self.variables` by `variablesReference` (also used by
    /// `Variable::fetch_children` for nested structures, since DAP
    /// addresses both the same way).
    pub async fn fetch_variables(&self, session: &Session) -> Result<()> {
        let vars = fetch_variables_by_reference(session, &self.uri, self.variables_reference).await?;
        self.variables.clear();
        for v in vars {
            self.variables.push(v);
        }
        Ok(())
    }
}

impl Variable {
    pub async fn fetch_children(&self, session: &Session) -> Result<()> {
        if self.variables_reference == 0 {
            return Ok(());
        }
        let vars = fetch_variables_by_reference(session, &self.uri, self.variables_reference).await?;
        self.children.clear();
        for v in vars {
            self.children.push(v);
        }
        Ok(())
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::graph::{Debugger, Thread};
    use crate::protocol::Client;
    use crate::query::{query_all, resolve_uri, Node};
    use crate::scheduler::Scheduler;
    use crate::session_runtime::SessionRuntime;
    use crate::test_util::fake_pair;

    #[tokio::test]
    async fn refetching_the_stack_trace_replaces_its_frames_wholesale() {
        let (transport, adapter) = fake_pair();
        let scheduler = Scheduler::new();
        let client = Client::new(transport, &scheduler);
        let runtime = SessionRuntime::new_for_test(client, scheduler).await;
        let debugger = Debugger::new();
        let session = debugger.add_session(runtime).await;
        let thread = Thread::new(&session.uri, 1, "main".to_string());
        session.threads.push(thread.clone());

        let fetch = tokio::spawn({
            let session = session.clone();
            let thread = thread.clone();
            async move { session.fetch_stack_trace(&thread).await }
        });
        let req = adapter.recv_request().await;
        assert_eq!(req.command, "stackTrace");
        adapter.reply(
            &req,
            true,
            Some(serde_json::json!({"stackFrames": [
                {"id": 1, "name": "foo", "line": 10, "column": 1,
                 "source": {"path": "/tmp/a.rs"}},
            ]})),
        );
        fetch.await.unwrap().unwrap();

        let first_stack = thread.stack.get().unwrap();
        assert_eq!(first_stack.seq, 1);
        assert_eq!(first_stack.frames.len(), 1);
        assert_eq!(first_stack.frames[0].line, 10);

        // A stale URL resolved via the query engine sees the current
        // generation's frame, never a frame from a superseded Stack.
        let frame_url = format!(
            "/sessions/session:{}/threads/thread:1/stack/frames",
            session.runtime.id()
        );
        let before = query_all(&debugger, &frame_url);
        assert_eq!(before.len(), 1);
        let Node::Frame(f) = &before[0] else { panic!("expected a frame") };
        assert_eq!(f.line, 10);
        assert_eq!(resolve_uri(&debugger, &f.uri).unwrap().uri(), f.uri);

        let fetch = tokio::spawn({
            let session = session.clone();
            let thread = thread.clone();
            async move { session.fetch_stack_trace(&thread).await }
        });
        let req = adapter.recv_request().await;
        adapter.reply(
            &req,
            true,
            Some(serde_json::json!({"stackFrames": [
                {"id": 1, "name": "foo", "line": 20, "column": 1,
                 "source": {"path": "/tmp/a.rs"}},
            ]})),
        );
        fetch.await.unwrap().unwrap();

        let second_stack = thread.stack.get().unwrap();
        assert_eq!(second_stack.seq, 2);
        let after = query_all(&debugger, &frame_url);
        assert_eq!(after.len(), 1);
        let Node::Frame(f2) = &after[0] else { panic!("expected a frame") };
        assert_eq!(f2.line, 20, "the same frame id at a later stop resolves to the new generation's line, not the old one");
    }
}

/// `parent_uri` is the `Scope` or `Variable` this reference was fetched
/// through — variables are addressed as children of whichever entity named
/// their `variablesReference`, never root-anchored (there is no
/// `Debugger.variables` edge).
async fn fetch_variables_by_reference(
    session: &Session,
    parent_uri: &crate::graph::Uri,
    variables_reference: i64,
) -> Result<Vec<Variable>> {
    let args = VariablesArguments { variables_reference };
    let body = session
        .runtime
        .client()
        .request("variables", Some(serde_json::to_value(&args)?))
        .await?;
    let resp: VariablesResponseBody = serde_json::from_value(body)?;
    Ok(resp
        .variables
        .into_iter()
        .map(|v| Variable {
            uri: parent_uri.child("variable", &v.name),
            name: v.name,
            value: Signal::new(v.value),
            type_name: v.type_,
            variables_reference: v.variables_reference,
            children: Edge::new(),
        })
        .collect())
}
