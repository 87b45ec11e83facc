//! Event-driven mutation (§4.6 item 1). Wires a `Session`'s underlying
//! `protocol::Client` events onto its entity edges. Grounded on the same
//! `dap/client.rs` event-dispatch shape `protocol::Client` generalizes —
//! here it's the consumer side: one handler per event name, doing the exact
//! mutation §4.6 enumerates.
//!
//! Breakpoint hit-mapping is deliberately NOT wired here — the `breakpoint`
//! and the hit-mapping half of `stopped` belong to `breakpoints` (§4.8),
//! which registers its own handlers on the same client so the two concerns
//! don't couple to each other's internals.

use super::entities::{Output, Source, SourceBinding, SourceId, Thread, ThreadState};
use super::Session;
use crate::protocol::types::{
    ContinuedEventBody, LoadedSourceEventBody, OutputEventBody, StoppedEventBody, ThreadEventBody,
};
use tracing::warn;

pub(crate) async fn wire_session(session: Session) {
    let client = session.runtime.client().clone();

    {
        let session = session.clone();
        client
            .on_event("thread", move |ev| {
                let Some(body) = ev.body else { return };
                let body: ThreadEventBody = match serde_json::from_value(body) {
                    Ok(b) => b,
                    Err(e) => return warn!(error = %e, "malformed thread event"),
                };
                match body.reason.as_str() {
                    "started" => {
                        if session.threads.get(&body.thread_id.to_string()).is_none() {
                            session.threads.push(Thread::new(
                                &session.uri,
                                body.thread_id,
                                format!("thread {}", body.thread_id),
                            ));
                        }
                    }
                    "exited" => session.threads.remove(&body.thread_id.to_string()),
                    other => warn!(reason = other, "unrecognized thread event reason"),
                }
            })
            .await;
    }

    {
        let session = session.clone();
        client
            .on_event("stopped", move |ev| {
                let Some(body) = ev.body else { return };
                let body: StoppedEventBody = match serde_json::from_value(body) {
                    Ok(b) => b,
                    Err(e) => return warn!(error = %e, "malformed stopped event"),
                };
                let targets: Vec<Thread> = if body.all_threads_stopped {
                    session.threads.iter()
                } else if let Some(id) = body.thread_id {
                    session.threads.get(&id.to_string()).into_iter().collect()
                } else {
                    Vec::new()
                };
                for thread in targets {
                    thread.state.set(ThreadState::Stopped {
                        reason: body.reason.clone(),
                        description: body.description.clone(),
                        hit_breakpoint_ids: body.hit_breakpoint_ids.clone(),
                    });
                    thread.stack.set(None);
                }
            })
            .await;
    }

    {
        let session = session.clone();
        client
            .on_event("continued", move |ev| {
                let Some(body) = ev.body else { return };
                let body: ContinuedEventBody = match serde_json::from_value(body) {
                    Ok(b) => b,
                    Err(e) => return warn!(error = %e, "malformed continued event"),
                };
                let targets: Vec<Thread> = if body.all_threads_continued {
                    session.threads.iter()
                } else {
                    session.threads.get(&body.thread_id.to_string()).into_iter().collect()
                };
                for thread in targets {
                    thread.state.set(ThreadState::Running);
                    thread.stack.set(None);
                }
            })
            .await;
    }

    {
        let session = session.clone();
        client
            .on_event("output", move |ev| {
                let Some(body) = ev.body else { return };
                let body: OutputEventBody = match serde_json::from_value(body) {
                    Ok(b) => b,
                    Err(e) => return warn!(error = %e, "malformed output event"),
                };
                if let Some(source) = &body.source {
                    merge_source(&session, source);
                }
                session.outputs.push(Output {
                    seq: ev.seq,
                    category: body.category.unwrap_or_else(|| "console".to_string()),
                    text: body.output,
                    source_line: body.line,
                });
            })
            .await;
    }

    {
        let session = session.clone();
        client
            .on_event("loadedSource", move |ev| {
                let Some(body) = ev.body else { return };
                let body: LoadedSourceEventBody = match serde_json::from_value(body) {
                    Ok(b) => b,
                    Err(e) => return warn!(error = %e, "malformed loadedSource event"),
                };
                merge_source(&session, &body.source);
            })
            .await;
    }

    {
        let session = session.clone();
        client
            .on_event("exited", move |_ev| {
                for thread in session.threads.iter() {
                    thread.state.set(ThreadState::Exited);
                }
            })
            .await;
    }
}

#[cfg(test)]
mod integration_tests {
    use super::*;
    use crate::protocol::Client;
    use crate::scheduler::Scheduler;
    use crate::session_runtime::SessionRuntime;
    use crate::test_util::{fake_pair, FakeAdapter};
    use std::time::Duration;

    async fn fake_session() -> (Session, FakeAdapter) {
        let (transport, adapter) = fake_pair();
        let scheduler = Scheduler::new();
        let client = Client::new(transport, &scheduler);
        let runtime = SessionRuntime::new_for_test(client, scheduler).await;
        (Session::new(runtime), adapter)
    }

    #[tokio::test]
    async fn thread_started_event_adds_a_thread() {
        let (session, adapter) = fake_session().await;
        wire_session(session.clone()).await;

        adapter.send_event("thread", Some(serde_json::json!({"reason": "started", "threadId": 7})));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(session.threads.get("7").is_some());
    }

    #[tokio::test]
    async fn stopped_event_marks_the_named_thread_stopped_and_clears_its_stack() {
        let (session, adapter) = fake_session().await;
        wire_session(session.clone()).await;

        adapter.send_event("thread", Some(serde_json::json!({"reason": "started", "threadId": 1})));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let thread = session.threads.get("1").unwrap();
        thread.stack.set(Some(super::super::entities::Stack {
            seq: 1,
            uri: thread.uri.child("stack", "1"),
            frames: vec![],
        }));

        adapter.send_event(
            "stopped",
            Some(serde_json::json!({"reason": "breakpoint", "threadId": 1, "allThreadsStopped": false})),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(matches!(thread.state.get(), ThreadState::Stopped { .. }));
        assert!(thread.stack.get().is_none());
    }

    #[tokio::test]
    async fn output_event_appends_to_the_session_outputs_edge() {
        let (session, adapter) = fake_session().await;
        wire_session(session.clone()).await;

        adapter.send_event("output", Some(serde_json::json!({"category": "stdout", "output": "hi\n"})));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(session.outputs.len(), 1);
        assert_eq!(session.outputs.iter()[0].text, "hi\n");
    }
}

/// Create-or-merge-by-identity (§4.6: "create (or merge by path/
/// sourceReference) Source + SourceBinding").
fn merge_source(session: &Session, dap_source: &crate::protocol::types::Source) {
    let Some(id) = SourceId::from_dap(dap_source) else { return };
    let key = match &id {
        SourceId::Path(p) => p.clone(),
        SourceId::Reference(r) => format!("ref:{r}"),
    };
    if let Some(existing) = session.sources.get(&key) {
        existing.source.name.set(dap_source.name.clone());
        existing.source.path.set(dap_source.path.clone());
        existing.source.source_reference.set(dap_source.source_reference);
        return;
    }
    let Some(source) = Source::from_dap(dap_source) else { return };
    let uri = session.uri.child("source", &key);
    session.sources.push(SourceBinding { uri, source });
}
