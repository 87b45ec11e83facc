//! Breakpoint Engine (C8, §4.8): the `Breakpoint`/`BreakpointBinding` model,
//! the 50ms coalescing source-sync scheduler, and hit mapping.
//!
//! No direct teacher file covers this (the teacher calls `setBreakpoints`
//! once per edit with no reconciliation); grounded on SPEC_FULL.md's own
//! pseudocode for the per-source sync algorithm, built on `scheduler::run_after`
//! the way the teacher builds its debounced file-watch retries in
//! `lsp/workspace.rs` on a plain `tokio::time::sleep`.

use crate::error::Result;
use crate::graph::{Breakpoint, BreakpointBinding, Debugger, Session, SourceId};
use crate::protocol::types::{Source as DapSource, SourceBreakpoint};
use crate::reactive::{Keyed, Signal};
use crate::scheduler::Scheduler;
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// §4.8: "the batch window".
pub const SYNC_BATCH_WINDOW: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct BreakpointOptions {
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
    pub enabled: Option<bool>,
}

#[derive(Deserialize)]
struct SetBreakpointsResponseBody {
    #[serde(default)]
    breakpoints: Vec<crate::protocol::types::Breakpoint>,
}

pub struct BreakpointEngine {
    debugger: Arc<Debugger>,
    scheduler: Scheduler,
    pending: Mutex<HashSet<(String, String)>>,
}

impl BreakpointEngine {
    pub fn new(debugger: Arc<Debugger>, scheduler: Scheduler) -> Arc<Self> {
        Arc::new(BreakpointEngine {
            debugger,
            scheduler,
            pending: Mutex::new(HashSet::new()),
        })
    }

    fn find_at(&self, source_path: &str, line: i64, column: Option<i64>) -> Option<Breakpoint> {
        self.debugger
            .breakpoints
            .iter()
            .into_iter()
            .find(|b| b.source_path == source_path && b.line == line && b.column == column)
    }

    /// §4.8 `addBreakpoint`.
    pub fn add_breakpoint(
        self: &Arc<Self>,
        source_path: impl Into<String>,
        line: i64,
        column: Option<i64>,
        opts: BreakpointOptions,
    ) -> Breakpoint {
        let source_path = source_path.into();
        if let Some(existing) = self.find_at(&source_path, line, column) {
            return existing;
        }
        let id = Uuid::new_v4().to_string();
        let bp = Breakpoint {
            uri: crate::graph::Uri::root().child("breakpoint", &id),
            id,
            source_path: source_path.clone(),
            line,
            column,
            condition: Signal::new(opts.condition),
            hit_condition: Signal::new(opts.hit_condition),
            log_message: Signal::new(opts.log_message),
            enabled: Signal::new(opts.enabled.unwrap_or(true)),
        };
        self.debugger.breakpoints.push(bp.clone());
        self.schedule_syncs_for_source(&source_path);
        bp
    }

    /// §4.8 `removeBreakpoint`.
    pub fn remove_breakpoint(self: &Arc<Self>, bp: &Breakpoint) {
        self.debugger.breakpoints.remove(&bp.id);
        let stale: Vec<String> = self
            .debugger
            .breakpoint_bindings
            .iter()
            .into_iter()
            .filter(|b| b.breakpoint_id == bp.id)
            .map(|b| b.key())
            .collect();
        for key in stale {
            self.debugger.breakpoint_bindings.remove(&key);
        }
        self.schedule_syncs_for_source(&bp.source_path);
    }

    /// §4.8 `toggleBreakpoint`.
    pub fn toggle_breakpoint(
        self: &Arc<Self>,
        source_path: &str,
        line: i64,
        column: Option<i64>,
    ) -> Option<Breakpoint> {
        if let Some(existing) = self.find_at(source_path, line, column) {
            self.remove_breakpoint(&existing);
            None
        } else {
            Some(self.add_breakpoint(source_path, line, column, BreakpointOptions::default()))
        }
    }

    /// §4.8 `resyncBreakpoint`.
    pub fn resync_breakpoint(self: &Arc<Self>, bp: &Breakpoint) {
        self.schedule_syncs_for_source(&bp.source_path);
    }

    fn schedule_syncs_for_source(self: &Arc<Self>, source_path: &str) {
        for session in self.debugger.sessions.iter() {
            if session.sources.get(source_path).is_some() {
                self.queue_source_sync(session, source_path.to_string());
            }
        }
    }

    /// §4.8 `queueSourceSync`: coalescing scheduler keyed by
    /// `(session.id, source.identifier)`.
    pub fn queue_source_sync(self: &Arc<Self>, session: Session, source_key: String) {
        let key = (session.runtime.id().to_string(), source_key.clone());
        {
            let mut pending = self.pending.lock();
            if pending.contains(&key) {
                return;
            }
            pending.insert(key.clone());
        }

        let engine = Arc::clone(self);
        self.scheduler.run_after(SYNC_BATCH_WINDOW, move |_token| async move {
            engine.perform_sync(&session, &source_key).await;
            engine.pending.lock().remove(&key);
            Ok::<(), crate::Error>(())
        });
    }

    /// The per-source sync algorithm (§4.8, "the hardest part").
    async fn perform_sync(&self, session: &Session, source_key: &str) {
        let mut at_source: Vec<Breakpoint> = self
            .debugger
            .breakpoints
            .iter()
            .into_iter()
            .filter(|b| b.source_path == source_key)
            .collect();
        at_source.sort_by(|a, b| {
            (a.line, a.column.unwrap_or(0), a.id.clone()).cmp(&(
                b.line,
                b.column.unwrap_or(0),
                b.id.clone(),
            ))
        });

        let session_id = session.runtime.id().to_string();
        let existing: HashMap<String, BreakpointBinding> = self
            .debugger
            .breakpoint_bindings
            .iter()
            .into_iter()
            .filter(|b| b.session_id == session_id)
            .map(|b| (b.breakpoint_id.clone(), b))
            .collect();

        let mut payload = Vec::new();
        let mut sent_ids = Vec::new();
        for bp in &at_source {
            if !bp.effective_enabled() {
                continue;
            }
            let binding = existing.get(&bp.id);
            payload.push(SourceBreakpoint {
                line: binding.and_then(|b| b.actual_line.get()).unwrap_or(bp.line),
                column: binding.and_then(|b| b.actual_column.get()).or(bp.column),
                condition: bp.condition.get(),
                hit_condition: bp.hit_condition.get(),
                log_message: bp.log_message.get(),
            });
            sent_ids.push(bp.id.clone());
        }

        let source = DapSource {
            path: Some(source_key.to_string()),
            ..Default::default()
        };
        let args = crate::protocol::types::SetBreakpointsArguments {
            source,
            breakpoints: Some(payload),
            source_modified: None,
        };

        let args_value = match serde_json::to_value(&args) {
            Ok(v) => v,
            Err(e) => return warn!(error = %e, "failed to serialize setBreakpoints arguments"),
        };

        let response = match session.runtime.client().request("setBreakpoints", Some(args_value)).await {
            Ok(v) => v,
            Err(e) => return warn!(error = %e, session = %session_id, source = source_key, "setBreakpoints request failed"),
        };

        let parsed: SetBreakpointsResponseBody = match serde_json::from_value(response) {
            Ok(v) => v,
            Err(e) => return warn!(error = %e, "malformed setBreakpoints response"),
        };

        let mut processed = HashSet::new();
        for (i, dap_bp) in parsed.breakpoints.iter().enumerate() {
            let Some(bp_id) = sent_ids.get(i) else {
                warn!("setBreakpoints response longer than payload sent; ignoring extra entries");
                break;
            };
            let binding_key = format!("{bp_id}:{session_id}");
            if dap_bp.verified {
                if let Some(existing) = self.debugger.breakpoint_bindings.get(&binding_key) {
                    existing.adapter_id.set(dap_bp.id);
                    existing.verified.set(true);
                    existing.actual_line.set(dap_bp.line);
                    existing.actual_column.set(dap_bp.column);
                    existing.message.set(dap_bp.message.clone());
                } else {
                    self.debugger.breakpoint_bindings.push(BreakpointBinding {
                        uri: crate::graph::Uri::root().child("breakpoint_binding", &binding_key),
                        breakpoint_id: bp_id.clone(),
                        session_id: session_id.clone(),
                        adapter_id: Signal::new(dap_bp.id),
                        verified: Signal::new(true),
                        actual_line: Signal::new(dap_bp.line),
                        actual_column: Signal::new(dap_bp.column),
                        message: Signal::new(dap_bp.message.clone()),
                        hit: Signal::new(false),
                    });
                }
                processed.insert(bp_id.clone());
            } else {
                self.debugger.breakpoint_bindings.remove(&binding_key);
                warn!(
                    bp_id,
                    session = %session_id,
                    message = dap_bp.message.as_deref().unwrap_or(""),
                    "breakpoint verification failed"
                );
            }
        }

        for bp_id in existing.keys() {
            if !processed.contains(bp_id) {
                self.debugger
                    .breakpoint_bindings
                    .remove(&format!("{bp_id}:{session_id}"));
            }
        }
    }

    /// Wire hit mapping and cross-session cancellation for one session
    /// (§4.8). Call once per session, alongside `Debugger::add_session`.
    pub async fn wire_session(self: &Arc<Self>, session: &Session) {
        let client = session.runtime.client().clone();
        let session_id = session.runtime.id().to_string();

        {
            let engine = Arc::clone(self);
            let session_id = session_id.clone();
            client
                .on_event("stopped", move |ev| {
                    let Some(body) = ev.body else { return };
                    let reason = body.get("reason").and_then(|v| v.as_str()).unwrap_or("");
                    if reason != "breakpoint" && reason != "exception" {
                        return;
                    }
                    engine.clear_hits(&session_id);
                    let hit_ids: Vec<i64> = body
                        .get("hitBreakpointIds")
                        .and_then(|v| v.as_array())
                        .map(|a| a.iter().filter_map(|x| x.as_i64()).collect())
                        .unwrap_or_default();
                    if hit_ids.is_empty() {
                        return;
                    }
                    engine.mark_hits(&session_id, &hit_ids);
                })
                .await;
        }

        {
            let engine = Arc::clone(self);
            let session_id = session_id.clone();
            client
                .on_event("continued", move |_ev| engine.clear_hits(&session_id))
                .await;
        }

        {
            let engine = Arc::clone(self);
            let session_id = session_id.clone();
            client
                .on_event("breakpoint", move |ev| {
                    let Some(body) = ev.body else { return };
                    let Some(raw) = body.get("breakpoint").cloned() else {
                        return;
                    };
                    let Ok(dap_bp) = serde_json::from_value::<crate::protocol::types::Breakpoint>(raw)
                    else {
                        return;
                    };
                    let reason = body.get("reason").and_then(|v| v.as_str()).unwrap_or("");
                    engine.apply_adapter_breakpoint_event(&session_id, reason, &dap_bp);
                })
                .await;
        }

        {
            let engine = Arc::clone(self);
            let session_id = session_id.clone();
            client
                .on_event("terminated", move |_ev| engine.cancel_session(&session_id))
                .await;
        }
        {
            let engine = Arc::clone(self);
            let session_id = session_id.clone();
            client
                .on_event("exited", move |_ev| engine.cancel_session(&session_id))
                .await;
        }
    }

    fn clear_hits(&self, session_id: &str) {
        for binding in self.debugger.breakpoint_bindings.iter() {
            if binding.session_id == session_id {
                binding.hit.set(false);
            }
        }
    }

    fn mark_hits(&self, session_id: &str, adapter_ids: &[i64]) {
        for binding in self.debugger.breakpoint_bindings.iter() {
            if binding.session_id != session_id {
                continue;
            }
            if let Some(adapter_id) = binding.adapter_id.get() {
                if adapter_ids.contains(&adapter_id) {
                    binding.hit.set(true);
                }
            }
        }
    }

    /// External polyfill entry point (§4.8: "adapters that omit
    /// `hitBreakpointIds` are handled by an external polyfill that matches
    /// by (source, line) of the top frame"). Call once the top frame of a
    /// `stopped` thread is known.
    pub fn apply_hit_polyfill(&self, session_id: &str, source_path: &str, line: i64) {
        let matching: Vec<String> = self
            .debugger
            .breakpoints
            .iter()
            .into_iter()
            .filter(|b| b.source_path == source_path && b.line == line)
            .map(|b| b.id)
            .collect();
        for binding in self.debugger.breakpoint_bindings.iter() {
            if binding.session_id == session_id && matching.contains(&binding.breakpoint_id) {
                binding.hit.set(true);
            }
        }
    }

    fn apply_adapter_breakpoint_event(
        &self,
        session_id: &str,
        reason: &str,
        dap_bp: &crate::protocol::types::Breakpoint,
    ) {
        let Some(adapter_id) = dap_bp.id else { return };
        let Some(binding) = self.debugger.breakpoint_bindings.iter().into_iter().find(|b| {
            b.session_id == session_id && b.adapter_id.get() == Some(adapter_id)
        }) else {
            return;
        };
        if reason == "removed" {
            self.debugger
                .breakpoint_bindings
                .remove(&format!("{}:{}", binding.breakpoint_id, session_id));
            return;
        }
        binding.verified.set(dap_bp.verified);
        binding.actual_line.set(dap_bp.line);
        binding.actual_column.set(dap_bp.column);
        binding.message.set(dap_bp.message.clone());
    }

    /// §4.8 "cancel all pending syncs keyed to that session... destroy all
    /// its bindings".
    fn cancel_session(&self, session_id: &str) {
        self.pending.lock().retain(|(sid, _)| sid != session_id);
        let stale: Vec<String> = self
            .debugger
            .breakpoint_bindings
            .iter()
            .into_iter()
            .filter(|b| b.session_id == session_id)
            .map(|b| b.key())
            .collect();
        for key in stale {
            self.debugger.breakpoint_bindings.remove(&key);
        }
    }
}

/// Default implementation of §4.8's DAP `source.identifier`: path if
/// present, else `ref:<sourceReference>`.
pub fn source_identifier(source: &crate::graph::SourceBinding) -> String {
    match &source.source.id {
        SourceId::Path(p) => p.clone(),
        SourceId::Reference(r) => format!("ref:{r}"),
    }
}

pub type BreakpointResult<T> = Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::Scheduler;

    #[test]
    fn adding_the_same_location_twice_returns_the_same_breakpoint() {
        let debugger = Debugger::new();
        let engine = BreakpointEngine::new(debugger, Scheduler::new());
        let a = engine.add_breakpoint("main.rs", 10, None, BreakpointOptions::default());
        let b = engine.add_breakpoint("main.rs", 10, None, BreakpointOptions::default());
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn toggle_adds_then_removes() {
        let debugger = Debugger::new();
        let engine = BreakpointEngine::new(debugger.clone(), Scheduler::new());
        assert!(engine.toggle_breakpoint("main.rs", 5, None).is_some());
        assert_eq!(debugger.breakpoints.len(), 1);
        assert!(engine.toggle_breakpoint("main.rs", 5, None).is_none());
        assert_eq!(debugger.breakpoints.len(), 0);
    }

    mod integration_tests {
        use super::*;
        use crate::graph::{Source, SourceBinding};
        use crate::protocol::Client;
        use crate::session_runtime::SessionRuntime;
        use crate::test_util::{fake_pair, FakeAdapter};
        use std::time::Duration;

        async fn fake_session(debugger: &Arc<Debugger>, source_path: &str) -> (Session, FakeAdapter) {
            let (transport, adapter) = fake_pair();
            let scheduler = Scheduler::new();
            let client = Client::new(transport, &scheduler);
            let runtime = SessionRuntime::new_for_test(client, scheduler).await;
            let session = debugger.add_session(runtime).await;
            session.sources.push(SourceBinding {
                uri: session.uri.child("source", source_path),
                source: Source {
                    id: SourceId::Path(source_path.to_string()),
                    name: Signal::new(None),
                    path: Signal::new(Some(source_path.to_string())),
                    source_reference: Signal::new(None),
                },
            });
            (session, adapter)
        }

        #[tokio::test]
        async fn rapid_adds_to_the_same_source_coalesce_into_one_set_breakpoints_call() {
            let debugger = Debugger::new();
            let engine = BreakpointEngine::new(debugger.clone(), Scheduler::new());
            let (session, adapter) = fake_session(&debugger, "main.rs").await;
            engine.wire_session(&session).await;

            for line in 1..=10 {
                engine.add_breakpoint("main.rs", line, None, BreakpointOptions::default());
            }

            let req = tokio::time::timeout(Duration::from_millis(500), adapter.recv_request())
                .await
                .expect("expected exactly one setBreakpoints request within the batch window");
            assert_eq!(req.command, "setBreakpoints");
            let args = req.arguments.unwrap();
            assert_eq!(args["breakpoints"].as_array().unwrap().len(), 10);

            // No second call should follow for the same batch of adds.
            tokio::time::sleep(Duration::from_millis(100)).await;
            assert!(adapter.try_recv_all().is_empty());

            adapter.reply(
                &req,
                true,
                Some(serde_json::json!({"breakpoints": (1..=10).map(|l| serde_json::json!({
                    "verified": true, "line": l, "id": l,
                })).collect::<Vec<_>>()})),
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert_eq!(debugger.breakpoint_bindings.len(), 10);
        }

        #[tokio::test]
        async fn a_hit_breakpoint_event_marks_its_binding_hit() {
            let debugger = Debugger::new();
            let engine = BreakpointEngine::new(debugger.clone(), Scheduler::new());
            let (session, adapter) = fake_session(&debugger, "main.rs").await;
            engine.wire_session(&session).await;

            let bp = engine.add_breakpoint("main.rs", 3, None, BreakpointOptions::default());
            let req = adapter.recv_request().await;
            adapter.reply(
                &req,
                true,
                Some(serde_json::json!({"breakpoints": [{"verified": true, "line": 3, "id": 42}]})),
            );
            tokio::time::sleep(Duration::from_millis(20)).await;

            let binding = debugger
                .breakpoint_bindings
                .get(&format!("{}:{}", bp.id, session.runtime.id()))
                .unwrap();
            assert!(!binding.hit.get());

            adapter.send_event(
                "stopped",
                Some(serde_json::json!({"reason": "breakpoint", "threadId": 1, "hitBreakpointIds": [42]})),
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(binding.hit.get());
        }

        #[tokio::test]
        async fn a_terminated_event_tears_down_that_sessions_bindings_even_with_a_sync_still_in_flight() {
            let debugger = Debugger::new();
            let engine = BreakpointEngine::new(debugger.clone(), Scheduler::new());
            let (session, adapter) = fake_session(&debugger, "main.rs").await;
            engine.wire_session(&session).await;

            let bp = engine.add_breakpoint("main.rs", 3, None, BreakpointOptions::default());
            let req = adapter.recv_request().await;
            adapter.reply(
                &req,
                true,
                Some(serde_json::json!({"breakpoints": [{"verified": true, "line": 3, "id": 42}]})),
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
            let binding_key = format!("{}:{}", bp.id, session.runtime.id());
            assert!(debugger.breakpoint_bindings.get(&binding_key).is_some());

            // A second add starts a fresh 50ms coalescing window, then the
            // session ends before that window elapses. The already-scheduled
            // sync still fires and sends its `setBreakpoints` request (the
            // coalescing window itself isn't aborted), but `cancel_session`
            // destroys the session's bindings immediately, and since nothing
            // replies to that stray request it never gets a chance to
            // resurrect them.
            engine.add_breakpoint("main.rs", 9, None, BreakpointOptions::default());
            adapter.send_event("terminated", None);
            tokio::time::sleep(Duration::from_millis(20)).await;

            assert!(
                debugger.breakpoint_bindings.get(&binding_key).is_none(),
                "terminated session's bindings must be torn down, not left stale"
            );

            let req = tokio::time::timeout(Duration::from_millis(200), adapter.recv_request())
                .await
                .expect("the already-scheduled sync still sends its setBreakpoints request");
            assert_eq!(req.command, "setBreakpoints");

            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(
                debugger.breakpoint_bindings.get(&binding_key).is_none(),
                "an unanswered stray sync must not resurrect a terminated session's bindings"
            );
        }
    }
}
