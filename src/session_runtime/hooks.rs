//! Session hooks (§4.10): the seams a host integration fills in.
//! `SessionRuntime` calls these at the points named in §4.3/§4.10; the
//! default implementations are the teacher's own defaults generalized away
//! from its per-language hardcoding (grounded on `debug/manager.rs`'s
//! `create_session` dispatch, which this crate does not carry forward — see
//! DESIGN.md).

use crate::error::Result;
use crate::session_runtime::SessionRuntime;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Everything a host may want to observe or intercept during a session's
/// lifecycle. All methods have a default so a host only overrides what it
/// cares about.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Called once a `SessionRuntime` exists, before the handshake begins.
    async fn on_session_created(&self, _session: &Arc<SessionRuntime>) {}

    /// Called after the `initialized` event arrives and before
    /// `configurationDone` is sent — the host's chance to issue
    /// `setBreakpoints`/`setExceptionBreakpoints` first. `proceed` defaults
    /// to `true`; a hook may return `false` to abort the handshake (e.g. the
    /// host decided mid-flight not to launch after all).
    async fn before_configuration_done(&self, _session: &Arc<SessionRuntime>) -> bool {
        true
    }

    /// Called once per spawned adapter process, with an opaque handle the
    /// host may use to track/kill it directly. Most hosts ignore this; it
    /// exists for host-side process-group bookkeeping.
    async fn on_adapter_process(&self, _pid: Option<u32>) {}

    /// Reverse request: `runInTerminal`. The default spawns a detached
    /// process matching the request's `cwd`/`args`/`env` (§4.3: "the
    /// default implementation spawns a detached process").
    async fn run_in_terminal(&self, args: Value) -> Result<Value> {
        default_run_in_terminal(args).await
    }
}

pub(crate) async fn default_run_in_terminal(args: Value) -> Result<Value> {
    let cwd = args.get("cwd").and_then(|v| v.as_str()).unwrap_or(".");
    let argv: Vec<String> = args
        .get("args")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|x| x.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    if argv.is_empty() {
        return Err(crate::Error::Internal("runInTerminal: empty args".to_string()));
    }

    let mut cmd = tokio::process::Command::new(&argv[0]);
    cmd.args(&argv[1..]).current_dir(cwd).kill_on_drop(false);
    if let Some(env) = args.get("env").and_then(|v| v.as_object()) {
        for (k, v) in env {
            if let Some(v) = v.as_str() {
                cmd.env(k, v);
            }
        }
    }

    let child = cmd
        .spawn()
        .map_err(|e| crate::Error::Transport(format!("runInTerminal spawn failed: {e}")))?;

    Ok(serde_json::json!({ "processId": child.id() }))
}

/// A `SessionHooks` that accepts every handshake step and spawns processes
/// for `runInTerminal` with no further host involvement.
pub struct DefaultHooks;

#[async_trait]
impl SessionHooks for DefaultHooks {}
