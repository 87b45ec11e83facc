use super::framing::Framing;
use super::Transport;
use crate::error::{Error, Result};
use crate::protocol::types::Message;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout};
use tokio::sync::Mutex as AsyncMutex;

/// Spawns a child process and speaks DAP over its stdin/stdout, the way the
/// teacher's `DapClient::spawn`/`DapTransport` pair does for debugpy. Stderr
/// is drained into `tracing` rather than discarded (§4.1: "stderr is
/// surfaced to diagnostics").
pub struct StdioTransport {
    framing: Framing<BufReader<ChildStdout>, ChildStdin>,
    child: AsyncMutex<Child>,
}

impl StdioTransport {
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self> {
        Self::spawn_with(command, args, None, None)
    }

    pub fn spawn_with(
        command: &str,
        args: &[String],
        cwd: Option<&str>,
        env: Option<&[(String, String)]>,
    ) -> Result<Self> {
        let mut cmd = tokio::process::Command::new(command);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            cmd.current_dir(cwd);
        }
        if let Some(env) = env {
            cmd.envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to spawn debug adapter: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Transport("child has no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("child has no stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(Self::drain_stderr(stderr));
        }

        Ok(Self {
            framing: Framing::new(BufReader::new(stdout), stdin),
            child: AsyncMutex::new(child),
        })
    }

    async fn drain_stderr(stderr: tokio::process::ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            tracing::warn!(target: "dapcore::adapter_stderr", "{line}");
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn read_message(&self) -> Result<Message> {
        self.framing.read_message().await
    }

    async fn write_message(&self, msg: &Message) -> Result<()> {
        self.framing.write_message(msg).await
    }

    async fn close(&self) -> Result<()> {
        let _ = self.child.lock().await.start_kill();
        Ok(())
    }
}
