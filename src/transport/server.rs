use super::tcp::TcpTransport;
use super::Transport;
use crate::error::{Error, Result};
use crate::protocol::types::Message;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex as AsyncMutex;

pub const DEFAULT_PORT_DETECT_TIMEOUT: Duration = Duration::from_secs(10);

/// A predicate over a line of adapter stdout that reports a listening port
/// once the adapter has bound one, per §4.1's `detect_port(chunk) ->
/// (port?, host?)`.
pub type DetectPort = Arc<dyn Fn(&str) -> Option<(u16, Option<String>)> + Send + Sync>;

/// The spawned adapter process behind a "server" transport, shared across
/// sibling child sessions created via `startDebugging` (§4.3) and torn down
/// when the last sibling disconnects.
///
/// Grounded on `dap/multi_connection_listener.rs`'s shared-listener-across-
/// children shape, generalized from vscode-js-debug's specific multi-
/// connection protocol to the generic server-adapter contract of §4.1.
pub struct ServerProcess {
    child: AsyncMutex<Child>,
    refcount: AtomicUsize,
    pub host: String,
    pub port: u16,
}

impl ServerProcess {
    pub async fn spawn(
        command: &str,
        args: &[String],
        detect_port: DetectPort,
        timeout: Duration,
    ) -> Result<Arc<Self>> {
        let mut child = tokio::process::Command::new(command)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Transport(format!("failed to spawn server adapter: {e}")))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Transport("child has no stdout".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::warn!(target: "dapcore::adapter_stderr", "{line}");
                }
            });
        }

        let (port, host) = tokio::time::timeout(timeout, Self::watch_for_port(stdout, detect_port))
            .await
            .map_err(|_| Error::Timeout {
                command: "server port detection".to_string(),
                elapsed_ms: timeout.as_millis() as u64,
            })??;

        Ok(Arc::new(Self {
            child: AsyncMutex::new(child),
            refcount: AtomicUsize::new(0),
            host: host.unwrap_or_else(|| "127.0.0.1".to_string()),
            port,
        }))
    }

    async fn watch_for_port(
        stdout: tokio::process::ChildStdout,
        detect_port: DetectPort,
    ) -> Result<(u16, Option<String>)> {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    tracing::debug!(target: "dapcore::adapter_stdout", "{line}");
                    if let Some((port, host)) = detect_port(&line) {
                        return Ok((port, host));
                    }
                }
                Ok(None) => {
                    return Err(Error::Transport(
                        "server adapter closed stdout before reporting a port".to_string(),
                    ))
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// A new sibling session is about to connect; bump the refcount so the
    /// process survives until every sibling has disconnected.
    pub fn acquire(self: &Arc<Self>) {
        self.refcount.fetch_add(1, Ordering::SeqCst);
    }

    /// A sibling session has disconnected. Kills the adapter process once
    /// the active-connection count reaches zero (§4.1).
    pub async fn release(self: &Arc<Self>) {
        if self.refcount.fetch_sub(1, Ordering::SeqCst) == 1 {
            let mut child = self.child.lock().await;
            let _ = child.start_kill();
        }
    }
}

/// A TCP transport to a shared server adapter process. Each sibling session
/// holds one of these; dropping it (via `close`) releases the shared
/// process.
pub struct ServerTransport {
    tcp: TcpTransport,
    process: Arc<ServerProcess>,
    released: AtomicBool,
}

impl ServerTransport {
    pub async fn connect(process: Arc<ServerProcess>, timeout: Duration) -> Result<Self> {
        process.acquire();
        let tcp = TcpTransport::connect_with_timeout(&process.host, process.port, timeout).await?;
        Ok(Self {
            tcp,
            process,
            released: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for ServerTransport {
    async fn read_message(&self) -> Result<Message> {
        self.tcp.read_message().await
    }

    async fn write_message(&self, msg: &Message) -> Result<()> {
        self.tcp.write_message(msg).await
    }

    async fn close(&self) -> Result<()> {
        self.tcp.close().await?;
        if !self.released.swap(true, Ordering::SeqCst) {
            self.process.release().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn watch_for_port_extracts_a_port_reported_on_stdout() {
        let (read, mut write) = tokio::io::duplex(4096);
        let detect: DetectPort = Arc::new(|line: &str| {
            line.strip_prefix("Listening on port ")
                .and_then(|s| s.trim().parse::<u16>().ok())
                .map(|p| (p, None))
        });

        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            write.write_all(b"starting up\n").await.unwrap();
            write.write_all(b"Listening on port 9229\n").await.unwrap();
        });

        // ChildStdout can't be constructed directly in a unit test; exercise
        // the line-scanning logic against the same BufReader the real path
        // uses by reimplementing the loop body against the duplex pipe.
        let mut lines = tokio::io::BufReader::new(read).lines();
        use tokio::io::AsyncBufReadExt;
        let mut found = None;
        while let Some(line) = lines.next_line().await.unwrap() {
            if let Some(hit) = detect(&line) {
                found = Some(hit);
                break;
            }
        }
        assert_eq!(found, Some((9229, None)));
    }
}
