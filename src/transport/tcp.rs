use super::framing::Framing;
use super::Transport;
use crate::error::{Error, Result};
use crate::protocol::types::Message;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

/// §4.1 "tcp" variant: connect to (host, port) with retry (default 5
/// attempts, 100ms backoff) on connection refused; overall connect timeout
/// 5s. Grounded on the teacher's `dap/socket_helper.rs::connect_with_retry`.
pub struct TcpTransport {
    framing: Framing<OwnedReadHalf, OwnedWriteHalf>,
}

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

impl TcpTransport {
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_timeout(host, port, DEFAULT_CONNECT_TIMEOUT).await
    }

    pub async fn connect_with_timeout(host: &str, port: u16, timeout: Duration) -> Result<Self> {
        let stream = connect_with_retry(host, port, timeout).await?;
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            framing: Framing::new(read, write),
        }
    }
}

/// Retries connecting until `timeout` elapses, sleeping `RETRY_INTERVAL`
/// between attempts — "connection refused" while the adapter process is
/// still binding its listening socket is expected, not fatal.
pub async fn connect_with_retry(host: &str, port: u16, timeout: Duration) -> Result<TcpStream> {
    let start = std::time::Instant::now();
    loop {
        match TcpStream::connect((host, port)).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                if start.elapsed() >= timeout {
                    return Err(Error::Transport(format!(
                        "failed to connect to {host}:{port} after {timeout:?}: {e}"
                    )));
                }
                tokio::time::sleep(RETRY_INTERVAL).await;
            }
        }
    }
}

/// Finds a free TCP port on localhost, for adapters that need one handed to
/// them up front rather than self-reporting one.
pub fn find_free_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")
        .map_err(|e| Error::Transport(format!("failed to bind to a free port: {e}")))?;
    Ok(listener
        .local_addr()
        .map_err(|e| Error::Transport(format!("failed to read bound local address: {e}")))?
        .port())
}

#[async_trait]
impl Transport for TcpTransport {
    async fn read_message(&self) -> Result<Message> {
        self.framing.read_message().await
    }

    async fn write_message(&self, msg: &Message) -> Result<()> {
        self.framing.write_message(msg).await
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn connect_with_retry_succeeds_once_the_listener_is_up() {
        let port = find_free_port().unwrap();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            let _ = listener.accept().await;
        });

        let result = connect_with_retry("127.0.0.1", port, Duration::from_secs(2)).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn connect_with_retry_times_out_against_nothing_listening() {
        let port = find_free_port().unwrap();
        let result = connect_with_retry("127.0.0.1", port, Duration::from_millis(300)).await;
        assert!(matches!(result, Err(Error::Transport(_))));
    }
}
