use crate::error::{Error, Result};
use crate::protocol::types::Message;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

/// Shared `Content-Length`-framing state machine used by the stdio and TCP
/// transports (§4.1: "the read loop is a state machine: parse header, then
/// exact-length body, emit message, repeat").
///
/// Generic over the reader/writer halves so it can wrap a child process's
/// piped stdin/stdout or a split `TcpStream` identically. The reader and
/// writer are each behind their own lock so a concurrent read and write
/// never block each other — only concurrent reads (or concurrent writes)
/// serialize, which this crate's single reader task / single writer task
/// split never triggers.
pub struct Framing<R, W> {
    reader: Mutex<BufReader<R>>,
    writer: Mutex<W>,
}

impl<R, W> Framing<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(BufReader::new(reader)),
            writer: Mutex::new(writer),
        }
    }

    /// Read one frame: headers up to the blank line, then exactly
    /// `Content-Length` bytes of UTF-8 JSON.
    pub async fn read_message(&self) -> Result<Message> {
        let mut reader = self.reader.lock().await;

        let mut headers = String::new();
        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(Error::Transport("transport closed".to_string()));
            }
            if line == "\r\n" || line == "\n" {
                break;
            }
            headers.push_str(&line);
        }

        let content_length = headers
            .lines()
            .find(|line| line.to_ascii_lowercase().starts_with("content-length:"))
            .and_then(|line| line.split(':').nth(1))
            .and_then(|s| s.trim().parse::<usize>().ok())
            .ok_or_else(|| Error::Protocol("missing Content-Length header".to_string()))?;

        let mut buffer = vec![0u8; content_length];
        reader.read_exact(&mut buffer).await?;

        let content = String::from_utf8(buffer)
            .map_err(|e| Error::Protocol(format!("invalid UTF-8 in message body: {e}")))?;

        let msg: Message = serde_json::from_str(&content)
            .map_err(|e| Error::Protocol(format!("failed to parse DAP message: {e}")))?;

        Ok(msg)
    }

    pub async fn write_message(&self, msg: &Message) -> Result<()> {
        let content = serde_json::to_string(msg)
            .map_err(|e| Error::Protocol(format!("failed to serialize DAP message: {e}")))?;

        let header = format!("Content-Length: {}\r\n\r\n", content.len());

        let mut writer = self.writer.lock().await;
        writer.write_all(header.as_bytes()).await?;
        writer.write_all(content.as_bytes()).await?;
        writer.flush().await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::types::{Event, Request};
    use tokio::io::duplex;

    #[tokio::test]
    async fn round_trips_a_request_through_an_in_memory_pipe() {
        let (client, server) = duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let client_framing = Framing::new(client_r, client_w);
        let server_framing = Framing::new(server_r, server_w);

        let req = Message::Request(Request {
            seq: 1,
            command: "initialize".to_string(),
            arguments: None,
        });

        client_framing.write_message(&req).await.unwrap();
        let received = server_framing.read_message().await.unwrap();

        match received {
            Message::Request(r) => assert_eq!(r.command, "initialize"),
            _ => panic!("expected Request"),
        }
    }

    #[tokio::test]
    async fn rejects_a_body_missing_content_length() {
        let (client, server) = duplex(4096);
        let (_client_r, mut client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        client_w.write_all(b"X-Custom: yes\r\n\r\n").await.unwrap();

        let framing = Framing::new(server_r, server_w);
        let err = framing.read_message().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn surfaces_closed_transport_as_an_error() {
        let (client, server) = duplex(4096);
        drop(client);
        let (server_r, server_w) = tokio::io::split(server);
        let framing = Framing::new(server_r, server_w);
        let err = framing.read_message().await.unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
    }

    #[tokio::test]
    async fn round_trips_an_event() {
        let (client, server) = duplex(4096);
        let (client_r, client_w) = tokio::io::split(client);
        let (server_r, server_w) = tokio::io::split(server);

        let client_framing = Framing::new(client_r, client_w);
        let server_framing = Framing::new(server_r, server_w);

        let evt = Message::Event(Event {
            seq: 7,
            event: "stopped".to_string(),
            body: Some(serde_json::json!({"reason": "breakpoint", "threadId": 1})),
        });

        client_framing.write_message(&evt).await.unwrap();
        match server_framing.read_message().await.unwrap() {
            Message::Event(e) => assert_eq!(e.event, "stopped"),
            _ => panic!("expected Event"),
        }
    }
}
