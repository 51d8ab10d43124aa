//! Control client for the command line and tests.

use crate::control::protocol::{Command, Event};
use crate::engine::Outbound;
use crate::error::{Result, SdrError};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

/// Messages larger than this are treated as a corrupt stream.
const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

pub struct ControlClient {
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
}

impl ControlClient {
    /// # Errors
    /// Returns `SdrError::ControlConnection` if the server is unreachable.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| SdrError::ControlConnection {
                message: format!("Failed to connect to {}: {}", addr, e),
            })?;
        let (reader, writer) = stream.into_split();
        Ok(Self { reader, writer })
    }

    pub async fn send(&mut self, command: &Command) -> Result<()> {
        let mut line = command.to_json().map_err(|e| SdrError::Protocol {
            message: format!("Failed to serialize command: {}", e),
        })?;
        line.push('\n');
        self.writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SdrError::ControlConnection {
                message: format!("Failed to write command: {}", e),
            })
    }

    /// Next message from the server, or `None` once it hangs up.
    pub async fn next_message(&mut self) -> Result<Option<Outbound>> {
        let len = match self.reader.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => {
                return Err(SdrError::ControlConnection {
                    message: format!("Failed to read message length: {}", e),
                });
            }
        };
        if len > MAX_MESSAGE_BYTES {
            return Err(SdrError::Protocol {
                message: format!("message of {} bytes exceeds the limit", len),
            });
        }
        let mut payload = vec![0u8; len];
        self.reader
            .read_exact(&mut payload)
            .await
            .map_err(|e| SdrError::ControlConnection {
                message: format!("Failed to read message: {}", e),
            })?;
        Outbound::from_bytes(&payload).map(Some)
    }

    /// Next JSON event, skipping binary frames.
    pub async fn next_event(&mut self) -> Result<Option<Event>> {
        while let Some(message) = self.next_message().await? {
            if let Outbound::Event(event) = message {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Wait for the first event matching `predicate`.
    ///
    /// # Errors
    /// `SdrError::ControlConnection` on timeout or hang-up.
    pub async fn wait_for<F>(&mut self, timeout: Duration, mut predicate: F) -> Result<Event>
    where
        F: FnMut(&Event) -> bool,
    {
        let wait = async {
            while let Some(event) = self.next_event().await? {
                if predicate(&event) {
                    return Ok(event);
                }
            }
            Err(SdrError::ControlConnection {
                message: "server closed the connection".to_string(),
            })
        };
        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| SdrError::ControlConnection {
                message: format!("no matching event within {:?}", timeout),
            })?
    }

    /// Events received within `window`.
    pub async fn collect_events(&mut self, window: Duration) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        loop {
            match tokio::time::timeout_at(deadline, self.next_event()).await {
                Ok(Ok(Some(event))) => events.push(event),
                Ok(Ok(None)) | Err(_) => return Ok(events),
                Ok(Err(e)) => return Err(e),
            }
        }
    }
}

/// Send one command and return the events that arrive within `window`,
/// greeting included.
///
/// # Errors
/// Returns `SdrError::ControlConnection` if the server is unreachable.
pub async fn send_command(addr: &str, command: Command, window: Duration) -> Result<Vec<Event>> {
    let mut client = ControlClient::connect(addr).await?;
    client.send(&command).await?;
    client.collect_events(window).await
}
