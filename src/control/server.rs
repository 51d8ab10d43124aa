//! Async TCP control server.
//!
//! Inbound: one JSON command per line. Outbound: each message is a `u32`
//! big-endian length followed by the payload (JSON event or binary frame).

use crate::control::handler::CommandHandler;
use crate::control::protocol::{Command, Event};
use crate::engine::Outbound;
use crate::error::{Result, SdrError};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;

/// State for managing server shutdown.
#[derive(Debug, Clone)]
struct ServerState {
    shutdown: Arc<Mutex<bool>>,
}

impl ServerState {
    fn new() -> Self {
        Self {
            shutdown: Arc::new(Mutex::new(false)),
        }
    }

    async fn is_shutdown(&self) -> bool {
        *self.shutdown.lock().await
    }

    async fn set_shutdown(&self) {
        *self.shutdown.lock().await = true;
    }
}

/// Control server bound to a TCP address.
pub struct ControlServer {
    listener: TcpListener,
    state: ServerState,
}

impl ControlServer {
    /// Bind the listening socket. Port 0 picks a free port.
    pub async fn bind(host: &str, port: u16) -> Result<Self> {
        let listener = TcpListener::bind((host, port))
            .await
            .map_err(|e| SdrError::ControlSocket {
                message: format!("Failed to bind {}:{}: {}", host, port, e),
            })?;
        Ok(Self {
            listener,
            state: ServerState::new(),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| SdrError::ControlSocket {
                message: format!("Failed to read local address: {}", e),
            })
    }

    /// Accept clients until [`ControlServer::stop`] is called.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        let handler = Arc::new(handler);
        log::info!("Control server listening on {}", self.local_addr()?);

        loop {
            if self.state.is_shutdown().await {
                break;
            }

            // Accept with a timeout so the shutdown flag is seen.
            let accept_result = tokio::time::timeout(
                tokio::time::Duration::from_millis(100),
                self.listener.accept(),
            )
            .await;

            match accept_result {
                Ok(Ok((stream, peer))) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        log::info!("Control client connected: {}", peer);
                        if let Err(e) = handle_client(stream, handler).await {
                            log::warn!("Control client {} dropped: {}", peer, e);
                        } else {
                            log::info!("Control client disconnected: {}", peer);
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(SdrError::ControlConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => continue,
            }
        }

        Ok(())
    }

    pub async fn stop(&self) {
        self.state.set_shutdown().await;
    }
}

/// Write one length-prefixed message.
pub(crate) async fn write_message<W>(writer: &mut W, message: &Outbound) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let payload = message.to_bytes()?;
    let len = u32::try_from(payload.len()).map_err(|_| SdrError::Protocol {
        message: format!("message of {} bytes is too large", payload.len()),
    })?;
    let written = async {
        writer.write_all(&len.to_be_bytes()).await?;
        writer.write_all(&payload).await
    };
    written.await.map_err(|e| SdrError::ControlConnection {
        message: format!("Failed to write to client: {}", e),
    })
}

async fn write_events<W>(writer: &mut W, events: Vec<Event>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for event in events {
        write_message(writer, &Outbound::Event(event)).await?;
    }
    writer
        .flush()
        .await
        .map_err(|e| SdrError::ControlConnection {
            message: format!("Failed to flush writer: {}", e),
        })
}

/// Serve one client: its commands, then its share of the broadcast feed.
async fn handle_client<H>(stream: TcpStream, handler: Arc<H>) -> Result<()>
where
    H: CommandHandler,
{
    let _ = stream.set_nodelay(true);
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    // Subscribe first so nothing published after the greeting is missed.
    let mut feed = handler.subscribe();
    write_events(&mut writer, handler.greeting()).await?;

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = line.map_err(|e| SdrError::ControlConnection {
                    message: format!("Failed to read from client: {}", e),
                })?;
                let Some(line) = line else {
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let replies = match Command::parse(&line) {
                    Ok(command) => handler.handle(command).await,
                    Err(e) => {
                        log::debug!("Rejected control line: {}", e);
                        vec![Event::from(&e)]
                    }
                };
                write_events(&mut writer, replies).await?;
            }
            message = feed.recv() => match message {
                Ok(message) => write_message(&mut writer, &message).await?,
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Control client lagging, skipped {} messages", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}
