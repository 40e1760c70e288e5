//! IPC server implementation
//!
//! Listens on localhost TCP for commands from secondary invocations.
//! Connections are served one at a time, so commands are applied in the
//! order they arrive.

use std::io;
use std::time::Duration;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crpc_core::ipc::MAX_LINE_LEN;
use crpc_core::{IpcCommand, IpcError, IpcResponse, Settings};

use crate::dispatch::dispatch_shared;
use crate::state::SharedState;

/// IPC server for secondary invocations
///
/// Accepts connections from loopback addresses only.
pub struct IpcServer {
    state: SharedState,
    shutdown: CancellationToken,
    /// How long a client may take to send its command
    read_timeout: Duration,
}

impl IpcServer {
    /// Create a new IPC server
    pub fn new(state: SharedState, shutdown: CancellationToken) -> Self {
        Self {
            state,
            shutdown,
            read_timeout: Settings::default().read_timeout,
        }
    }

    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Serve commands until the shutdown token is cancelled
    ///
    /// The listener is dropped on return, releasing the port.
    pub async fn run(&self, listener: TcpListener) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("IPC server listening on {}", addr);
        }

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    tracing::info!("IPC server shutting down");
                    break;
                }

                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr)) => {
                        // Only accept connections from localhost
                        if !peer_addr.ip().is_loopback() {
                            tracing::warn!("Rejected non-localhost connection from {}", peer_addr);
                            continue;
                        }
                        if let Err(e) = self.handle_client(stream).await {
                            tracing::warn!("IPC client error: {}", e);
                        }
                    }
                    Err(e) => {
                        tracing::error!("Failed to accept IPC connection: {}", e);
                        // Usually fd exhaustion; don't spin
                        tokio::time::sleep(Duration::from_millis(100)).await;
                    }
                },
            }
        }

        Ok(())
    }

    async fn handle_client(&self, stream: TcpStream) -> io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader).take(MAX_LINE_LEN as u64);
        let mut line = String::new();

        let read = tokio::time::timeout(self.read_timeout, reader.read_line(&mut line)).await;
        let response = match read {
            Err(_) => {
                tracing::warn!("Client sent no command within {:?}", self.read_timeout);
                IpcResponse::error("timed out waiting for command")
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                IpcResponse::from(IpcError::Malformed("command is not valid UTF-8".to_string()))
            }
            Ok(Err(e)) => return Err(e),
            Ok(Ok(0)) => {
                tracing::debug!("Client closed without sending a command");
                return Ok(());
            }
            Ok(Ok(_)) if !line.ends_with('\n') && line.len() >= MAX_LINE_LEN => {
                IpcResponse::from(IpcError::Malformed("command too long".to_string()))
            }
            Ok(Ok(_)) => match line.parse::<IpcCommand>() {
                Ok(command) => {
                    tracing::info!("IPC command: {}", command);
                    dispatch_shared(&self.state, command, &self.shutdown).await
                }
                Err(e) => {
                    tracing::warn!("Rejected IPC line: {}", e);
                    IpcResponse::from(e)
                }
            },
        };

        writer.write_all(response.to_line().as_bytes()).await?;
        writer.flush().await?;
        // Best effort; the client may already be gone
        let _ = writer.shutdown().await;
        Ok(())
    }
}
