//! IPC client used by secondary invocations
//!
//! Opens one connection per command: send the command line, read one
//! response line, done. Both the connect and the wait for the response are
//! bounded so a wedged primary can never hang the caller.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crpc_core::ipc::{ipc_address, MAX_RESPONSE_LEN};
use crpc_core::{IpcCommand, IpcError, IpcResponse, Settings};

/// Client for the primary instance's IPC listener
#[derive(Debug, Clone)]
pub struct IpcClient {
    port: u16,
    connect_timeout: Duration,
    response_timeout: Duration,
}

impl IpcClient {
    /// Client for `port` with the default timeouts
    pub fn new(port: u16) -> Self {
        let defaults = Settings::default();
        Self {
            port,
            connect_timeout: defaults.connect_timeout,
            response_timeout: defaults.response_timeout,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    /// Send one command and wait for its response
    pub async fn send(&self, command: &IpcCommand) -> Result<IpcResponse, IpcError> {
        let address = ipc_address(self.port);
        tracing::debug!("Sending '{}' to {}", command, address);

        let stream = match timeout(self.connect_timeout, TcpStream::connect(&address)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => {
                return Err(IpcError::Connect {
                    port: self.port,
                    source,
                })
            }
            Err(_) => {
                return Err(IpcError::Timeout {
                    port: self.port,
                    after: self.connect_timeout,
                })
            }
        };

        let exchange = async {
            let (reader, mut writer) = stream.into_split();
            writer.write_all(command.to_line().as_bytes()).await?;
            writer.flush().await?;

            let mut reader = BufReader::new(reader).take(MAX_RESPONSE_LEN as u64);
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            Ok::<_, std::io::Error>(line)
        };

        let line = timeout(self.response_timeout, exchange)
            .await
            .map_err(|_| IpcError::Timeout {
                port: self.port,
                after: self.response_timeout,
            })??;

        if line.is_empty() {
            return Err(IpcError::InvalidResponse(
                "connection closed without a response".to_string(),
            ));
        }
        if !line.ends_with('\n') {
            let reason = if line.len() >= MAX_RESPONSE_LEN {
                "response too long"
            } else {
                "connection closed mid-response"
            };
            return Err(IpcError::InvalidResponse(reason.to_string()));
        }

        let response: IpcResponse = line.parse()?;
        tracing::debug!("Response: {}", response);
        Ok(response)
    }
}
