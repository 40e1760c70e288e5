//! IPC protocol between a secondary invocation and the primary instance
//!
//! Newline-delimited text over TCP on 127.0.0.1. The client sends exactly one
//! command line and the primary answers with exactly one response line, then
//! closes the connection.
//!
//! Commands (verb is case-insensitive, the rest of the line is the argument):
//!
//! ```text
//! connect [profile name]
//! select <profile name>
//! disconnect
//! list-profiles
//! status
//! ping
//! quit
//! ```
//!
//! Responses:
//!
//! ```text
//! OK: <message>
//! PROFILES: <name>\t<name>...
//! ERROR: <message>
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::IpcError;

/// Host used for the IPC listener; never exposed beyond loopback
pub const IPC_HOST: &str = "127.0.0.1";

/// Maximum accepted length of a command line
pub const MAX_LINE_LEN: usize = 4096;

/// Maximum accepted length of a response line
///
/// A `PROFILES:` response grows with the store, so this is far above
/// [`MAX_LINE_LEN`].
pub const MAX_RESPONSE_LEN: usize = 1024 * 1024;

/// Separator between names in a `PROFILES:` response
const PROFILE_SEPARATOR: char = '\t';

/// Get the IPC address for a port
pub fn ipc_address(port: u16) -> String {
    format!("{}:{}", IPC_HOST, port)
}

/// Command sent to the primary instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcCommand {
    /// Connect presence with a profile (`None` = last used profile)
    Connect { profile: Option<String> },
    /// Remember a profile as the current one without connecting
    Select { profile: String },
    /// Clear presence and close the connection
    Disconnect,
    /// List profile names from the store
    ListProfiles,
    /// Report the instance's connection state
    Status,
    /// Liveness check
    Ping,
    /// Shut the primary down
    Quit,
}

impl IpcCommand {
    /// Render as a wire line including the trailing newline
    pub fn to_line(&self) -> String {
        let mut line = self.to_string();
        line.push('\n');
        line
    }
}

impl fmt::Display for IpcCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpcCommand::Connect { profile: Some(name) } => write!(f, "connect {}", name),
            IpcCommand::Connect { profile: None } => write!(f, "connect"),
            IpcCommand::Select { profile } => write!(f, "select {}", profile),
            IpcCommand::Disconnect => write!(f, "disconnect"),
            IpcCommand::ListProfiles => write!(f, "list-profiles"),
            IpcCommand::Status => write!(f, "status"),
            IpcCommand::Ping => write!(f, "ping"),
            IpcCommand::Quit => write!(f, "quit"),
        }
    }
}

impl FromStr for IpcCommand {
    type Err = IpcError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.is_empty() {
            return Err(IpcError::Malformed("empty command".to_string()));
        }
        if line.len() > MAX_LINE_LEN {
            return Err(IpcError::Malformed("command too long".to_string()));
        }
        if line.chars().any(|c| c.is_control()) {
            return Err(IpcError::Malformed(
                "command contains control characters".to_string(),
            ));
        }

        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };
        let argument = (!rest.is_empty()).then(|| rest.to_string());

        let has_argument = argument.is_some();
        let no_argument = |command: IpcCommand| {
            if has_argument {
                Err(IpcError::Malformed(format!(
                    "'{}' takes no argument",
                    verb.to_ascii_lowercase()
                )))
            } else {
                Ok(command)
            }
        };

        match verb.to_ascii_lowercase().as_str() {
            "connect" => Ok(IpcCommand::Connect { profile: argument }),
            "select" => argument
                .map(|profile| IpcCommand::Select { profile })
                .ok_or_else(|| IpcError::Malformed("'select' needs a profile name".to_string())),
            "disconnect" => no_argument(IpcCommand::Disconnect),
            "list-profiles" | "list" => no_argument(IpcCommand::ListProfiles),
            "status" => no_argument(IpcCommand::Status),
            "ping" => no_argument(IpcCommand::Ping),
            "quit" => no_argument(IpcCommand::Quit),
            _ => Err(IpcError::UnknownCommand(verb.to_string())),
        }
    }
}

/// Response from the primary instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IpcResponse {
    /// Command applied
    Ok { message: String },
    /// Profile names, sorted
    Profiles { names: Vec<String> },
    /// Command rejected or failed
    Error { message: String },
}

impl IpcResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        IpcResponse::Ok {
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        IpcResponse::Error {
            message: message.into(),
        }
    }

    /// Whether the command succeeded
    pub fn is_success(&self) -> bool {
        !matches!(self, IpcResponse::Error { .. })
    }

    /// Render as a wire line including the trailing newline
    pub fn to_line(&self) -> String {
        let mut line = self.to_string();
        line.push('\n');
        line
    }
}

impl fmt::Display for IpcResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Messages are single-line on the wire
        let flatten = |s: &str| s.replace(['\r', '\n'], " ");
        match self {
            IpcResponse::Ok { message } => write!(f, "OK: {}", flatten(message)),
            IpcResponse::Profiles { names } => {
                let joined = names
                    .iter()
                    .map(|n| flatten(n).replace(PROFILE_SEPARATOR, " "))
                    .collect::<Vec<_>>()
                    .join(&PROFILE_SEPARATOR.to_string());
                if joined.is_empty() {
                    write!(f, "PROFILES:")
                } else {
                    write!(f, "PROFILES: {}", joined)
                }
            }
            IpcResponse::Error { message } => write!(f, "ERROR: {}", flatten(message)),
        }
    }
}

impl FromStr for IpcResponse {
    type Err = IpcError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (tag, body) = line
            .split_once(':')
            .ok_or_else(|| IpcError::InvalidResponse(line.to_string()))?;
        let body = body.strip_prefix(' ').unwrap_or(body);

        match tag {
            "OK" => Ok(IpcResponse::ok(body)),
            "ERROR" => Ok(IpcResponse::error(body)),
            "PROFILES" => {
                let names = if body.is_empty() {
                    Vec::new()
                } else {
                    body.split(PROFILE_SEPARATOR).map(str::to_string).collect()
                };
                Ok(IpcResponse::Profiles { names })
            }
            _ => Err(IpcError::InvalidResponse(line.to_string())),
        }
    }
}

impl From<IpcError> for IpcResponse {
    fn from(err: IpcError) -> Self {
        IpcResponse::error(err.to_string())
    }
}
