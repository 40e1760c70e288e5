//! Single-instance coordination
//!
//! The first invocation to exclusively create the lock file becomes the
//! primary: it binds the IPC listener and publishes its port. Every later
//! invocation finds the lock, checks that the recorded process is alive and
//! forwards its command to the recorded port instead of starting a second
//! instance.
//!
//! # Stale state
//!
//! A lock whose process is gone (crash, SIGKILL, reboot) is stale. So is a
//! lock whose process is alive but nothing listens on the recorded port,
//! which is what a recycled PID looks like. Stale pairs are removed with
//! compare-and-delete on the values that were observed, then acquisition is
//! retried.
//!
//! A port file found without a lock is removed by whoever creates the lock
//! next, and a port file older than the lock is never taken as the live
//! primary's port. Otherwise a starter could dial the leftover port, get
//! refused and delete a lock whose owner is still binding.
//!
//! Two invocations racing past a stale lock at the same moment can both
//! delete and recreate; exclusive create narrows the window but doesn't
//! close it.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time::Instant;

use crpc_core::instance::{self, is_process_alive, read_lock_file, read_port_file};
use crpc_core::ipc::IPC_HOST;
use crpc_core::{AppPaths, InstanceError, IpcCommand, IpcResponse, Settings};

use crate::ipc::IpcClient;

/// Give up after this many rounds of racing other starters
const MAX_ATTEMPTS: u32 = 5;

/// Delay before re-reading a lock file that was empty or garbled
const UNREADABLE_LOCK_RETRY: Duration = Duration::from_millis(50);

/// Poll interval while waiting for a starting primary's port file
const PORT_FILE_POLL: Duration = Duration::from_millis(50);

/// Outcome of [`Coordinator::acquire_or_delegate`]
#[derive(Debug)]
pub enum Role {
    /// This process now owns the lock and must serve commands
    Primary(PrimaryInstance),
    /// Another process is primary and answered the command
    Secondary(IpcResponse),
}

/// What the lock file says about the current primary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockProbe {
    /// Lock disappeared between create and read
    Vacant,
    /// Recorded process is alive
    Live { pid: u32 },
    /// Recorded process is gone, or the lock is unreadable
    Stale { pid: Option<u32> },
}

enum Delegation {
    Answered(IpcResponse),
    /// Lock changed hands while waiting; start over
    Retry,
    /// Process alive but not listening
    Stale { pid: u32 },
}

/// Decides whether this invocation is the primary or a secondary
#[derive(Debug, Clone)]
pub struct Coordinator {
    paths: AppPaths,
    preferred_port: Option<u16>,
    connect_timeout: Duration,
    response_timeout: Duration,
    pid: u32,
}

impl Coordinator {
    /// Coordinator for this process with default timeouts
    pub fn new(paths: AppPaths) -> Self {
        Self::from_settings(paths, &Settings::default())
    }

    /// Coordinator using the port and timeouts from `settings`
    pub fn from_settings(paths: AppPaths, settings: &Settings) -> Self {
        Self {
            paths,
            preferred_port: settings.preferred_port(),
            connect_timeout: settings.connect_timeout,
            response_timeout: settings.response_timeout,
            pid: std::process::id(),
        }
    }

    pub fn with_preferred_port(mut self, port: Option<u16>) -> Self {
        self.preferred_port = port.filter(|p| *p != 0);
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, response: Duration) -> Self {
        self.connect_timeout = connect;
        self.response_timeout = response;
        self
    }

    /// Identity written to the lock file; defaults to this process
    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    /// Become the primary, or hand `command` to the running one
    ///
    /// As primary, `command` is not executed; the caller applies it to its
    /// own state. As secondary, no files are touched.
    pub async fn acquire_or_delegate(&self, command: &IpcCommand) -> Result<Role, InstanceError> {
        let lock_path = self.paths.lock_file();
        let mut previous_port = None;

        for attempt in 1..=MAX_ATTEMPTS {
            tracing::debug!("Acquiring instance lock (attempt {}/{})", attempt, MAX_ATTEMPTS);

            match instance::create_lock_file(&lock_path, self.pid) {
                Ok(()) => return self.become_primary(previous_port).await.map(Role::Primary),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
                Err(source) => {
                    return Err(InstanceError::FileWrite {
                        path: lock_path,
                        source,
                    })
                }
            }

            match self.probe_lock().await? {
                LockProbe::Vacant => {}
                LockProbe::Stale { pid } => {
                    if let Some(port) = self.clear_stale(pid)? {
                        previous_port = Some(port);
                    }
                }
                LockProbe::Live { pid } => match self.delegate(pid, command).await? {
                    Delegation::Answered(response) => return Ok(Role::Secondary(response)),
                    Delegation::Retry => {}
                    Delegation::Stale { pid } => {
                        if let Some(port) = self.clear_stale(Some(pid))? {
                            previous_port = Some(port);
                        }
                    }
                },
            }
        }

        Err(InstanceError::LockContended {
            attempts: MAX_ATTEMPTS,
        })
    }

    async fn probe_lock(&self) -> Result<LockProbe, InstanceError> {
        let path = self.paths.lock_file();
        let access_error = |source| InstanceError::FileWrite {
            path: path.clone(),
            source,
        };

        let pid = match read_lock_file(&path) {
            Ok(None) => return Ok(LockProbe::Vacant),
            Ok(Some(pid)) => pid,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                // Another starter may sit between create and write
                tokio::time::sleep(UNREADABLE_LOCK_RETRY).await;
                match read_lock_file(&path) {
                    Ok(None) => return Ok(LockProbe::Vacant),
                    Ok(Some(pid)) => pid,
                    Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                        return Ok(LockProbe::Stale { pid: None })
                    }
                    Err(e) => return Err(access_error(e)),
                }
            }
            Err(e) => return Err(access_error(e)),
        };

        // Our own PID in the lock can only be a leftover from an earlier run
        if pid == self.pid || !is_process_alive(pid) {
            Ok(LockProbe::Stale { pid: Some(pid) })
        } else {
            Ok(LockProbe::Live { pid })
        }
    }

    /// Remove a stale lock/port pair, returning the port it recorded
    fn clear_stale(&self, pid: Option<u32>) -> Result<Option<u16>, InstanceError> {
        let lock_path = self.paths.lock_file();
        let port_path = self.paths.port_file();

        let port = read_port_file(&port_path).ok().flatten();
        tracing::warn!(
            "{}, recorded port {:?}; removing it",
            InstanceError::StaleLock { pid },
            port
        );

        // Port first: a new primary creates the lock before its port file
        if port.is_some() {
            instance::remove_port_if(&port_path, port).map_err(|source| {
                InstanceError::FileWrite {
                    path: port_path.clone(),
                    source,
                }
            })?;
        }
        let removed = instance::remove_lock_if(&lock_path, pid).map_err(|source| {
            InstanceError::FileWrite {
                path: lock_path.clone(),
                source,
            }
        })?;
        if !removed {
            tracing::debug!("Lock changed hands while clearing it");
        }

        Ok(port)
    }

    async fn delegate(&self, pid: u32, command: &IpcCommand) -> Result<Delegation, InstanceError> {
        let Some(port) = self.wait_for_port(pid).await? else {
            return Ok(Delegation::Retry);
        };

        tracing::debug!("Instance {} is primary on port {}", pid, port);
        let client =
            IpcClient::new(port).with_timeouts(self.connect_timeout, self.response_timeout);

        match client.send(command).await {
            Ok(response) => Ok(Delegation::Answered(response)),
            Err(e) if e.is_refused() => {
                tracing::warn!(
                    "Process {} holds the lock but nothing listens on port {}",
                    pid,
                    port
                );
                Ok(Delegation::Stale { pid })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Wait for a live primary's port file
    ///
    /// Returns `None` if the lock no longer names `pid` or the process died,
    /// meaning acquisition should start over.
    async fn wait_for_port(&self, pid: u32) -> Result<Option<u16>, InstanceError> {
        let lock_path = self.paths.lock_file();
        let port_path = self.paths.port_file();
        let deadline = Instant::now() + self.response_timeout;

        loop {
            match read_port_file(&port_path) {
                Ok(Some(port)) if !port_predates_lock(&lock_path, &port_path) => {
                    return Ok(Some(port))
                }
                Ok(Some(port)) => {
                    tracing::trace!("Ignoring port {} written before the current lock", port);
                }
                Ok(None) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {}
                Err(source) => {
                    return Err(InstanceError::FileWrite {
                        path: port_path,
                        source,
                    })
                }
            }

            let still_locked = matches!(read_lock_file(&lock_path), Ok(Some(p)) if p == pid);
            if !still_locked || !is_process_alive(pid) {
                return Ok(None);
            }
            if Instant::now() >= deadline {
                return Err(InstanceError::PrimaryUnreachable { pid });
            }
            tokio::time::sleep(PORT_FILE_POLL).await;
        }
    }

    async fn become_primary(
        &self,
        previous_port: Option<u16>,
    ) -> Result<PrimaryInstance, InstanceError> {
        let port_path = self.paths.port_file();
        let leftover = match self.claim_leftover_port() {
            Ok(port) => port,
            Err(e) => {
                self.abandon_lock();
                return Err(e);
            }
        };
        let previous_port = previous_port.or(leftover);

        let listener = match self.bind_listener(previous_port).await {
            Ok(listener) => listener,
            Err(e) => {
                self.abandon_lock();
                return Err(e);
            }
        };
        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(source) => {
                self.abandon_lock();
                return Err(InstanceError::PortBind { port: 0, source });
            }
        };

        if let Err(source) = instance::write_port_file(&port_path, port) {
            self.abandon_lock();
            return Err(InstanceError::FileWrite {
                path: port_path,
                source,
            });
        }

        tracing::info!("Primary instance (pid {}) on port {}", self.pid, port);
        Ok(PrimaryInstance {
            pid: self.pid,
            port,
            listener: Some(listener),
            lock_path: self.paths.lock_file(),
            port_path,
            released: false,
        })
    }

    /// Remove a port file left over from an interrupted cleanup
    ///
    /// Only called while holding a freshly created lock, so any port file
    /// present belongs to no running primary. Returns the port it recorded.
    fn claim_leftover_port(&self) -> Result<Option<u16>, InstanceError> {
        let port_path = self.paths.port_file();
        let access_error = |source| InstanceError::FileWrite {
            path: port_path.clone(),
            source,
        };

        let leftover = match read_port_file(&port_path) {
            Ok(port) => port,
            Err(e) if e.kind() == io::ErrorKind::InvalidData => None,
            Err(e) => return Err(access_error(e)),
        };
        if instance::remove_port_if(&port_path, leftover).map_err(access_error)? {
            tracing::debug!("Removed leftover port file (port {:?})", leftover);
        }
        Ok(leftover)
    }

    /// Bind the configured port, else the previous one, else any free port
    async fn bind_listener(&self, previous_port: Option<u16>) -> Result<TcpListener, InstanceError> {
        let mut candidates = Vec::new();
        for port in [self.preferred_port, previous_port].into_iter().flatten() {
            if port != 0 && !candidates.contains(&port) {
                candidates.push(port);
            }
        }

        for port in candidates {
            match TcpListener::bind((IPC_HOST, port)).await {
                Ok(listener) => return Ok(listener),
                Err(e) => tracing::warn!("Port {} unavailable ({}), trying the next one", port, e),
            }
        }

        TcpListener::bind((IPC_HOST, 0))
            .await
            .map_err(|source| InstanceError::PortBind { port: 0, source })
    }

    fn abandon_lock(&self) {
        if let Err(e) = instance::remove_lock_if(&self.paths.lock_file(), Some(self.pid)) {
            tracing::warn!("Failed to remove lock after failed start: {}", e);
        }
    }
}

/// Whether the port file was last written before the lock was created
///
/// Such a file can't belong to the lock's owner. Missing timestamps count as
/// not older.
fn port_predates_lock(lock_path: &Path, port_path: &Path) -> bool {
    let modified = |path: &Path| std::fs::metadata(path).and_then(|m| m.modified()).ok();
    match (modified(lock_path), modified(port_path)) {
        (Some(lock), Some(port)) => port < lock,
        _ => false,
    }
}

/// Ownership of the lock/port pair
///
/// Files are removed by [`release`](Self::release), or on drop as a fallback.
#[derive(Debug)]
pub struct PrimaryInstance {
    pid: u32,
    port: u16,
    listener: Option<TcpListener>,
    lock_path: PathBuf,
    port_path: PathBuf,
    released: bool,
}

impl PrimaryInstance {
    /// Port the IPC listener is bound to
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Take the bound listener to serve on
    pub fn take_listener(&mut self) -> Option<TcpListener> {
        self.listener.take()
    }

    /// Remove the lock and port files
    ///
    /// Files now owned by a newer primary are left alone.
    pub fn release(&mut self) -> Result<(), InstanceError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.listener = None;

        match read_lock_file(&self.lock_path) {
            Ok(Some(pid)) if pid == self.pid => {}
            other => {
                tracing::warn!(
                    "Lock no longer belongs to this instance ({:?}), leaving files in place",
                    other.ok().flatten()
                );
                return Ok(());
            }
        }

        instance::remove_port_if(&self.port_path, Some(self.port)).map_err(|source| {
            InstanceError::FileWrite {
                path: self.port_path.clone(),
                source,
            }
        })?;
        instance::remove_lock_if(&self.lock_path, Some(self.pid)).map_err(|source| {
            InstanceError::FileWrite {
                path: self.lock_path.clone(),
                source,
            }
        })?;

        tracing::info!("Released instance lock");
        Ok(())
    }
}

impl Drop for PrimaryInstance {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!("Failed to release instance lock: {}", e);
        }
    }
}
