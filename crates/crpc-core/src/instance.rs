//! Lock and port file primitives for single-instance management
//!
//! The primary instance records its PID in the lock file and the port of its
//! IPC listener in the port file. Both live in the configuration directory.
//! Higher-level acquire/delegate logic lives in `crpc-host`.

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

/// Read a single decimal number from a file
///
/// Returns `Ok(Some(n))` if the file exists and holds a valid number,
/// `Ok(None)` if the file doesn't exist, or `InvalidData` if it is empty or malformed.
fn read_number<T: std::str::FromStr>(path: &Path) -> io::Result<Option<T>>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match fs::File::open(path) {
        Ok(mut file) => {
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            let value = contents
                .trim()
                .parse::<T>()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read the PID from the lock file
pub fn read_lock_file(path: &Path) -> io::Result<Option<u32>> {
    read_number(path)
}

/// Read the IPC port from the port file
pub fn read_port_file(path: &Path) -> io::Result<Option<u16>> {
    read_number(path)
}

/// Create the lock file exclusively and write `pid` into it
///
/// Fails with `AlreadyExists` if another process holds the lock. Creates
/// parent directories if they don't exist.
pub fn create_lock_file(path: &Path, pid: u32) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;

    if let Err(e) = writeln!(file, "{}", pid).and_then(|_| file.sync_all()) {
        // Never leave an empty lock behind
        let _ = fs::remove_file(path);
        return Err(e);
    }
    Ok(())
}

/// Write the port file via a temporary file and rename
///
/// Readers see either the previous content or the complete new port.
pub fn write_port_file(path: &Path, port: u16) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
    {
        let mut file = fs::File::create(&tmp)?;
        writeln!(file, "{}", port)?;
        file.sync_all()?;
    }
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e);
    }
    Ok(())
}

/// Remove a file
///
/// Returns `Ok(())` even if the file doesn't exist.
pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove the lock file only if it still records `expected`
///
/// `expected == None` matches an empty or unparsable lock file. Returns
/// whether the file was removed.
pub fn remove_lock_if(path: &Path, expected: Option<u32>) -> io::Result<bool> {
    let current = match read_lock_file(path) {
        Ok(None) => return Ok(false),
        Ok(Some(pid)) => Some(pid),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => None,
        Err(e) => return Err(e),
    };

    if current != expected {
        return Ok(false);
    }
    remove_file_if_exists(path)?;
    Ok(true)
}

/// Remove the port file only if it still records `expected`
pub fn remove_port_if(path: &Path, expected: Option<u16>) -> io::Result<bool> {
    let current = match read_port_file(path) {
        Ok(None) => return Ok(false),
        Ok(Some(port)) => Some(port),
        Err(e) if e.kind() == io::ErrorKind::InvalidData => None,
        Err(e) => return Err(e),
    };

    if current != expected {
        return Ok(false);
    }
    remove_file_if_exists(path)?;
    Ok(true)
}

/// Check if a process with the given PID is still alive
///
/// On Unix, uses kill(pid, 0) to check if the process exists.
/// On Windows, uses OpenProcess to check if the process exists.
/// A recycled PID belonging to an unrelated process reads as alive.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 || pid > libc::pid_t::MAX as u32 {
        return false;
    }
    // ESRCH means no such process; EPERM means it exists but belongs to someone else
    unsafe {
        let result = libc::kill(pid as libc::pid_t, 0);
        if result == 0 {
            return true;
        }
        let err = std::io::Error::last_os_error();
        err.raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    if pid == 0 {
        return false;
    }
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            return false;
        }
        CloseHandle(handle);
        true
    }
}

/// How a process reacted to [`terminate_process`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// It was not running to begin with
    NotRunning,
    /// It exited after the polite request
    Graceful,
    /// It had to be killed
    Forced,
    /// It is still alive after the forced kill
    Survived,
}

/// Ask a process to exit, killing it if it ignores the request for `grace`
///
/// On Unix this sends SIGTERM, then SIGKILL. Windows has no polite request
/// for a console-less process, so it is terminated immediately.
#[cfg(unix)]
pub fn terminate_process(pid: u32, grace: Duration) -> io::Result<Termination> {
    if !is_process_alive(pid) {
        return Ok(Termination::NotRunning);
    }

    send_signal(pid, libc::SIGTERM)?;
    if wait_for_exit(pid, grace) {
        return Ok(Termination::Graceful);
    }

    tracing::warn!("Process {} ignored SIGTERM, sending SIGKILL", pid);
    send_signal(pid, libc::SIGKILL)?;
    if wait_for_exit(pid, Duration::from_secs(1)) {
        Ok(Termination::Forced)
    } else {
        Ok(Termination::Survived)
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, signal: libc::c_int) -> io::Result<()> {
    let result = unsafe { libc::kill(pid as libc::pid_t, signal) };
    if result == 0 {
        return Ok(());
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::ESRCH) {
        // Exited on its own in the meantime
        return Ok(());
    }
    Err(err)
}

#[cfg(windows)]
pub fn terminate_process(pid: u32, grace: Duration) -> io::Result<Termination> {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, TerminateProcess, PROCESS_TERMINATE};

    if !is_process_alive(pid) {
        return Ok(Termination::NotRunning);
    }

    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if handle == 0 {
            return Err(io::Error::last_os_error());
        }
        let ok = TerminateProcess(handle, 1);
        CloseHandle(handle);
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
    }

    if wait_for_exit(pid, grace) {
        Ok(Termination::Forced)
    } else {
        Ok(Termination::Survived)
    }
}

/// Poll until the process is gone or `timeout` passes
fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !is_process_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_read_nonexistent_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        assert!(read_lock_file(&path).unwrap().is_none());
    }

    #[test]
    fn test_create_and_read_lock_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join(".lock");

        create_lock_file(&path, 12345).unwrap();
        assert_eq!(read_lock_file(&path).unwrap(), Some(12345));
    }

    #[test]
    fn test_create_lock_file_is_exclusive() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");

        create_lock_file(&path, 1).unwrap();
        let err = create_lock_file(&path, 2).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        // The original holder is untouched
        assert_eq!(read_lock_file(&path).unwrap(), Some(1));
    }

    #[test]
    fn test_empty_lock_file_is_invalid_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        fs::write(&path, "").unwrap();

        let err = read_lock_file(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_write_port_file_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".port");

        write_port_file(&path, 54231).unwrap();
        write_port_file(&path, 54232).unwrap();
        assert_eq!(read_port_file(&path).unwrap(), Some(54232));

        // No temporary files left behind
        let leftovers = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_port_out_of_range_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".port");
        fs::write(&path, "70000\n").unwrap();
        assert!(read_port_file(&path).is_err());
    }

    #[test]
    fn test_remove_nonexistent_file() {
        let dir = TempDir::new().unwrap();
        remove_file_if_exists(&dir.path().join("missing")).unwrap();
    }

    #[test]
    fn test_remove_lock_if_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        create_lock_file(&path, 42).unwrap();

        assert!(!remove_lock_if(&path, Some(43)).unwrap());
        assert!(path.exists());

        assert!(remove_lock_if(&path, Some(42)).unwrap());
        assert!(!path.exists());

        // Already gone
        assert!(!remove_lock_if(&path, Some(42)).unwrap());
    }

    #[test]
    fn test_remove_lock_if_corrupt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".lock");
        fs::write(&path, "garbage").unwrap();

        assert!(!remove_lock_if(&path, Some(1)).unwrap());
        assert!(remove_lock_if(&path, None).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_port_if_matches() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".port");
        write_port_file(&path, 5000).unwrap();

        assert!(!remove_port_if(&path, Some(5001)).unwrap());
        assert!(remove_port_if(&path, Some(5000)).unwrap());
        assert!(!path.exists());
    }

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_invalid_pid_not_alive() {
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(999_999_999));
    }

    #[test]
    fn test_terminate_missing_process() {
        let outcome = terminate_process(999_999_999, Duration::from_millis(10)).unwrap();
        assert_eq!(outcome, Termination::NotRunning);
    }

    #[cfg(unix)]
    #[test]
    fn test_terminate_child_process() {
        let mut child = std::process::Command::new("sleep").arg("30").spawn().unwrap();
        let pid = child.id();

        // Reap in the background so the child doesn't linger as a zombie
        let reaper = std::thread::spawn(move || child.wait());

        let outcome = terminate_process(pid, Duration::from_secs(2)).unwrap();
        assert!(matches!(outcome, Termination::Graceful | Termination::Forced));
        reaper.join().unwrap().unwrap();
    }
}
