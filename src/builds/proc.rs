//! # OS process helpers for the build supervisor.
//!
//! Two platform-sensitive operations live here: detecting that a child has
//! exited or zombied while its stdio pipes are still open (some runtimes
//! leak the descriptors into grandchildren), and signalling the child's
//! whole process group.

use tokio::process::Child;

#[cfg(target_os = "linux")]
use std::sync::LazyLock;

#[cfg(target_os = "linux")]
static PROC_ZOMBIED: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"State:\s*Z\s\(zombie\)").expect("hard-coded pattern"));

/// Whether the child is gone or zombied even though we have not waited on it.
///
/// On Linux this inspects `/proc/<pid>/status` so the child is never reaped
/// behind the supervisor's back; elsewhere it falls back to a
/// wait-without-hang query.
#[cfg(target_os = "linux")]
pub(crate) fn has_child_exited(child: &mut Child) -> bool {
    match child.id() {
        Some(pid) => pid_exited(pid),
        None => true,
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn has_child_exited(child: &mut Child) -> bool {
    matches!(child.try_wait(), Ok(Some(_)) | Err(_))
}

#[cfg(target_os = "linux")]
fn pid_exited(pid: u32) -> bool {
    let pid_dir = format!("/proc/{pid}");
    if !std::path::Path::new(&pid_dir).exists() {
        return true;
    }

    match std::fs::read_to_string(format!("{pid_dir}/status")) {
        Ok(status) => PROC_ZOMBIED.is_match(&status),
        Err(err) => {
            tracing::error!("error reading {pid_dir}/status: {err}");
            true
        }
    }
}

/// Sends SIGTERM to the process group led by `pid`.
#[cfg(unix)]
pub(crate) fn signal_group(pid: i32) -> Result<(), crate::error::CoreError> {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::{getpgid, Pid};

    let pgid = getpgid(Some(Pid::from_raw(pid)))?;
    killpg(pgid, Signal::SIGTERM)?;
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn signal_group(_pid: i32) -> Result<(), crate::error::CoreError> {
    Err(crate::error::CoreError::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "process-group signalling is unix-only",
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn nonexistent_pid_reports_exited() {
        // PID 0x3fffffff is above the default kernel pid_max.
        assert!(pid_exited(0x3fff_ffff));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn own_pid_reports_running() {
        assert!(!pid_exited(std::process::id()));
    }
}
