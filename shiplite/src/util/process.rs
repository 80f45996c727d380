//! Process signalling helpers for boot-phase children.
//!
//! Phase children are spawned into their own process group, so signalling
//! the negated PID reaches the whole tree a migration tool or service may
//! have forked - nothing is left lingering after termination.

/// Check if a process with the given PID exists.
///
/// Uses `libc::kill(pid, 0)` which sends a null signal to check existence.
pub fn is_process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// Send SIGTERM to the process group led by `pid`.
///
/// # Returns
/// * `true` - Signal delivered
/// * `false` - Group no longer exists or permission denied
pub fn terminate_group(pid: u32) -> bool {
    unsafe { libc::kill(-(pid as i32), libc::SIGTERM) == 0 }
}

/// Send SIGKILL to the process group led by `pid`.
pub fn kill_group(pid: u32) -> bool {
    unsafe { libc::kill(-(pid as i32), libc::SIGKILL) == 0 || !is_process_alive(pid) }
}

/// Map an exit status to a process exit code, folding signal deaths into
/// the conventional 128 + signo range.
pub fn exit_status_code(status: std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_current() {
        // Current process should always be alive
        let current_pid = std::process::id();
        assert!(is_process_alive(current_pid));
    }

    #[test]
    fn test_is_process_alive_invalid() {
        // Very high PIDs are unlikely to exist.
        // Note: u32::MAX becomes -1 when cast to i32, which has special meaning in kill()
        assert!(!is_process_alive(999999999));
        assert!(!is_process_alive(888888888));
    }

    #[test]
    fn test_exit_status_code_success() {
        let status = std::process::Command::new("true").status().unwrap();
        assert_eq!(exit_status_code(status), 0);
    }

    #[test]
    fn test_exit_status_code_failure() {
        let status = std::process::Command::new("sh")
            .args(["-c", "exit 7"])
            .status()
            .unwrap();
        assert_eq!(exit_status_code(status), 7);
    }
}
