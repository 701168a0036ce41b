//! Backend process signalling.
//!
//! Soft cancellation sends an interrupt to the backend and to each of its
//! live descendants individually; descendants are not trusted to forward
//! the signal themselves. Signalling an already-exited process is a silent
//! no-op.

use std::time::{Duration, Instant};

/// Check if a process is still alive.
pub fn pid_is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        // Signal 0 doesn't send a signal but checks if the process exists
        let result = unsafe { libc::kill(pid as libc::pid_t, 0) };
        if result == 0 {
            return true;
        }
        // ESRCH means the process doesn't exist
        // EPERM means it exists but we don't have permission
        std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
    }

    #[cfg(not(unix))]
    {
        true // Non-Unix: can't check liveness, assume running
    }
}

/// All live descendants of a process, transitively.
pub fn descendant_pids(root: u32) -> Vec<u32> {
    let mut found = Vec::new();
    let mut frontier = vec![root];

    while let Some(parent) = frontier.pop() {
        for child in children_of(parent) {
            if child != root && !found.contains(&child) {
                found.push(child);
                frontier.push(child);
            }
        }
    }

    found
}

#[cfg(target_os = "linux")]
fn children_of(parent: u32) -> Vec<u32> {
    let entries = match std::fs::read_dir("/proc") {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    let mut children = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name();
        let pid: u32 = match name.to_string_lossy().parse() {
            Ok(pid) => pid,
            Err(_) => continue,
        };

        let stat = match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Ok(stat) => stat,
            Err(_) => continue,
        };

        if parse_stat_ppid(&stat) == Some(parent) {
            children.push(pid);
        }
    }

    children
}

#[cfg(all(unix, not(target_os = "linux")))]
fn children_of(parent: u32) -> Vec<u32> {
    let output = match std::process::Command::new("pgrep")
        .arg("-P")
        .arg(parent.to_string())
        .output()
    {
        Ok(output) => output,
        Err(_) => return Vec::new(),
    };

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter_map(|line| line.trim().parse().ok())
        .collect()
}

#[cfg(not(unix))]
fn children_of(_parent: u32) -> Vec<u32> {
    Vec::new()
}

/// The comm field is parenthesized and may itself contain spaces, so the
/// ppid is found relative to the last closing paren.
#[cfg(target_os = "linux")]
fn parse_stat_ppid(stat: &str) -> Option<u32> {
    let rest = &stat[stat.rfind(')')? + 1..];
    rest.split_whitespace().nth(1)?.parse().ok()
}

/// Request a graceful stop of a process tree.
///
/// Sends SIGINT to the root and to every live descendant individually.
/// Best-effort: callers needing a guaranteed stop must escalate with
/// [`force_kill`]. Safe to call after the process has already exited.
#[cfg(unix)]
pub fn soft_interrupt(pid: u32) {
    let mut targets = vec![pid];
    targets.extend(descendant_pids(pid));

    for target in targets {
        let result = unsafe { libc::kill(target as libc::pid_t, libc::SIGINT) };
        if result != 0 && pid_is_alive(target) {
            log::warn!("Failed to deliver SIGINT to PID {}", target);
        }
    }
}

#[cfg(not(unix))]
pub fn soft_interrupt(_pid: u32) {
    log::warn!("Soft interrupt is not supported on this platform");
}

/// Forcefully stop a process after a grace period.
///
/// Sends SIGTERM, waits up to `timeout`, then SIGKILL. Returns true once
/// the process is gone.
#[cfg(unix)]
pub fn force_kill(pid: u32, timeout: Duration) -> bool {
    if unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } != 0 {
        return !pid_is_alive(pid);
    }

    if wait_for_exit(pid, timeout) {
        return true;
    }

    log::warn!("Backend PID {} did not respond to SIGTERM, sending SIGKILL", pid);
    unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };

    wait_for_exit(pid, Duration::from_secs(5))
}

#[cfg(not(unix))]
pub fn force_kill(_pid: u32, _timeout: Duration) -> bool {
    false
}

/// Wait for a process to exit.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    while Instant::now() < deadline {
        if !pid_is_alive(pid) {
            return true;
        }

        #[cfg(unix)]
        {
            // Reap the process if it's our child, otherwise it lingers as a
            // zombie and keeps reporting alive.
            let result = unsafe {
                let mut status: libc::c_int = 0;
                libc::waitpid(pid as libc::pid_t, &mut status, libc::WNOHANG)
            };

            if result == pid as libc::pid_t {
                return true;
            }
        }

        std::thread::sleep(Duration::from_millis(50));
    }

    !pid_is_alive(pid)
}
