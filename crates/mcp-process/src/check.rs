//! Process existence checking.
//!
//! Used for processes the caller does not own a `Child` for, such as pids
//! read back from pid files. Owned children should be checked with
//! `try_wait` instead, which also reaps them.

use mcp_common::{ProcessError, ProcessResult};

/// Check if a process with the given PID exists.
///
/// On Unix this uses `kill(pid, 0)`, which sends no signal but reports
/// whether the process exists. A zombie still counts as existing.
///
/// # Returns
///
/// * `Ok(true)` - Process exists
/// * `Ok(false)` - Process does not exist
/// * `Err(_)` - The check itself failed
///
/// # Examples
///
/// ```rust,no_run
/// use mcp_process::process_exists;
///
/// if process_exists(1234).unwrap() {
///     println!("Process 1234 is running");
/// }
/// ```
pub fn process_exists(pid: u32) -> ProcessResult<bool> {
    #[cfg(unix)]
    {
        process_exists_unix(pid)
    }

    #[cfg(not(unix))]
    {
        Err(ProcessError::configuration(
            pid.to_string(),
            "process existence checks are only supported on Unix",
        ))
    }
}

#[cfg(unix)]
fn process_exists_unix(pid: u32) -> ProcessResult<bool> {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    let raw = i32::try_from(pid).map_err(|_| {
        ProcessError::configuration(pid.to_string(), "pid does not fit in a platform pid")
    })?;
    if raw <= 0 {
        // 0 and negatives address process groups, not a single process
        return Ok(false);
    }

    match kill(Pid::from_raw(raw), None) {
        Ok(_) => Ok(true),
        Err(nix::errno::Errno::ESRCH) => Ok(false),
        Err(nix::errno::Errno::EPERM) => Ok(true), // exists, owned by someone else
        Err(e) => Err(ProcessError::configuration(
            pid.to_string(),
            format!("Failed to check process: {}", e),
        )),
    }
}
