//! Process termination primitives.
//!
//! Forceful termination goes through the owned `tokio::process::Child`
//! (`start_kill`), so only the graceful request lives here.

use mcp_common::{ProcessError, ProcessResult};

/// Ask a process to terminate gracefully (SIGTERM on Unix).
///
/// The target may intercept the request and clean up before exiting. The
/// caller is responsible for waiting and escalating.
pub fn terminate_gracefully(pid: u32) -> ProcessResult<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| ProcessError::stop_failed(pid.to_string(), "pid out of range"))?;
        kill(Pid::from_raw(raw), Signal::SIGTERM)
            .map_err(|e| ProcessError::stop_failed(pid.to_string(), e.to_string()))
    }

    #[cfg(not(unix))]
    {
        Err(ProcessError::stop_failed(
            pid.to_string(),
            "graceful termination is not supported on this platform",
        ))
    }
}
