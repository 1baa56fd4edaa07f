//! Group shutdown: graceful termination with a forced-kill fallback.

use crate::handle::ServiceHandle;
use mcp_common::ServiceId;
use mcp_service_state::ServiceState;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// How long to wait for the OS to reap a child after a forced kill.
pub const FORCE_KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// How one service ended during shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the graceful timeout after the termination request
    GracefulStop,
    /// Had to be killed
    ForcedStop,
    /// Was already gone before shutdown began
    Exited(String),
    /// Termination or the kill failed
    Error(String),
}

impl fmt::Display for StopOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopOutcome::GracefulStop => write!(f, "stopped"),
            StopOutcome::ForcedStop => write!(f, "killed"),
            StopOutcome::Exited(status) => write!(f, "already exited ({})", status),
            StopOutcome::Error(reason) => write!(f, "error: {}", reason),
        }
    }
}

/// Per-service outcomes, in launch order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    outcomes: Vec<(ServiceId, StopOutcome)>,
}

impl ShutdownReport {
    pub(crate) fn push(&mut self, id: ServiceId, outcome: StopOutcome) {
        self.outcomes.push((id, outcome));
    }

    pub fn get(&self, id: &str) -> Option<&StopOutcome> {
        self.outcomes
            .iter()
            .find(|(sid, _)| sid.as_str() == id)
            .map(|(_, outcome)| outcome)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ServiceId, &StopOutcome)> {
        self.outcomes.iter().map(|(id, outcome)| (id, outcome))
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// No service ended in [`StopOutcome::Error`].
    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = (&ServiceId, &str)> {
        self.outcomes.iter().filter_map(|(id, outcome)| match outcome {
            StopOutcome::Error(reason) => Some((id, reason.as_str())),
            _ => None,
        })
    }
}

/// Stops every live handle, bounding each stop by a timeout.
#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    graceful_timeout: Duration,
    force_kill_timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(graceful_timeout: Duration) -> Self {
        Self {
            graceful_timeout,
            force_kill_timeout: FORCE_KILL_TIMEOUT,
        }
    }

    pub fn with_force_kill_timeout(mut self, force_kill_timeout: Duration) -> Self {
        self.force_kill_timeout = force_kill_timeout;
        self
    }

    /// Stop all handles that are not yet `Stopped`.
    ///
    /// Every termination request is sent before any wait starts, so the
    /// services wind down in parallel. Handles already `Stopped` are skipped,
    /// which makes a repeated call a no-op with an empty report.
    pub async fn shutdown_all(&self, handles: &mut [ServiceHandle]) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        let mut pending = Vec::new();

        for (index, handle) in handles.iter_mut().enumerate() {
            if handle.state() == ServiceState::Stopped {
                continue;
            }

            match handle.poll_exit() {
                Ok(Some(status)) => {
                    info!("{} had already exited ({})", handle.id(), status);
                    handle.transition(ServiceState::Stopped, format!("already exited: {}", status));
                    report.push(handle.id().clone(), StopOutcome::Exited(status.to_string()));
                    continue;
                }
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }

            info!("Stopping {} (PID {})", handle.id(), handle.pid());
            if let Err(e) = mcp_process::terminate_gracefully(handle.pid()) {
                // the wait below still bounds it, and the kill fallback applies
                warn!("Graceful stop request failed for {}: {}", handle.id(), e);
            }
            pending.push(index);
        }

        for index in pending {
            let handle = &mut handles[index];
            let outcome = self.await_stop(handle).await;

            match outcome {
                StopOutcome::Error(ref reason) => {
                    error!("Failed to stop {}: {}", handle.id(), reason);
                }
                ref stopped => {
                    handle.transition(ServiceState::Stopped, stopped.to_string());
                }
            }
            report.push(handle.id().clone(), outcome);
        }

        report
    }

    async fn await_stop(&self, handle: &mut ServiceHandle) -> StopOutcome {
        match timeout(self.graceful_timeout, handle.wait()).await {
            Ok(Ok(status)) => {
                info!("{} stopped ({})", handle.id(), status);
                return StopOutcome::GracefulStop;
            }
            Ok(Err(e)) => return StopOutcome::Error(format!("wait failed: {}", e)),
            Err(_) => {
                warn!(
                    "{} did not stop within {:?}, killing it",
                    handle.id(),
                    self.graceful_timeout
                );
            }
        }

        if let Err(e) = handle.start_kill() {
            return StopOutcome::Error(format!("kill failed: {}", e));
        }

        match timeout(self.force_kill_timeout, handle.wait()).await {
            Ok(Ok(_)) => StopOutcome::ForcedStop,
            Ok(Err(e)) => StopOutcome::Error(format!("wait after kill failed: {}", e)),
            Err(_) => StopOutcome::Error(format!(
                "still running {:?} after kill",
                self.force_kill_timeout
            )),
        }
    }
}
