use crate::registry::ServiceSpec;
use chrono::{DateTime, Utc};
use mcp_common::{ProcessError, ProcessResult, ServiceId};
use mcp_monitoring::Probeable;
use mcp_service_state::{ServiceState, ServiceStateMachine};
use std::process::ExitStatus;
use std::sync::Arc;
use tokio::process::Child;
use tracing::{debug, warn};

/// A launched service: its spec, the OS child, and its lifecycle state.
///
/// Each handle is exclusively owned by the supervisor that launched it.
#[derive(Debug)]
pub struct ServiceHandle {
    spec: Arc<ServiceSpec>,
    pid: u32,
    child: Child,
    state: ServiceStateMachine,
    started_at: DateTime<Utc>,
    exit_status: Option<ExitStatus>,
}

impl ServiceHandle {
    pub(crate) fn new(spec: Arc<ServiceSpec>, pid: u32, child: Child) -> Self {
        let state = ServiceStateMachine::new(spec.id.as_str());
        Self {
            spec,
            pid,
            child,
            state,
            started_at: Utc::now(),
            exit_status: None,
        }
    }

    pub fn id(&self) -> &ServiceId {
        &self.spec.id
    }

    pub fn spec(&self) -> &ServiceSpec {
        &self.spec
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn port(&self) -> u16 {
        self.spec.port
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn state(&self) -> ServiceState {
        self.state.current_state()
    }

    /// Non-blocking liveness check. Reaps the child when it has exited.
    pub fn poll_exit(&mut self) -> ProcessResult<Option<ExitStatus>> {
        if let Some(status) = self.exit_status {
            return Ok(Some(status));
        }

        match self.child.try_wait() {
            Ok(Some(status)) => {
                debug!("Service {} (PID {}) exited: {}", self.spec.id, self.pid, status);
                self.exit_status = Some(status);
                Ok(Some(status))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(ProcessError::unexpected_exit(
                self.spec.id.as_str(),
                format!("liveness query failed: {}", e),
            )),
        }
    }

    /// Apply a state change. An illegal change is logged and ignored.
    pub(crate) fn transition(&mut self, target: ServiceState, reason: impl Into<String>) {
        if let Err(e) = self.state.transition_to(target, Some(reason.into())) {
            warn!("{}", e);
        }
    }

    /// Wait for the child to exit and reap it.
    pub(crate) async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        if let Some(status) = self.exit_status {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit_status = Some(status);
        Ok(status)
    }

    /// Request a forceful kill without waiting for it.
    pub(crate) fn start_kill(&mut self) -> std::io::Result<()> {
        self.child.start_kill()
    }
}

impl Probeable for ServiceHandle {
    fn probe_id(&self) -> &str {
        self.spec.id.as_str()
    }

    fn probe_port(&self) -> u16 {
        self.spec.port
    }

    fn has_exited(&mut self) -> bool {
        // a failed liveness query counts as exited
        !matches!(self.poll_exit(), Ok(None))
    }
}
