//! Error types for supervising tool-server processes.
//!
//! Every failure the supervisor can observe about a service maps onto one
//! `ProcessError` variant. Whether a variant is fatal depends on where it is
//! raised: configuration and spawn errors only skip the affected service,
//! while an unexpected exit tears the whole group down.

use thiserror::Error;

/// Process-specific error types for service supervision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessError {
    /// The service definition is unusable (missing launch target, bad id, ...).
    #[error("Service configuration error: {id} - {reason}")]
    Configuration { id: String, reason: String },

    /// The OS refused to create the child process.
    #[error("Service spawn failed: {id} - {reason}")]
    SpawnFailed { id: String, reason: String },

    /// The service port did not accept a connection within the probe window.
    #[error("Service probe timed out: {id} - port {port} not reachable within {timeout_ms}ms")]
    ProbeTimeout {
        id: String,
        port: u16,
        timeout_ms: u64,
    },

    /// A service that was expected to be running has exited.
    #[error("Service exited unexpectedly: {id} - {status}")]
    UnexpectedExit { id: String, status: String },

    /// The service could not be terminated, even after a forceful kill.
    #[error("Service stop failed: {id} - {reason}")]
    StopFailed { id: String, reason: String },

    #[error("Service state error: {id} - cannot move from {actual} to {requested}")]
    InvalidState {
        id: String,
        requested: String,
        actual: String,
    },
}

impl ProcessError {
    pub fn configuration(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn spawn_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn probe_timeout(id: impl Into<String>, port: u16, timeout_ms: u64) -> Self {
        Self::ProbeTimeout {
            id: id.into(),
            port,
            timeout_ms,
        }
    }

    pub fn unexpected_exit(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self::UnexpectedExit {
            id: id.into(),
            status: status.into(),
        }
    }

    pub fn stop_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StopFailed {
            id: id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_state(
        id: impl Into<String>,
        requested: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::InvalidState {
            id: id.into(),
            requested: requested.into(),
            actual: actual.into(),
        }
    }

    /// Id of the service the error is about.
    pub fn service_id(&self) -> &str {
        match self {
            Self::Configuration { id, .. }
            | Self::SpawnFailed { id, .. }
            | Self::ProbeTimeout { id, .. }
            | Self::UnexpectedExit { id, .. }
            | Self::StopFailed { id, .. }
            | Self::InvalidState { id, .. } => id,
        }
    }
}

/// Result type for process operations.
pub type ProcessResult<T> = std::result::Result<T, ProcessError>;
